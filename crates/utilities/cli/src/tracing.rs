//! Tracing subscriber setup.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Maps a `-v` count onto a default level.
///
/// Without flags only errors are shown.
pub(crate) const fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` directives take precedence over the level derived from `verbosity`. With
/// `json` set, events are written as one JSON object per line.
pub fn init_tracing_subscriber(
    verbosity: u8,
    json: bool,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level(verbosity).into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, LevelFilter::ERROR)]
    #[case(1, LevelFilter::WARN)]
    #[case(2, LevelFilter::INFO)]
    #[case(3, LevelFilter::DEBUG)]
    #[case(4, LevelFilter::TRACE)]
    #[case(9, LevelFilter::TRACE)]
    fn verbosity_maps_to_level(#[case] verbosity: u8, #[case] expected: LevelFilter) {
        assert_eq!(verbosity_level(verbosity), expected);
    }
}
