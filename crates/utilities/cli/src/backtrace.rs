//! Helper to enable backtraces on panic.

use std::sync::Once;

static INIT: Once = Once::new();

/// Sets `RUST_BACKTRACE=1` unless a value was provided.
///
/// Must be called before the async runtime starts any threads.
pub fn enable() {
    INIT.call_once(|| {
        if std::env::var_os("RUST_BACKTRACE").is_none() {
            // SAFETY: called from `main` before other threads are spawned.
            unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_sets_backtrace() {
        enable();
        assert!(std::env::var_os("RUST_BACKTRACE").is_some());
    }
}
