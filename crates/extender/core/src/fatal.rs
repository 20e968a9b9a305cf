//! Process wide shutdown signal.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::error;

/// Shutdown signal shared by every stage of the pipeline.
///
/// Two levels of shutdown exist:
/// - a requested shutdown stops the ingestion loop, the sweeper and every sleep, while the
///   batch writers keep draining what was already queued;
/// - a fatal error additionally aborts the writers at their next receive. Callers turn a
///   tripped signal into a non-zero exit.
#[derive(Debug, Clone, Default)]
pub struct FatalSignal {
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl FatalSignal {
    /// Creates a signal driven by an external shutdown token.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown, abort: CancellationToken::new() }
    }

    /// Records an unrecoverable error and stops every stage.
    pub fn trip(&self, stage: &'static str) {
        if !self.abort.is_cancelled() {
            error!(target: "extender", stage, "Fatal error, shutting down");
        }
        self.abort.cancel();
        self.shutdown.cancel();
    }

    /// Whether a stage reported an unrecoverable error.
    pub fn is_tripped(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Whether shutdown was requested, for any reason.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown is requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Resolves once a stage reported an unrecoverable error.
    pub fn aborted(&self) -> WaitForCancellationFuture<'_> {
        self.abort.cancelled()
    }

    /// The shutdown token.
    pub const fn token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_cancels_and_marks() {
        let token = CancellationToken::new();
        let signal = FatalSignal::new(token.clone());
        signal.trip("test");
        assert!(token.is_cancelled());
        assert!(signal.is_tripped());
    }

    #[test]
    fn plain_cancel_is_not_fatal() {
        let signal = FatalSignal::default();
        signal.token().cancel();
        assert!(signal.is_cancelled());
        assert!(!signal.is_tripped());
    }
}
