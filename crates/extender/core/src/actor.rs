//! [ExtenderActor] trait.

use async_trait::async_trait;

/// A long running stage of the extender.
///
/// Actors are built with everything they need and consumed by [`start`](Self::start),
/// which returns once the shared shutdown signal fires or the actor hits an error it
/// cannot recover from.
#[async_trait]
pub trait ExtenderActor: Send + 'static {
    /// The error type for the actor.
    type Error: std::fmt::Debug;

    /// Starts the actor.
    async fn start(self) -> Result<(), Self::Error>;
}
