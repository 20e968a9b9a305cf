//! Chasing mode detection.

use crate::Metrics;
use derive_more::Display;
use extender_node_api::{NodeApi, NodeApiResult};
use std::sync::Arc;
use tracing::{debug, info};

/// How far the pipeline is behind the node head.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// More than the threshold behind; heights are processed back to back.
    #[display("chasing")]
    Chasing,
    /// Within the threshold of the head.
    #[display("tracking")]
    Tracking,
}

/// Tracks the node head and decides whether the pipeline is chasing it.
///
/// The head is queried on first use and again whenever the pipeline seems to have caught
/// up while chasing. Once tracking, the monitor stays tracking: falling behind again is not
/// detected.
#[derive(Debug)]
pub struct ChasingMonitor<N> {
    node: Arc<N>,
    threshold: u64,
    node_head: Option<u64>,
    mode: SyncMode,
}

impl<N: NodeApi> ChasingMonitor<N> {
    /// Creates a monitor in chasing mode.
    pub const fn new(node: Arc<N>, threshold: u64) -> Self {
        Self { node, threshold, node_head: None, mode: SyncMode::Chasing }
    }

    /// Current mode.
    pub const fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Last known node head.
    pub const fn node_head(&self) -> Option<u64> {
        self.node_head
    }

    const fn lags(&self, head: u64, height: u64) -> bool {
        head.saturating_sub(height) > self.threshold
    }

    async fn refresh_head(&mut self) -> NodeApiResult<u64> {
        let head = self.node.status().await?.latest_block_height;
        debug!(target: "chasing", head, "Fetched node head");
        metrics::gauge!(Metrics::NODE_HEAD).set(head as f64);
        self.node_head = Some(head);
        Ok(head)
    }

    /// Updates the mode for `height` and returns it.
    pub async fn observe(&mut self, height: u64) -> NodeApiResult<SyncMode> {
        let head = match self.node_head {
            Some(head) => head,
            None => self.refresh_head().await?,
        };

        if self.mode == SyncMode::Chasing && !self.lags(head, height) {
            let head = self.refresh_head().await?;
            if !self.lags(head, height) {
                self.mode = SyncMode::Tracking;
                info!(target: "chasing", height, head, "Caught up with node head");
            }
        }

        metrics::gauge!(Metrics::CHASING).set(if self.mode == SyncMode::Chasing { 1.0 } else { 0.0 });
        Ok(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extender_node_api::{MockNodeApi, StatusResult};
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn node_with_heads(heads: Vec<u64>) -> (Arc<MockNodeApi>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let heads = Mutex::new(heads.into_iter());
        let mut node = MockNodeApi::new();
        node.expect_status().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let latest_block_height = heads.lock().unwrap().next().unwrap();
            Ok(StatusResult { latest_block_height })
        });
        (Arc::new(node), calls)
    }

    #[tokio::test]
    async fn queries_head_once_while_far_behind() {
        let (node, calls) = node_with_heads(vec![100]);
        let mut monitor = ChasingMonitor::new(node, 2);

        for height in 1..=50 {
            assert_eq!(monitor.observe(height).await.unwrap(), SyncMode::Chasing);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.node_head(), Some(100));
    }

    #[tokio::test]
    async fn keeps_chasing_when_head_moved_on() {
        let (node, calls) = node_with_heads(vec![10, 20]);
        let mut monitor = ChasingMonitor::new(node, 2);

        assert_eq!(monitor.observe(9).await.unwrap(), SyncMode::Chasing);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.node_head(), Some(20));
    }

    #[tokio::test]
    async fn tracking_is_final() {
        let (node, calls) = node_with_heads(vec![10, 10]);
        let mut monitor = ChasingMonitor::new(node, 2);

        assert_eq!(monitor.observe(9).await.unwrap(), SyncMode::Tracking);
        assert_eq!(monitor.observe(3).await.unwrap(), SyncMode::Tracking);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn height_above_head_does_not_underflow() {
        let (node, _) = node_with_heads(vec![5, 5]);
        let mut monitor = ChasingMonitor::new(node, 2);

        assert_eq!(monitor.observe(8).await.unwrap(), SyncMode::Tracking);
    }
}
