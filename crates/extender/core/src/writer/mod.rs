//! Batch writers.
//!
//! A [`BatchWriter`] is a bounded queue of record batches drained by a fixed pool of
//! workers. Each worker hands a batch to the writer's [`Flush`] implementation. A failed
//! flush is fatal: it is logged, counted and trips the [`FatalSignal`], so a batch is never
//! dropped silently.
//!
//! Workers run until every handle to their writer is dropped and the queue is drained, or
//! until the signal is tripped.
//!
//! Batches are committed in no particular order across workers. Only the chunk sequence
//! of a single batch is written in order.

use crate::{FatalSignal, Metrics, WriterError};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};
use tokio::{sync::oneshot, task::JoinSet};
use tracing::{debug, error};

mod addresses;
pub use addresses::AddressFlusher;

mod transactions;
pub use transactions::{
    InvalidTransactionFlusher, OutputFlusher, TransactionFlusher, TransactionValidatorFlusher,
};

mod events;
pub use events::{RewardFlusher, SlashFlusher};

mod balances;
pub use balances::{BalanceFetcher, BalanceFlusher};

mod coins;
pub use coins::CoinRefresher;
pub(crate) use coins::priced_coin;

mod validators;
pub use validators::{StakeRefresher, ValidatorRefresher};

/// Writes one batch of records.
#[async_trait]
pub trait Flush<T>: Debug + Send + Sync + 'static {
    /// Writes `batch`, splitting it into chunks as needed.
    async fn flush(&self, batch: Vec<T>) -> Result<(), WriterError>;
}

type Ack = oneshot::Sender<Result<(), WriterError>>;

#[derive(Debug)]
struct Job<T> {
    batch: Vec<T>,
    ack: Option<Ack>,
}

/// Handle to a pool of workers flushing batches of `T`.
#[derive(Debug)]
pub struct BatchWriter<T> {
    name: &'static str,
    tx: async_channel::Sender<Job<T>>,
}

impl<T> Clone for BatchWriter<T> {
    fn clone(&self) -> Self {
        Self { name: self.name, tx: self.tx.clone() }
    }
}

impl<T: Debug + Send + 'static> BatchWriter<T> {
    /// Spawns `workers` workers onto `tasks`, each flushing batches with `flusher`.
    ///
    /// The queue holds as many batches as there are workers; `enqueue` waits beyond that.
    pub fn spawn<F: Flush<T>>(
        name: &'static str,
        workers: usize,
        flusher: Arc<F>,
        fatal: FatalSignal,
        tasks: &mut JoinSet<()>,
    ) -> Self {
        Self::spawn_inner(name, workers, false, flusher, fatal, tasks)
    }

    /// Spawns a single worker that merges every queued batch into one flush.
    ///
    /// Suited to refresh jobs where only the newest request matters.
    pub fn spawn_coalescing<F: Flush<T>>(
        name: &'static str,
        flusher: Arc<F>,
        fatal: FatalSignal,
        tasks: &mut JoinSet<()>,
    ) -> Self {
        Self::spawn_inner(name, 1, true, flusher, fatal, tasks)
    }

    fn spawn_inner<F: Flush<T>>(
        name: &'static str,
        workers: usize,
        coalesce: bool,
        flusher: Arc<F>,
        fatal: FatalSignal,
        tasks: &mut JoinSet<()>,
    ) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = async_channel::bounded(workers);
        for worker in 0..workers {
            tasks.spawn(work(name, worker, coalesce, rx.clone(), flusher.clone(), fatal.clone()));
        }
        Self { name, tx }
    }

    /// Queues a batch without waiting for it to be written.
    pub async fn enqueue(&self, batch: Vec<T>) -> Result<(), WriterError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tx.send(Job { batch, ack: None }).await.map_err(|_| WriterError::Closed(self.name))
    }

    /// Queues a batch and waits until it has been written.
    pub async fn enqueue_and_wait(&self, batch: Vec<T>) -> Result<(), WriterError> {
        if batch.is_empty() {
            return Ok(());
        }
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Job { batch, ack: Some(ack) })
            .await
            .map_err(|_| WriterError::Closed(self.name))?;
        done.await.map_err(|_| WriterError::Closed(self.name))?
    }

    /// Name used in logs and metric labels.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

async fn work<T, F>(
    name: &'static str,
    worker: usize,
    coalesce: bool,
    rx: async_channel::Receiver<Job<T>>,
    flusher: Arc<F>,
    fatal: FatalSignal,
) where
    T: Debug + Send + 'static,
    F: Flush<T>,
{
    debug!(target: "writer", writer = name, worker, "Worker started");
    loop {
        let job = tokio::select! {
            biased;
            _ = fatal.aborted() => break,
            job = rx.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let mut batch = job.batch;
        let mut acks: Vec<Ack> = job.ack.into_iter().collect();
        if coalesce {
            while let Ok(next) = rx.try_recv() {
                batch.extend(next.batch);
                acks.extend(next.ack);
            }
        }

        let result = flusher.flush(batch).await;
        if let Err(err) = &result {
            error!(target: "writer", writer = name, worker, %err, "Failed to flush batch");
            metrics::counter!(Metrics::WRITER_FLUSH_FAILURES, "writer" => name).increment(1);
            fatal.trip(name);
        }

        let failed = result.is_err();
        let mut result = Some(result);
        for ack in acks {
            let outcome = match result.take() {
                Some(outcome) => outcome,
                None if failed => Err(WriterError::Closed(name)),
                None => Ok(()),
            };
            let _ = ack.send(outcome);
        }
    }
    debug!(target: "writer", writer = name, worker, "Worker stopped");
}

/// Splits `items` into owned chunks of at most `size` items.
pub(crate) fn chunked<T: Clone>(items: &[T], size: usize) -> impl Iterator<Item = Vec<T>> + '_ {
    items.chunks(size.max(1)).map(<[T]>::to_vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<u64>>>,
        fail_on: Option<u64>,
    }

    #[async_trait]
    impl Flush<u64> for Recorder {
        async fn flush(&self, batch: Vec<u64>) -> Result<(), WriterError> {
            if self.fail_on.is_some_and(|n| batch.contains(&n)) {
                return Err(WriterError::Closed("recorder"));
            }
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueue_and_wait_returns_after_flush() {
        let mut tasks = JoinSet::new();
        let recorder = Arc::new(Recorder::default());
        let writer =
            BatchWriter::spawn("test", 2, recorder.clone(), FatalSignal::default(), &mut tasks);

        writer.enqueue_and_wait(vec![1, 2]).await.unwrap();
        assert_eq!(recorder.batches.lock().unwrap().as_slice(), &[vec![1, 2]]);
    }

    #[tokio::test]
    async fn empty_batches_are_not_queued() {
        let mut tasks = JoinSet::new();
        let recorder = Arc::new(Recorder::default());
        let writer =
            BatchWriter::spawn("test", 1, recorder.clone(), FatalSignal::default(), &mut tasks);

        writer.enqueue_and_wait(Vec::new()).await.unwrap();
        assert!(recorder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_flush_trips_fatal_signal() {
        let mut tasks = JoinSet::new();
        let fatal = FatalSignal::default();
        let recorder = Arc::new(Recorder { fail_on: Some(7), ..Default::default() });
        let writer = BatchWriter::spawn("test", 1, recorder, fatal.clone(), &mut tasks);

        assert!(writer.enqueue_and_wait(vec![7]).await.is_err());
        assert!(fatal.is_tripped());

        while tasks.join_next().await.is_some() {}
        assert!(matches!(writer.enqueue(vec![1]).await, Err(WriterError::Closed("test"))));
    }

    #[tokio::test]
    async fn dropping_writer_drains_queue() {
        let mut tasks = JoinSet::new();
        let fatal = FatalSignal::default();
        let recorder = Arc::new(Recorder::default());
        let writer = BatchWriter::spawn("test", 1, recorder.clone(), fatal.clone(), &mut tasks);

        fatal.token().cancel();
        writer.enqueue(vec![1]).await.unwrap();
        drop(writer);

        while tasks.join_next().await.is_some() {}
        assert_eq!(recorder.batches.lock().unwrap().as_slice(), &[vec![1]]);
        assert!(!fatal.is_tripped());
    }

    #[tokio::test]
    async fn coalescing_writer_merges_queued_batches() {
        let mut tasks = JoinSet::new();
        let recorder = Arc::new(Recorder::default());
        let writer = BatchWriter::spawn_coalescing(
            "test",
            recorder.clone(),
            FatalSignal::default(),
            &mut tasks,
        );

        writer.enqueue(vec![1]).await.unwrap();
        writer.enqueue_and_wait(vec![2]).await.unwrap();
        let flushed: Vec<u64> = recorder.batches.lock().unwrap().concat();
        assert_eq!(flushed, vec![1, 2]);
    }

    #[rstest]
    #[case(2, vec![vec![1, 2], vec![3, 4], vec![5]])]
    #[case(5, vec![vec![1, 2, 3, 4, 5]])]
    #[case(9, vec![vec![1, 2, 3, 4, 5]])]
    fn chunks_never_exceed_size(#[case] size: usize, #[case] expected: Vec<Vec<u32>>) {
        let chunks: Vec<_> = chunked(&[1, 2, 3, 4, 5], size).collect();
        assert_eq!(chunks, expected);
    }
}
