use std::collections::BTreeMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// An item or result tagged with its submission sequence number.
struct Sequenced<T> {
    seq: u64,
    value: T,
}

/// The queue stopped accepting work because its consumer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ordered queue is closed")]
pub struct QueueClosed;

/// Constructor for an ordered parallel pipeline.
///
/// [`OrderedQueue::start`] splits the pipeline into a [`QueueSender`] for
/// the producer and a [`QueueReceiver`] for the consumer. The two halves are
/// meant to be driven concurrently: the output channel is bounded, so a
/// producer that submits everything before anyone reads will stall once
/// the pipeline fills up.
pub struct OrderedQueue;

impl OrderedQueue {
    /// Spawn `workers` worker tasks and the sequencing task on the current
    /// tokio runtime.
    ///
    /// Failures belong in `R` (for example a `Result`); the pipeline itself
    /// never aborts on a bad item, and one slow or failed item never blocks
    /// delivery of the ones after it beyond the wait for its own result.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<T, R, F, Fut>(
        workers: NonZeroUsize,
        transform: F,
    ) -> (QueueSender<T>, QueueReceiver<R>)
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let workers = workers.get();
        // Capacity 1 is the closest tokio gets to a rendezvous channel: at
        // most `workers` items in flight plus one waiting.
        let (input_tx, input_rx) = mpsc::channel::<Sequenced<T>>(1);
        let (results_tx, results_rx) = mpsc::channel::<Sequenced<R>>(workers);
        let (output_tx, output_rx) = mpsc::channel::<R>(1);

        let input_rx = Arc::new(Mutex::new(input_rx));
        let transform = Arc::new(transform);
        for id in 0..workers {
            tokio::spawn(work(
                id,
                Arc::clone(&input_rx),
                results_tx.clone(),
                Arc::clone(&transform),
            ));
        }
        // The sequencer sees end-of-results once every worker has exited.
        drop(results_tx);
        tokio::spawn(sequence(results_rx, output_tx));

        (
            QueueSender {
                input: input_tx,
                next_seq: 0,
            },
            QueueReceiver {
                output: output_rx,
                current: None,
                delivered: 0,
            },
        )
    }
}

/// Producer half of an ordered queue.
pub struct QueueSender<T> {
    input: mpsc::Sender<Sequenced<T>>,
    next_seq: u64,
}

impl<T: Send + 'static> QueueSender<T> {
    /// Submit `item`, returning its sequence number.
    ///
    /// Waits while every worker is busy. Fails only if the consumer has
    /// dropped its [`QueueReceiver`] and the pipeline has shut down.
    pub async fn add(&mut self, item: T) -> Result<u64, QueueClosed> {
        let seq = self.next_seq;
        self.input
            .send(Sequenced { seq, value: item })
            .await
            .map_err(|_| QueueClosed)?;
        self.next_seq += 1;
        Ok(seq)
    }

    /// Number of items submitted so far.
    pub fn submitted(&self) -> u64 {
        self.next_seq
    }

    /// Signal that no more items will be submitted.
    ///
    /// Consumes the sender, so ending twice or adding after the end cannot
    /// be expressed. Dropping the sender has the same effect.
    pub fn end(self) -> u64 {
        trace!(submitted = self.next_seq, "queue input ended");
        self.next_seq
    }

    /// Spawn a producer task that submits every item of `items` in order and
    /// then ends the queue. Resolves to the number of items submitted.
    pub fn feed<I>(mut self, items: I) -> JoinHandle<Result<u64, QueueClosed>>
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        tokio::spawn(async move {
            for item in items {
                self.add(item).await?;
            }
            Ok(self.end())
        })
    }
}

/// Consumer half of an ordered queue.
pub struct QueueReceiver<R> {
    output: mpsc::Receiver<R>,
    current: Option<R>,
    delivered: u64,
}

impl<R> QueueReceiver<R> {
    /// Wait for the next result in submission order.
    ///
    /// Returns `false` once the queue has been ended and every submitted
    /// item has been delivered; it keeps returning `false` after that.
    pub async fn next(&mut self) -> bool {
        match self.output.recv().await {
            Some(result) => {
                self.current = Some(result);
                self.delivered += 1;
                true
            }
            None => {
                self.current = None;
                false
            }
        }
    }

    /// The result delivered by the last successful [`QueueReceiver::next`].
    pub fn current(&self) -> Option<&R> {
        self.current.as_ref()
    }

    /// Take ownership of the current result.
    pub fn take_current(&mut self) -> Option<R> {
        self.current.take()
    }

    /// Wait for and return the next result, or `None` when exhausted.
    pub async fn recv(&mut self) -> Option<R> {
        if self.next().await {
            self.take_current()
        } else {
            None
        }
    }

    /// Number of results delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

async fn work<T, R, F, Fut>(
    id: usize,
    input: Arc<Mutex<mpsc::Receiver<Sequenced<T>>>>,
    results: mpsc::Sender<Sequenced<R>>,
    transform: Arc<F>,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    loop {
        let next = input.lock().await.recv().await;
        let Some(Sequenced { seq, value }) = next else {
            break;
        };
        let result = transform(value).await;
        if results.send(Sequenced { seq, value: result }).await.is_err() {
            break;
        }
    }
    trace!(worker = id, "worker exiting");
}

/// Re-serialize results into submission order.
///
/// Out-of-order results wait in `held` until everything before them has
/// been emitted. Memory use is proportional to how far ahead of the slowest
/// in-flight item the others have finished, not to the total item count.
async fn sequence<R>(mut results: mpsc::Receiver<Sequenced<R>>, output: mpsc::Sender<R>) {
    let mut expected: u64 = 0;
    let mut held: BTreeMap<u64, R> = BTreeMap::new();

    while let Some(Sequenced { seq, value }) = results.recv().await {
        if seq != expected {
            held.insert(seq, value);
            continue;
        }
        if output.send(value).await.is_err() {
            return;
        }
        expected += 1;
        while let Some(value) = held.remove(&expected) {
            if output.send(value).await.is_err() {
                return;
            }
            expected += 1;
        }
    }

    // Every worker has exited. Anything still held means a worker died
    // mid-item; deliver the rest in order rather than hang the consumer.
    if !held.is_empty() {
        error!(
            missing = expected,
            held = held.len(),
            "ordered queue lost a result; delivering remaining results"
        );
        for (_, value) in held {
            if output.send(value).await.is_err() {
                return;
            }
        }
    }
    trace!(delivered = expected, "sequencer finished");
}
