//! A generic named queue realized as an mpsc channel plus a semaphore-gated
//! worker pool, standing in for the "scalable parallel queue" and
//! "serialized queue" concepts of §5. Concurrency 1 gives the fetch
//! queue's single-active-task guarantee; larger concurrency gives the
//! ingest/analyze queues their scale-out.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct QueueHandle<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> QueueHandle<T> {
    /// Enqueues an item. Blocks (asynchronously) if the queue's buffer is
    /// full, applying backpressure to the producer.
    pub async fn push(&self, item: T) {
        if self.tx.send(item).await.is_err() {
            log::error!("queue '{}' worker pool has shut down, dropping item", self.name);
        }
    }

    /// Builds a handle directly from a channel half, bypassing the worker
    /// pool. Lets tests assert on pushed items via the matching `Receiver`
    /// instead of racing an async pump.
    #[cfg(test)]
    pub(crate) fn from_parts(name: &'static str, tx: mpsc::Sender<T>) -> Self {
        Self { name, tx }
    }
}

/// Spawns `concurrency` workers draining `name`'s queue, each invoking
/// `handler` for one item at a time. Returns a handle producers use to
/// push work, and the pump task's join handle (used only for orderly
/// shutdown in `main`).
pub fn spawn_queue<T, H>(name: &'static str, concurrency: usize, buffer: usize, handler: H) -> (QueueHandle<T>, JoinHandle<()>)
where
    T: Send + 'static,
    H: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<T>(buffer);
    let handler = Arc::new(handler);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let pump = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                handler(item).await;
                drop(permit);
            });
        }
        log::debug!("queue '{name}' pump exiting");
    });

    (QueueHandle { name, tx }, pump)
}

/// Boxes an async closure body into the `BoxFuture` shape `spawn_queue`
/// expects, so call sites can write a plain `async move { .. }` block.
pub fn boxed<F>(fut: F) -> BoxFuture<'static, ()>
where
    F: Future<Output = ()> + Send + 'static,
{
    Box::pin(fut)
}
