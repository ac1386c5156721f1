//! Shared test doubles for the crawler's tick/run loops. Real `StoreClient`s
//! point at in-process axum servers (mirroring
//! `lichess-client/tests/export_games.rs`); `CoordinationClient` is
//! Redis-backed and has no such seam, so components depend on
//! `Arc<dyn LockBackend>` and get a [`FakeCoordination`] instead.

use crate::queue::QueueHandle;
use coordination_client::{CoordinationError, LockBackend, LockGuard};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Builds a [`QueueHandle`] backed directly by a channel the test owns, so
/// assertions read pushed items with `try_recv` instead of racing a worker
/// pool.
pub fn raw_queue<T: Send + 'static>(name: &'static str) -> (QueueHandle<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(64);
    (QueueHandle::from_parts(name, tx), rx)
}

/// An in-memory stand-in for the Redis-backed coordination service: locks
/// always grant immediately, and dedup keys are a plain set.
#[derive(Default)]
pub struct FakeCoordination {
    locked: Mutex<bool>,
    dedup_keys: Mutex<HashSet<String>>,
}

impl FakeCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as already pending, as if a previous tick's
    /// `set_if_absent` had won the race.
    pub fn mark_pending(&self, key: &str) {
        self.dedup_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.dedup_keys.lock().unwrap().contains(key)
    }
}

impl LockBackend for FakeCoordination {
    fn try_acquire_lock<'a>(
        &'a self,
        name: &'a str,
        _wait_timeout: Duration,
        _lease_ttl: Duration,
    ) -> BoxFuture<'a, Result<Option<LockGuard>, CoordinationError>> {
        Box::pin(async move {
            let mut locked = self.locked.lock().unwrap();
            if *locked {
                Ok(None)
            } else {
                *locked = true;
                Ok(Some(LockGuard::for_testing(name)))
            }
        })
    }

    fn release<'a>(&'a self, _guard: LockGuard) -> BoxFuture<'a, Result<(), CoordinationError>> {
        Box::pin(async move {
            *self.locked.lock().unwrap() = false;
            Ok(())
        })
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        _value: &'a str,
        _ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, CoordinationError>> {
        Box::pin(async move {
            let mut keys = self.dedup_keys.lock().unwrap();
            Ok(keys.insert(key.to_string()))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CoordinationError>> {
        Box::pin(async move {
            self.dedup_keys.lock().unwrap().remove(key);
            Ok(())
        })
    }
}
