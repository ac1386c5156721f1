//! Generic coordination primitives: named leases with a bounded blocking
//! wait and a lease TTL, and set-if-absent-with-TTL dedup keys.
//!
//! Backed by Redis, mirroring the `redis_client.lock(...)` /
//! `redis_client.set(key, "1", ex=...)` pattern the original system used
//! (`celery/tasks/fetching.py`, `celery/tasks/analysis.py`). The lock
//! token scheme (random value per acquisition, release via a
//! compare-and-delete script) matches the classic `redis`-library `Lock`
//! implementation that code relied on.

use futures::future::BoxFuture;
use miette::Diagnostic;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CoordinationError {
    #[error("error connecting to coordination backend")]
    Connect(#[source] redis::RedisError),

    #[error("coordination backend command failed")]
    Command(#[source] redis::RedisError),
}

#[derive(Clone)]
pub struct CoordinationClient {
    conn: ConnectionManager,
}

/// A held named lease. Must be released via [`CoordinationClient::release`]
/// on every exit path; if the process dies before releasing, the lease's
/// TTL reclaims it.
pub struct LockGuard {
    name: String,
    token: String,
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

impl CoordinationClient {
    pub async fn connect(url: &str) -> Result<Self, CoordinationError> {
        let client = redis::Client::open(url).map_err(CoordinationError::Connect)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(CoordinationError::Connect)?;
        Ok(Self { conn })
    }

    /// Attempts to acquire `name` for up to `wait_timeout`, polling every
    /// 200ms. The lease expires after `lease_ttl` even if never released,
    /// as a safety net for a crashed holder.
    pub async fn try_acquire_lock(
        &self,
        name: &str,
        wait_timeout: Duration,
        lease_ttl: Duration,
    ) -> Result<Option<LockGuard>, CoordinationError> {
        let token = fastrand::u64(..).to_string();
        let deadline = tokio::time::Instant::now() + wait_timeout;
        let mut conn = self.conn.clone();

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(name)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(lease_ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(CoordinationError::Command)?;

            if acquired.is_some() {
                return Ok(Some(LockGuard {
                    name: name.to_string(),
                    token,
                }));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Releases a held lease. A race against TTL expiry (the key already
    /// gone, or held by a different token) is not an error.
    pub async fn release(&self, guard: LockGuard) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(&guard.name)
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await
            .map_err(CoordinationError::Command)?;
        Ok(())
    }

    /// Sets `key` to `value` with `ttl` if and only if it does not already
    /// exist. Returns `true` if this call set it.
    pub async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(CoordinationError::Command)?;
        Ok(set.is_some())
    }

    /// Clears a dedup key (or a lock, bypassing the token check). Used by
    /// the analyzer to clear `analysis_pending:<game_id>` once finished.
    pub async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(CoordinationError::Command)?;
        Ok(())
    }
}

impl LockGuard {
    /// A lease that isn't backed by a real Redis key, for test doubles
    /// implementing [`LockBackend`].
    pub fn for_testing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: "test".to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Object-safe view of [`CoordinationClient`]'s operations, so callers can
/// depend on `Arc<dyn LockBackend>` and substitute an in-memory fake in
/// tests (per spec §6: "Generic named-lease primitive... Any
/// implementation that provides both suffices").
pub trait LockBackend: Send + Sync {
    fn try_acquire_lock<'a>(
        &'a self,
        name: &'a str,
        wait_timeout: Duration,
        lease_ttl: Duration,
    ) -> BoxFuture<'a, Result<Option<LockGuard>, CoordinationError>>;

    fn release<'a>(&'a self, guard: LockGuard) -> BoxFuture<'a, Result<(), CoordinationError>>;

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, CoordinationError>>;

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CoordinationError>>;
}

impl LockBackend for CoordinationClient {
    fn try_acquire_lock<'a>(
        &'a self,
        name: &'a str,
        wait_timeout: Duration,
        lease_ttl: Duration,
    ) -> BoxFuture<'a, Result<Option<LockGuard>, CoordinationError>> {
        Box::pin(CoordinationClient::try_acquire_lock(self, name, wait_timeout, lease_ttl))
    }

    fn release<'a>(&'a self, guard: LockGuard) -> BoxFuture<'a, Result<(), CoordinationError>> {
        Box::pin(CoordinationClient::release(self, guard))
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, CoordinationError>> {
        Box::pin(CoordinationClient::set_if_absent(self, key, value, ttl))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CoordinationError>> {
        Box::pin(CoordinationClient::delete(self, key))
    }
}
