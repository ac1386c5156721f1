//! The fetch queue's sole task: one serialized, lock-protected streaming
//! pull of a player's games from the upstream provider, per §4.2.

use crate::ingestor::IngestItem;
use crate::queue::QueueHandle;
use coordination_client::{CoordinationError, LockBackend};
use futures_util::StreamExt;
use lichess_client::{ExportGamesParams, RawGame, UpstreamClient, UpstreamRequestError};
use miette::Diagnostic;
use std::sync::Arc;
use std::time::Duration;
use store_client::{StoreClient, StoreError};
use thiserror::Error;

const UPSTREAM_LOCK_NAME: &str = "upstream_api_lock";

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub max_games_per_page: u32,
    pub lock_wait: Duration,
    pub lock_lease: Duration,
    pub retry_backoff: Duration,
    pub max_retries: u32,
}

/// One unit of fetch work: a player to pull, a resume cursor, and the
/// crawl depth opponents discovered from it should be assigned.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub player_id: String,
    pub since: i64,
    pub depth: i32,
}

/// Everything a fetch attempt can fail on before it reaches the retry/stop
/// decision in [`Fetcher::run`] (§4.2 / §7). Carried only for structured
/// logging — the caller always recovers by retrying or giving up, never by
/// matching a variant.
#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("coordination service error acquiring the upstream lock")]
    Lock(#[from] CoordinationError),

    #[error("could not read the store cursor")]
    Cursor(#[source] StoreError),

    #[error("upstream request failed")]
    Upstream(#[from] UpstreamRequestError),
}

pub struct Fetcher {
    upstream: UpstreamClient,
    coordination: Arc<dyn LockBackend>,
    store: StoreClient,
    ingest_queue: QueueHandle<IngestItem>,
    fetch_queue: QueueHandle<FetchTask>,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(
        upstream: UpstreamClient,
        coordination: Arc<dyn LockBackend>,
        store: StoreClient,
        ingest_queue: QueueHandle<IngestItem>,
        fetch_queue: QueueHandle<FetchTask>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            upstream,
            coordination,
            store,
            ingest_queue,
            fetch_queue,
            settings,
        }
    }

    /// Runs one fetch task to completion, including its own retry loop.
    /// Never panics and never returns an error the caller must handle —
    /// per §4.2/§7, all failures are logged and swallowed at the task
    /// boundary.
    pub async fn run(&self, task: FetchTask) {
        let mut attempt = 0u32;
        loop {
            match self.attempt(&task).await {
                AttemptOutcome::Done => return,
                AttemptOutcome::NotFound => {
                    log::info!("player '{}' does not exist upstream, stopping", task.player_id);
                    return;
                }
                AttemptOutcome::Retry => {
                    attempt += 1;
                    if attempt > self.settings.max_retries {
                        log::error!(
                            "fetch for '{}' exhausted {} retries, giving up",
                            task.player_id,
                            self.settings.max_retries
                        );
                        return;
                    }
                    log::warn!(
                        "fetch for '{}' retrying (attempt {}/{}) after backoff",
                        task.player_id,
                        attempt,
                        self.settings.max_retries
                    );
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
            }
        }
    }

    async fn attempt(&self, task: &FetchTask) -> AttemptOutcome {
        let guard = match self
            .coordination
            .try_acquire_lock(UPSTREAM_LOCK_NAME, self.settings.lock_wait, self.settings.lock_lease)
            .await
        {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                log::warn!("could not acquire '{UPSTREAM_LOCK_NAME}' within the bounded wait");
                return AttemptOutcome::Retry;
            }
            Err(err) => {
                let err = FetchError::from(err);
                log::error!("fetch for '{}': {err}", task.player_id);
                return AttemptOutcome::Retry;
            }
        };

        let since = if task.since > 0 {
            task.since
        } else {
            match self.store.get_last_move_time(Some(&task.player_id)).await {
                Ok(cursor) => cursor,
                Err(err) => {
                    let err = FetchError::Cursor(err);
                    log::warn!("fetch for '{}': {err}", task.player_id);
                    0
                }
            }
        };

        let params = ExportGamesParams {
            max: self.settings.max_games_per_page,
            since: if since > 0 { Some(since) } else { None },
        };

        let stream_result = self.upstream.export_games(&task.player_id, params).await;

        let outcome = match stream_result {
            Ok(mut lines) => {
                let mut seen = 0u32;
                let mut max_last_move_at = 0i64;

                while let Some(line) = lines.next().await {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            log::warn!("error reading upstream stream for '{}': {err}", task.player_id);
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    seen += 1;
                    match lichess_client::parse_game_line(&line) {
                        Ok(game) => {
                            max_last_move_at = max_last_move_at.max(game.last_move_at);
                            self.dispatch_ingest(game, task.depth).await;
                        }
                        Err(err) => {
                            log::warn!("malformed NDJSON line for '{}': {err}", task.player_id);
                        }
                    }
                }

                if seen >= self.settings.max_games_per_page && max_last_move_at > 0 {
                    let continuation = FetchTask {
                        player_id: task.player_id.clone(),
                        since: max_last_move_at + 1,
                        depth: task.depth,
                    };
                    self.fetch_queue.push(continuation).await;
                }

                AttemptOutcome::Done
            }
            Err(UpstreamRequestError::NotFound) => AttemptOutcome::NotFound,
            Err(UpstreamRequestError::RateLimited) => {
                log::warn!("upstream rate-limited fetch for '{}'", task.player_id);
                AttemptOutcome::Retry
            }
            Err(err) => {
                let err = FetchError::from(err);
                log::warn!("fetch for '{}': {err}", task.player_id);
                AttemptOutcome::Retry
            }
        };

        if let Err(err) = self.coordination.release(guard).await {
            log::debug!("releasing '{UPSTREAM_LOCK_NAME}' raced TTL expiry: {err}");
        }

        outcome
    }

    async fn dispatch_ingest(&self, game: RawGame, depth: i32) {
        self.ingest_queue.push(IngestItem { game, depth }).await;
    }
}

enum AttemptOutcome {
    Done,
    NotFound,
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{raw_queue, FakeCoordination};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn settings(max_games_per_page: u32, max_retries: u32) -> FetchSettings {
        FetchSettings {
            max_games_per_page,
            lock_wait: Duration::from_millis(50),
            lock_lease: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(1),
            max_retries,
        }
    }

    fn game_line(id: &str, last_move_at: i64) -> String {
        format!(
            r#"{{"id":"{id}","rated":true,"variant":"standard","speed":"blitz","perf":"blitz","createdAt":1,"lastMoveAt":{last_move_at},"status":"mate","players":{{"white":{{"rating":1500}},"black":{{"rating":1480}}}}}}"#
        )
    }

    #[derive(Clone, Default)]
    struct UpstreamState {
        calls: std::sync::Arc<AtomicUsize>,
    }

    enum Mode {
        Page(Vec<String>),
        NotFound,
        FlakyThenPage(Vec<String>),
        AlwaysRateLimited,
    }

    async fn spawn_upstream(mode: Mode) -> String {
        let state = UpstreamState::default();
        let mode = std::sync::Arc::new(mode);
        let app = Router::new()
            .route(
                "/api/games/user/{player_id}",
                get(move |Path(_player_id): Path<String>, State(state): State<UpstreamState>| {
                    let mode = mode.clone();
                    async move {
                        match &*mode {
                            Mode::Page(lines) => (StatusCode::OK, lines.join("\n")).into_response(),
                            Mode::NotFound => (StatusCode::NOT_FOUND, String::new()).into_response(),
                            Mode::FlakyThenPage(lines) => {
                                if state.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                                    (StatusCode::TOO_MANY_REQUESTS, String::new()).into_response()
                                } else {
                                    (StatusCode::OK, lines.join("\n")).into_response()
                                }
                            }
                            Mode::AlwaysRateLimited => {
                                state.calls.fetch_add(1, Ordering::SeqCst);
                                (StatusCode::TOO_MANY_REQUESTS, String::new()).into_response()
                            }
                        }
                    }
                }),
            )
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn make_fetcher(
        upstream_url: String,
        settings: FetchSettings,
    ) -> (Fetcher, mpsc::Receiver<IngestItem>, mpsc::Receiver<FetchTask>) {
        let upstream = UpstreamClient::with_base_url(upstream_url, "token", Duration::from_secs(5));
        let store = StoreClient::new("http://127.0.0.1:1", Duration::from_millis(50));
        let coordination: Arc<dyn LockBackend> = Arc::new(FakeCoordination::new());
        let (ingest_queue, ingest_rx) = raw_queue::<IngestItem>("ingest");
        let (fetch_queue, fetch_rx) = raw_queue::<FetchTask>("fetch");
        let fetcher = Fetcher::new(upstream, coordination, store, ingest_queue, fetch_queue.clone(), settings);
        (fetcher, ingest_rx, fetch_rx)
    }

    #[tokio::test]
    async fn pagination_continuation_enqueues_next_page() {
        let lines = vec![game_line("g1", 10), game_line("g2", 20)];
        let base_url = spawn_upstream(Mode::Page(lines)).await;
        let (fetcher, mut ingest_rx, mut fetch_rx) = make_fetcher(base_url, settings(2, 3));

        fetcher
            .run(FetchTask {
                player_id: "alice".to_string(),
                since: 1,
                depth: 0,
            })
            .await;

        assert_eq!(ingest_rx.try_recv().unwrap().game.id, "g1");
        assert_eq!(ingest_rx.try_recv().unwrap().game.id, "g2");
        let continuation = fetch_rx.try_recv().unwrap();
        assert_eq!(continuation.since, 21);
        assert_eq!(continuation.player_id, "alice");
    }

    #[tokio::test]
    async fn short_page_does_not_enqueue_continuation() {
        let lines = vec![game_line("g1", 10)];
        let base_url = spawn_upstream(Mode::Page(lines)).await;
        let (fetcher, mut ingest_rx, mut fetch_rx) = make_fetcher(base_url, settings(2, 3));

        fetcher
            .run(FetchTask {
                player_id: "alice".to_string(),
                since: 1,
                depth: 0,
            })
            .await;

        assert_eq!(ingest_rx.try_recv().unwrap().game.id, "g1");
        assert!(fetch_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn not_found_stops_without_retry() {
        let base_url = spawn_upstream(Mode::NotFound).await;
        let (fetcher, mut ingest_rx, mut fetch_rx) = make_fetcher(base_url, settings(10, 3));

        fetcher
            .run(FetchTask {
                player_id: "ghost".to_string(),
                since: 1,
                depth: 0,
            })
            .await;

        assert!(ingest_rx.try_recv().is_err());
        assert!(fetch_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rate_limit_retries_then_succeeds() {
        let lines = vec![game_line("g1", 10)];
        let base_url = spawn_upstream(Mode::FlakyThenPage(lines)).await;
        let (fetcher, mut ingest_rx, _fetch_rx) = make_fetcher(base_url, settings(10, 3));

        fetcher
            .run(FetchTask {
                player_id: "alice".to_string(),
                since: 1,
                depth: 0,
            })
            .await;

        assert_eq!(ingest_rx.try_recv().unwrap().game.id, "g1");
    }

    #[tokio::test]
    async fn exhausts_retries_and_gives_up() {
        let base_url = spawn_upstream(Mode::AlwaysRateLimited).await;
        let (fetcher, mut ingest_rx, mut fetch_rx) = make_fetcher(base_url, settings(10, 2));

        fetcher
            .run(FetchTask {
                player_id: "alice".to_string(),
                since: 1,
                depth: 0,
            })
            .await;

        // Reaching here without hanging demonstrates the retry loop
        // terminated once `max_retries` was exceeded; nothing was ever
        // parsed out of a response, so both queues stay empty.
        assert!(ingest_rx.try_recv().is_err());
        assert!(fetch_rx.try_recv().is_err());
    }
}
