//! Periodic scheduler that elects the next player(s) to fetch, per §4.1.
//! Fires every `period` and once immediately at process start (wired in
//! `main`).

use crate::fetcher::FetchTask;
use crate::queue::QueueHandle;
use std::time::Duration;
use store_client::StoreClient;

#[derive(Clone)]
pub struct Orchestrator {
    store: StoreClient,
    seed_player_id: String,
    fetch_queue: QueueHandle<FetchTask>,
    claim_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: StoreClient,
        seed_player_id: String,
        fetch_queue: QueueHandle<FetchTask>,
        claim_timeout: Duration,
    ) -> Self {
        Self {
            store,
            seed_player_id,
            fetch_queue,
            claim_timeout,
        }
    }

    /// At most two fetch work items enqueued; never throws — each branch's
    /// own failures are logged and don't prevent the other from running.
    ///
    /// Runs the seed and opponent branches as two independent tokio tasks
    /// (§4.1a) so a slow or hung Store call on one branch can never delay
    /// the other; each branch additionally bounds its own Store call to
    /// `claim_timeout` (§4.1 "never block on network longer than the claim
    /// timeout").
    pub async fn tick(&self) {
        let seed = tokio::spawn({
            let this = self.clone();
            async move { this.seed_branch().await }
        });
        let opponent = tokio::spawn({
            let this = self.clone();
            async move { this.opponent_branch().await }
        });

        if let Err(err) = seed.await {
            log::error!("orchestrator: seed branch task panicked: {err}");
        }
        if let Err(err) = opponent.await {
            log::error!("orchestrator: opponent branch task panicked: {err}");
        }
    }

    async fn seed_branch(&self) {
        let cursor = match tokio::time::timeout(
            self.claim_timeout,
            self.store.get_last_move_time(Some(&self.seed_player_id)),
        )
        .await
        {
            Ok(Ok(cursor)) => cursor,
            Ok(Err(err)) => {
                log::error!("orchestrator: could not read seed cursor: {err}");
                return;
            }
            Err(_) => {
                log::error!("orchestrator: seed cursor read exceeded the claim timeout");
                return;
            }
        };

        self.fetch_queue
            .push(FetchTask {
                player_id: self.seed_player_id.clone(),
                since: cursor,
                depth: 0,
            })
            .await;
    }

    async fn opponent_branch(&self) {
        let claimed = match tokio::time::timeout(self.claim_timeout, self.store.claim_next_player()).await {
            Ok(Ok(Some(claimed))) => claimed,
            Ok(Ok(None)) => return,
            Ok(Err(err)) => {
                log::error!("orchestrator: could not claim next player: {err}");
                return;
            }
            Err(_) => {
                log::error!("orchestrator: claim_next_player exceeded the claim timeout");
                return;
            }
        };

        self.fetch_queue
            .push(FetchTask {
                player_id: claimed.player_id,
                since: claimed.previous_last_fetched_at.unwrap_or(0),
                depth: claimed.depth,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::raw_queue;
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct FakeStoreState {
        claims_served: Arc<AtomicUsize>,
    }

    async fn spawn_store(claim_once: bool) -> String {
        let state = FakeStoreState::default();
        let app = Router::new()
            .route(
                "/games/get_last_move_played_time/{player_id}",
                get(|| async { Json(serde_json::json!({"last_move_time": 42})) }),
            )
            .route(
                "/players/process/next",
                get(move |State(state): State<FakeStoreState>| {
                    let claim_once = claim_once;
                    async move {
                        if claim_once && state.claims_served.fetch_add(1, Ordering::SeqCst) == 0 {
                            Json(serde_json::json!({
                                "player_id": "bob",
                                "depth": 1,
                                "previous_last_fetched_at": 7,
                            }))
                            .into_response()
                        } else {
                            (axum::http::StatusCode::NOT_FOUND, "").into_response()
                        }
                    }
                }),
            )
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn seed_branch_enqueues_with_store_cursor() {
        let base_url = spawn_store(false).await;
        let store = StoreClient::new(base_url, Duration::from_secs(5));
        let (fetch_queue, mut rx) = raw_queue::<FetchTask>("fetch");
        let orchestrator = Orchestrator::new(store, "seed".to_string(), fetch_queue, Duration::from_secs(5));

        orchestrator.tick().await;

        let mut seen_seed = false;
        while let Ok(task) = rx.try_recv() {
            if task.player_id == "seed" {
                seen_seed = true;
                assert_eq!(task.since, 42);
                assert_eq!(task.depth, 0);
            }
        }
        assert!(seen_seed);
    }

    #[tokio::test]
    async fn opponent_branch_enqueues_claimed_player() {
        let base_url = spawn_store(true).await;
        let store = StoreClient::new(base_url, Duration::from_secs(5));
        let (fetch_queue, mut rx) = raw_queue::<FetchTask>("fetch");
        let orchestrator = Orchestrator::new(store, "seed".to_string(), fetch_queue, Duration::from_secs(5));

        orchestrator.tick().await;

        let mut seen_opponent = false;
        while let Ok(task) = rx.try_recv() {
            if task.player_id == "bob" {
                seen_opponent = true;
                assert_eq!(task.since, 7);
                assert_eq!(task.depth, 1);
            }
        }
        assert!(seen_opponent);
    }

    #[tokio::test]
    async fn opponent_branch_is_a_no_op_when_nothing_is_claimable() {
        let base_url = spawn_store(false).await;
        let store = StoreClient::new(base_url, Duration::from_secs(5));
        let (fetch_queue, mut rx) = raw_queue::<FetchTask>("fetch");
        let orchestrator = Orchestrator::new(store, "seed".to_string(), fetch_queue, Duration::from_secs(5));

        orchestrator.tick().await;

        let mut opponent_tasks = 0;
        while let Ok(task) = rx.try_recv() {
            if task.player_id != "seed" {
                opponent_tasks += 1;
            }
        }
        assert_eq!(opponent_tasks, 0);
    }
}
