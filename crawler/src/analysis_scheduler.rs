//! Periodic scheduler that discovers games missing plugin results and
//! dispatches deduplicated analyzer tasks, per §4.4.

use crate::queue::QueueHandle;
use coordination_client::LockBackend;
use std::sync::Arc;
use std::time::Duration;
use store_client::StoreClient;

pub struct AnalysisScheduler {
    store: StoreClient,
    coordination: Arc<dyn LockBackend>,
    analyze_queue: QueueHandle<String>,
    plugin_names: Vec<&'static str>,
    candidate_limit: u32,
    enqueue_target: usize,
    dedup_ttl: Duration,
}

impl AnalysisScheduler {
    pub fn new(
        store: StoreClient,
        coordination: Arc<dyn LockBackend>,
        analyze_queue: QueueHandle<String>,
        plugin_names: Vec<&'static str>,
        candidate_limit: u32,
        enqueue_target: usize,
        dedup_ttl: Duration,
    ) -> Self {
        Self {
            store,
            coordination,
            analyze_queue,
            plugin_names,
            candidate_limit,
            enqueue_target,
            dedup_ttl,
        }
    }

    /// Enqueues at most `enqueue_target` analyzer tasks; never enqueues
    /// two tasks for the same `game_id` within the dedup TTL window.
    pub async fn tick(&self) {
        let candidates = match self
            .store
            .list_games_needing_analysis(&self.plugin_names, self.candidate_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                log::error!("analysis scheduler: could not list candidates: {err}");
                return;
            }
        };

        let mut enqueued = 0usize;
        for game_id in candidates {
            if enqueued >= self.enqueue_target {
                break;
            }

            let key = format!("analysis_pending:{game_id}");
            match self.coordination.set_if_absent(&key, "1", self.dedup_ttl).await {
                Ok(true) => {
                    self.analyze_queue.push(game_id).await;
                    enqueued += 1;
                }
                Ok(false) => {
                    // Already pending from an earlier tick or a racing scheduler.
                }
                Err(err) => {
                    log::warn!("analysis scheduler: dedup check failed for '{game_id}': {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{raw_queue, FakeCoordination};
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    async fn spawn_store(candidates: Vec<String>) -> String {
        let app = Router::new().route(
            "/games/analysis/queue",
            post(move || {
                let candidates = candidates.clone();
                async move { Json(candidates) }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn make_scheduler(
        store_url: String,
        enqueue_target: usize,
    ) -> (AnalysisScheduler, Arc<FakeCoordination>, mpsc::Receiver<String>) {
        let store = StoreClient::new(store_url, Duration::from_secs(5));
        let coordination = Arc::new(FakeCoordination::new());
        let (analyze_queue, rx) = raw_queue::<String>("analyze");
        let scheduler = AnalysisScheduler::new(
            store,
            coordination.clone(),
            analyze_queue,
            vec!["move_count", "largest_swing"],
            1000,
            enqueue_target,
            Duration::from_secs(3600),
        );
        (scheduler, coordination, rx)
    }

    #[tokio::test]
    async fn enqueues_each_new_candidate() {
        let base_url = spawn_store(vec!["g1".to_string(), "g2".to_string()]).await;
        let (scheduler, _coordination, mut rx) = make_scheduler(base_url, 10);

        scheduler.tick().await;

        let mut enqueued = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
        enqueued.sort();
        assert_eq!(enqueued, vec!["g1".to_string(), "g2".to_string()]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn skips_a_candidate_already_marked_pending() {
        let base_url = spawn_store(vec!["g1".to_string(), "g2".to_string()]).await;
        let (scheduler, coordination, mut rx) = make_scheduler(base_url, 10);
        coordination.mark_pending("analysis_pending:g1");

        scheduler.tick().await;

        assert_eq!(rx.try_recv().unwrap(), "g2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stops_once_the_enqueue_target_is_reached() {
        let base_url = spawn_store(vec!["g1".to_string(), "g2".to_string(), "g3".to_string()]).await;
        let (scheduler, _coordination, mut rx) = make_scheduler(base_url, 2);

        scheduler.tick().await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
