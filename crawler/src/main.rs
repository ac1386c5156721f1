mod analysis_scheduler;
mod analyzer;
mod config;
mod engine;
mod fetcher;
mod ingestor;
mod moves;
mod orchestrator;
mod pgn;
mod plugins;
mod queue;
#[cfg(test)]
mod test_support;

use analysis_scheduler::AnalysisScheduler;
use analyzer::Analyzer;
use config::CrawlerConfig;
use coordination_client::{CoordinationClient, LockBackend};
use fetcher::{FetchSettings, FetchTask, Fetcher};
use ingestor::{IngestItem, Ingestor};
use lichess_client::UpstreamClient;
use orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use store_client::StoreClient;
use tokio::sync::OnceCell;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match CrawlerConfig::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    let upstream = UpstreamClient::new(
        config.upstream_token.clone(),
        Duration::from_secs(config.upstream_request_timeout_secs),
    );
    let store = StoreClient::new(
        config.store_base_url.clone(),
        Duration::from_secs(config.store_request_timeout_secs),
    );
    let coordination: Arc<dyn LockBackend> = match CoordinationClient::connect(&config.coordination_url).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            log::error!("failed to connect to coordination backend: {err}");
            std::process::exit(1);
        }
    };

    let (ingest_queue, _ingest_pump) = queue::spawn_queue::<IngestItem, _>(
        "ingest",
        config.ingest_concurrency,
        config.ingest_concurrency * 4,
        {
            let ingestor = Arc::new(Ingestor::new(store.clone()));
            move |item| {
                let ingestor = ingestor.clone();
                queue::boxed(async move { ingestor.run(item).await })
            }
        },
    );

    let fetcher_cell: Arc<OnceCell<Fetcher>> = Arc::new(OnceCell::new());
    let (fetch_queue, _fetch_pump) = queue::spawn_queue::<FetchTask, _>("fetch", 1, 16, {
        let fetcher_cell = fetcher_cell.clone();
        move |task| {
            let fetcher_cell = fetcher_cell.clone();
            queue::boxed(async move {
                if let Some(fetcher) = fetcher_cell.get() {
                    fetcher.run(task).await;
                } else {
                    log::error!("fetch queue drained a task before the fetcher was initialized");
                }
            })
        }
    });

    let fetch_settings = FetchSettings {
        max_games_per_page: config.fetch_max_games_per_page,
        lock_wait: Duration::from_secs(config.fetch_lock_wait_secs),
        lock_lease: Duration::from_secs(config.fetch_lock_lease_secs),
        retry_backoff: Duration::from_secs(config.fetch_retry_backoff_secs),
        max_retries: config.fetch_max_retries,
    };
    let fetcher = Fetcher::new(
        upstream,
        coordination.clone(),
        store.clone(),
        ingest_queue,
        fetch_queue.clone(),
        fetch_settings,
    );
    // OnceCell::set only fails if already set, which cannot happen here.
    let _ = fetcher_cell.set(fetcher);

    let (analyze_queue, _analyze_pump) = queue::spawn_queue::<String, _>(
        "analyze",
        config.analyze_concurrency,
        config.analyze_concurrency * 4,
        {
            let analyzer = Arc::new(Analyzer::new(store.clone(), coordination.clone(), plugins::registry()));
            move |game_id| {
                let analyzer = analyzer.clone();
                queue::boxed(async move { analyzer.run(game_id).await })
            }
        },
    );

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        config.upstream_username.clone(),
        fetch_queue,
        Duration::from_secs(config.orchestrator_claim_timeout_secs),
    ));
    let plugin_names: Vec<&'static str> = plugins::registry().iter().map(|plugin| plugin.name()).collect();
    let analysis_scheduler = Arc::new(AnalysisScheduler::new(
        store,
        coordination,
        analyze_queue,
        plugin_names,
        config.analysis_candidate_limit,
        config.analysis_enqueue_target,
        Duration::from_secs(config.analysis_dedup_ttl_secs),
    ));

    let orchestrator_task = {
        let orchestrator = orchestrator.clone();
        let period = Duration::from_secs(config.orchestrator_period_secs);
        let start_every_launch = config.start_every_launch;
        tokio::spawn(async move {
            run_periodically(period, start_every_launch, move || {
                let orchestrator = orchestrator.clone();
                async move { orchestrator.tick().await }
            })
            .await;
        })
    };

    let analysis_scheduler_task = {
        let scheduler = analysis_scheduler.clone();
        let period = Duration::from_secs(config.analysis_scheduler_period_secs);
        let start_every_launch = config.start_every_launch;
        tokio::spawn(async move {
            run_periodically(period, start_every_launch, move || {
                let scheduler = scheduler.clone();
                async move { scheduler.tick().await }
            })
            .await;
        })
    };

    log::info!("crawler running; seed user '{}'", config.upstream_username);

    let _ = tokio::join!(orchestrator_task, analysis_scheduler_task);
}

/// Fires `action` immediately (when `run_immediately` is set) and then
/// every `period`, forever. Each tick's own failures are the caller's
/// responsibility to swallow — this loop never stops because one did.
async fn run_periodically<F, Fut>(period: Duration, run_immediately: bool, action: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    if run_immediately {
        action().await;
    }
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        action().await;
    }
}
