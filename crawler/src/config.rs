use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the crawl and analysis pipeline.
///
/// Loaded by layering defaults, an optional `CRAWLER.toml`, `CRAWLER_`-
/// prefixed environment variables, and finally the four bare variable
/// names the spec promises external operators (`UPSTREAM_TOKEN`,
/// `UPSTREAM_USERNAME`, `STORE_BASE_URL`, `COORDINATION_URL`) — mirroring
/// `IngestConfig::figment()` in the teacher, but with an extra raw layer
/// for those four names specifically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub upstream_token: String,
    pub upstream_username: String,
    pub store_base_url: String,
    pub coordination_url: String,

    pub start_every_launch: bool,
    pub orchestrator_period_secs: u64,
    pub analysis_scheduler_period_secs: u64,

    pub fetch_max_games_per_page: u32,
    pub fetch_lock_wait_secs: u64,
    pub fetch_lock_lease_secs: u64,
    pub fetch_retry_backoff_secs: u64,
    pub fetch_max_retries: u32,

    pub ingest_concurrency: usize,
    pub analyze_concurrency: usize,

    pub analysis_candidate_limit: u32,
    pub analysis_enqueue_target: usize,
    pub analysis_dedup_ttl_secs: u64,

    /// Per-request timeout for the Store HTTP client.
    pub store_request_timeout_secs: u64,
    /// Per-request timeout for the upstream export client. Generous by
    /// default since the response body is streamed rather than buffered.
    pub upstream_request_timeout_secs: u64,
    /// Bound on how long the orchestrator will wait on a single Store call
    /// within one tick before giving up on that branch (§4.1).
    pub orchestrator_claim_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            upstream_token: String::new(),
            upstream_username: String::new(),
            store_base_url: "http://localhost:8000".to_string(),
            coordination_url: "redis://localhost:6379".to_string(),

            start_every_launch: true,
            orchestrator_period_secs: 60,
            analysis_scheduler_period_secs: 60,

            fetch_max_games_per_page: 1000,
            fetch_lock_wait_secs: 10,
            fetch_lock_lease_secs: 300,
            fetch_retry_backoff_secs: 10,
            fetch_max_retries: 5,

            ingest_concurrency: 8,
            analyze_concurrency: 8,

            analysis_candidate_limit: 1000,
            analysis_enqueue_target: 100,
            analysis_dedup_ttl_secs: 3600,

            store_request_timeout_secs: 10,
            upstream_request_timeout_secs: 60,
            orchestrator_claim_timeout_secs: 10,
        }
    }
}

impl CrawlerConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("CRAWLER.toml"))
            .merge(Env::prefixed("CRAWLER_"))
            .merge(Env::raw().only(&[
                "UPSTREAM_TOKEN",
                "UPSTREAM_USERNAME",
                "STORE_BASE_URL",
                "COORDINATION_URL",
            ]))
    }

    pub fn load() -> figment::Result<Self> {
        Self::figment().extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_timers() {
        let config = CrawlerConfig::default();
        assert_eq!(config.orchestrator_period_secs, 60);
        assert_eq!(config.analysis_scheduler_period_secs, 60);
        assert_eq!(config.fetch_max_games_per_page, 1000);
        assert_eq!(config.analysis_enqueue_target, 100);
        assert_eq!(config.analysis_dedup_ttl_secs, 3600);
        assert_eq!(config.store_request_timeout_secs, 10);
        assert_eq!(config.upstream_request_timeout_secs, 60);
        assert_eq!(config.orchestrator_claim_timeout_secs, 10);
    }
}
