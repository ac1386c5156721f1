//! Runs every not-yet-present registered plugin against a game's PGN and
//! merges the results into its metrics, per §4.5.

use crate::engine::NullEngine;
use crate::pgn::parse_pgn;
use crate::plugins::RegisteredPlugin;
use coordination_client::LockBackend;
use miette::Diagnostic;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use store_client::{StoreClient, StoreError};
use thiserror::Error;

fn dedup_key(game_id: &str) -> String {
    format!("analysis_pending:{game_id}")
}

/// Everything a single analysis pass can fail on before the dedup key is
/// cleared in [`Analyzer::run`] (§4.5 / §7). Individual plugin failures are
/// not part of this type — those are caught and logged per plugin so one
/// plugin's exception never aborts the others.
#[derive(Debug, Error, Diagnostic)]
pub enum AnalyzeError {
    #[error("store call failed during analysis")]
    Store(#[from] StoreError),
}

pub struct Analyzer {
    store: StoreClient,
    coordination: Arc<dyn LockBackend>,
    plugins: Vec<RegisteredPlugin>,
}

impl Analyzer {
    pub fn new(store: StoreClient, coordination: Arc<dyn LockBackend>, plugins: Vec<RegisteredPlugin>) -> Self {
        Self {
            store,
            coordination,
            plugins,
        }
    }

    /// Runs the full per-game analysis pass. Clears the dedup key on
    /// every exit path, matching §4.5 step 6.
    pub async fn run(&self, game_id: String) {
        if let Err(err) = self.analyze(&game_id).await {
            log::error!("analysis failed for game '{game_id}': {err}");
        }
        if let Err(err) = self.coordination.delete(&dedup_key(&game_id)).await {
            log::warn!("could not clear dedup key for game '{game_id}': {err}");
        }
    }

    async fn analyze(&self, game_id: &str) -> Result<(), AnalyzeError> {
        let existing = self
            .store
            .get_metrics(game_id)
            .await?
            .map(|metrics| metrics.metrics)
            .unwrap_or_default();

        let pgn = match self.store.get_pgn(game_id).await? {
            Some(pgn) => pgn,
            None => {
                log::debug!("game '{game_id}' has no PGN yet, skipping analysis");
                return Ok(());
            }
        };

        let parsed = match parse_pgn(&pgn) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("game '{game_id}' PGN failed to parse: {err}");
                return Ok(());
            }
        };

        let mut collected = Map::new();
        // An engine is launched once per analysis task and released when
        // this function returns, covering every plugin that needs one.
        let mut engine = NullEngine::default();

        for plugin in &self.plugins {
            let name = plugin.name();
            if existing.contains_key(name) {
                continue;
            }

            let result: Result<Value, _> = match plugin {
                RegisteredPlugin::Pure(plugin) => plugin.analyze(&parsed),
                RegisteredPlugin::Engine(plugin) => plugin.analyze(&parsed, &mut engine),
            };
            match result {
                Ok(value) => {
                    collected.insert(name.to_string(), value);
                }
                Err(err) => {
                    log::warn!("plugin '{name}' failed for game '{game_id}': {err}");
                }
            }
        }

        if !collected.is_empty() {
            self.store.merge_metrics(game_id, &collected).await?;
        }

        Ok(())
    }
}
