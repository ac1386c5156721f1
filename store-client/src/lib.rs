//! Typed client for the ingestion-relevant Store API (spec §4.6 / §6).
//!
//! The relational store itself, its schema, and its migrations are out of
//! scope for this crate: it only speaks the HTTP surface the core
//! components need, and treats the server as the idempotency boundary.

mod model;

pub use model::{
    ClaimedPlayer, ClockFields, Color, Game, GameMetrics, GamePlayerLink, GameUpsert, Player,
    PlayerUpsert,
};

use miette::Diagnostic;
use reqwest::StatusCode;
use serde_json::Map;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("error executing store request")]
    Request(#[source] reqwest::Error),

    #[error("store returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client config is valid"),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn ok_or_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus { status, body })
        }
    }

    /// `POST /games/` — upsert one game, conflict on `game_id` updates all fields.
    pub async fn upsert_game(&self, game: &GameUpsert) -> Result<Game, StoreError> {
        let response = self
            .http
            .post(self.url("/games/"))
            .json(game)
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }

    /// `POST /games/batch` — upsert many games in a single statement.
    pub async fn upsert_games_batch(&self, games: &[GameUpsert]) -> Result<Vec<Game>, StoreError> {
        let response = self
            .http
            .post(self.url("/games/batch"))
            .json(games)
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }

    /// `POST /players/` — upsert one player. Never touches `last_fetched_at`.
    pub async fn upsert_player(&self, player: &PlayerUpsert) -> Result<Player, StoreError> {
        let response = self
            .http
            .post(self.url("/players/"))
            .json(player)
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }

    /// `POST /players/batch`
    pub async fn upsert_players_batch(
        &self,
        players: &[PlayerUpsert],
    ) -> Result<Vec<Player>, StoreError> {
        let response = self
            .http
            .post(self.url("/players/batch"))
            .json(players)
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }

    /// `POST /games/{id}/players/` — conflict on `(game_id, player_id)` does nothing.
    pub async fn link_player_to_game(&self, link: &GamePlayerLink) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.url(&format!("/games/{}/players/", link.game_id)))
            .json(link)
            .send()
            .await
            .map_err(StoreError::Request)?;
        Self::ok_or_status(response).await?;
        Ok(())
    }

    /// `POST /games/players/batch`
    pub async fn link_players_batch(&self, links: &[GamePlayerLink]) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.url("/games/players/batch"))
            .json(links)
            .send()
            .await
            .map_err(StoreError::Request)?;
        Self::ok_or_status(response).await?;
        Ok(())
    }

    /// `POST /games/{id}/moves/` — bulk insert; caller guarantees the SAN
    /// list is already parsed and non-duplicating.
    pub async fn insert_moves(&self, game_id: &str, moves: &[String]) -> Result<(), StoreError> {
        if moves.is_empty() {
            return Ok(());
        }
        #[derive(serde::Serialize)]
        struct Body<'a> {
            moves: &'a [String],
        }
        let response = self
            .http
            .post(self.url(&format!("/games/{game_id}/moves/")))
            .json(&Body { moves })
            .send()
            .await
            .map_err(StoreError::Request)?;
        Self::ok_or_status(response).await?;
        Ok(())
    }

    /// `GET /games/get_last_move_played_time[/{player}]` — the fetch cursor.
    /// Returns 0 when the player has no known games (or when asking for
    /// the global cursor with an empty store).
    pub async fn get_last_move_time(&self, player_id: Option<&str>) -> Result<i64, StoreError> {
        #[derive(serde::Deserialize)]
        struct Response {
            last_move_time: i64,
        }

        let path = match player_id {
            Some(id) => format!("/games/get_last_move_played_time/{id}"),
            None => "/games/get_last_move_played_time".to_string(),
        };

        let response = self
            .http
            .get(self.url(&path))
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = Self::ok_or_status(response).await?;
        let body: Response = response.json().await.map_err(StoreError::Request)?;
        Ok(body.last_move_time)
    }

    /// `GET /games/{id}/pgn`
    pub async fn get_pgn(&self, game_id: &str) -> Result<Option<String>, StoreError> {
        #[derive(serde::Deserialize)]
        struct Response {
            pgn: Option<String>,
        }

        let response = self
            .http
            .get(self.url(&format!("/games/{game_id}/pgn")))
            .send()
            .await
            .map_err(StoreError::Request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ok_or_status(response).await?;
        let body: Response = response.json().await.map_err(StoreError::Request)?;
        Ok(body.pgn)
    }

    /// `POST /games/{id}/metrics` — deep-merge into existing metrics JSON;
    /// creates the row if absent.
    pub async fn merge_metrics(
        &self,
        game_id: &str,
        metrics: &Map<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.url(&format!("/games/{game_id}/metrics")))
            .json(metrics)
            .send()
            .await
            .map_err(StoreError::Request)?;
        Self::ok_or_status(response).await?;
        Ok(())
    }

    /// `GET /games/{id}/metrics`
    pub async fn get_metrics(&self, game_id: &str) -> Result<Option<GameMetrics>, StoreError> {
        let response = self
            .http
            .get(self.url(&format!("/games/{game_id}/metrics")))
            .send()
            .await
            .map_err(StoreError::Request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ok_or_status(response).await?;
        response
            .json::<Option<GameMetrics>>()
            .await
            .map_err(StoreError::Request)
    }

    /// `POST /games/analysis/queue?limit=N` — up to `limit` `game_id`s
    /// lacking at least one of `plugin_names`.
    pub async fn list_games_needing_analysis(
        &self,
        plugin_names: &[&str],
        limit: u32,
    ) -> Result<Vec<String>, StoreError> {
        let response = self
            .http
            .post(self.url("/games/analysis/queue"))
            .query(&[("limit", limit.to_string())])
            .json(plugin_names)
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }

    /// `GET /players/process/next` — claim eligible under row lock with
    /// "skip locked", §4.1. `None` means no eligible row.
    pub async fn claim_next_player(&self) -> Result<Option<ClaimedPlayer>, StoreError> {
        let response = self
            .http
            .get(self.url("/players/process/next"))
            .send()
            .await
            .map_err(StoreError::Request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }

    /// `GET /players/{lichess_id}`
    pub async fn get_player(&self, player_id: &str) -> Result<Option<Player>, StoreError> {
        let response = self
            .http
            .get(self.url(&format!("/players/{player_id}")))
            .send()
            .await
            .map_err(StoreError::Request)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ok_or_status(response).await?;
        response.json().await.map_err(StoreError::Request)
    }
}
