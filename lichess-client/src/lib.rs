//! Typed client for the upstream lichess "games by user" NDJSON export.
//!
//! Mirrors one concurrent request at a time on the wire (the caller is
//! responsible for any cross-process exclusivity; this crate only knows
//! how to issue a single request and stream its body).

mod model;

pub use model::{RawClock, RawGame, RawPlayerSide, RawPlayers, RawUser};

use futures_util::{Stream, StreamExt, TryStreamExt};
use miette::Diagnostic;
use reqwest::StatusCode;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;

const DEFAULT_BASE_URL: &str = "https://lichess.org";

/// Query parameters for `GET /api/games/user/{player_id}`.
#[derive(Debug, Clone)]
pub struct ExportGamesParams {
    pub max: u32,
    pub since: Option<i64>,
}

impl Default for ExportGamesParams {
    fn default() -> Self {
        Self {
            max: 1000,
            since: None,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum UpstreamRequestError {
    #[error("player does not exist upstream")]
    NotFound,

    #[error("upstream rate limit hit")]
    RateLimited,

    #[error("upstream returned unexpected status {0}")]
    Status(StatusCode),

    #[error("error building upstream request")]
    RequestBuild(#[source] reqwest::Error),

    #[error("error executing upstream request")]
    RequestExecute(#[source] reqwest::Error),
}

/// A single malformed NDJSON line. The fetcher logs and skips these; they
/// never abort the stream.
#[derive(Debug, Error)]
#[error("malformed line: {source}")]
pub struct LineError {
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl UpstreamClient {
    pub fn new(token: impl Into<String>, request_timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token, request_timeout)
    }

    /// Used by tests to point at a local mock server.
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client config is valid"),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Issues exactly one streaming request for a player's games. Returns a
    /// line-oriented stream of raw NDJSON on success, or a typed status
    /// error the caller can use to decide whether to retry.
    pub async fn export_games(
        &self,
        player_id: &str,
        params: ExportGamesParams,
    ) -> Result<NdjsonLines, UpstreamRequestError> {
        let url = format!("{}/api/games/user/{player_id}", self.base_url);

        let mut request = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/x-ndjson")
            .query(&[
                ("max", params.max.to_string()),
                ("sort", "dateAsc".to_string()),
                ("pgnInJson", "true".to_string()),
            ]);

        if let Some(since) = params.since {
            request = request.query(&[("since", since)]);
        }

        let request = request.build().map_err(UpstreamRequestError::RequestBuild)?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(UpstreamRequestError::RequestExecute)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(UpstreamRequestError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => return Err(UpstreamRequestError::RateLimited),
            other => return Err(UpstreamRequestError::Status(other)),
        }

        let body = response
            .bytes_stream()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));
        let reader = StreamReader::new(body);
        let lines = LinesStream::new(tokio::io::BufReader::new(reader).lines());

        Ok(NdjsonLines {
            lines: Box::pin(lines),
        })
    }
}

/// Stream of raw lines from an in-flight export response. The caller
/// decides how to parse and what to do with a malformed line; this type
/// only owns the socket read.
pub struct NdjsonLines {
    lines: Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>,
}

impl Stream for NdjsonLines {
    type Item = std::io::Result<String>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.lines.poll_next_unpin(cx)
    }
}

/// Parses one NDJSON line into a [`RawGame`]. Kept as a free function so
/// callers can log the offending line's text on failure.
pub fn parse_game_line(line: &str) -> Result<RawGame, serde_json::Error> {
    serde_json::from_str(line)
}
