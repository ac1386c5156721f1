use serde::{Deserialize, Serialize};
use serde_json::Map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockFields {
    pub initial: i64,
    pub increment: i64,
    pub total_time: i64,
}

/// Fields accepted by the game upsert operation (§4.6 "Upsert game").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameUpsert {
    pub game_id: String,
    pub rated: bool,
    pub variant: String,
    pub speed: String,
    pub perf: String,
    pub created_at: i64,
    pub last_move_at: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockFields>,
}

/// The canonical game row, returned by the Store after an upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub rated: bool,
    pub variant: String,
    pub speed: String,
    pub perf: String,
    pub created_at: i64,
    pub last_move_at: i64,
    pub status: String,
    pub winner: Option<String>,
    pub pgn: Option<String>,
    pub clock: Option<ClockFields>,
}

/// Fields accepted by the player upsert operation. Deliberately has no
/// `last_fetched_at` field: the Store never lets this path touch it
/// (§3 invariant, §4.6 "Upsert player").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerUpsert {
    pub player_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flair: Option<String>,
    pub depth: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub name: String,
    pub flair: Option<String>,
    pub depth: i32,
    pub last_fetched_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayerLink {
    pub game_id: String,
    pub player_id: String,
    pub color: Color,
    pub rating: i64,
    pub rating_diff: i64,
}

/// Response of the orchestrator's claim operation (§4.1). `previous_last_fetched_at`
/// is the value the row had *before* this claim advanced it, which is the
/// cursor the fetcher should resume from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedPlayer {
    pub player_id: String,
    pub depth: i32,
    pub previous_last_fetched_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameMetrics {
    pub game_id: String,
    #[serde(default)]
    pub metrics: Map<String, serde_json::Value>,
}
