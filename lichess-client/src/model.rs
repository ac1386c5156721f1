use serde::{Deserialize, Serialize};

/// One line of the upstream NDJSON export, per §6 of the upstream contract.
/// Kept as a tagged struct rather than a dynamic dict, per the teacher's
/// preference for typed wire shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGame {
    pub id: String,
    #[serde(default)]
    pub rated: bool,
    pub variant: String,
    pub speed: String,
    pub perf: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "lastMoveAt")]
    pub last_move_at: i64,
    pub status: String,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub pgn: Option<String>,
    #[serde(default)]
    pub moves: Option<String>,
    #[serde(default)]
    pub clock: Option<RawClock>,
    pub players: RawPlayers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawClock {
    pub initial: i64,
    pub increment: i64,
    #[serde(rename = "totalTime")]
    pub total_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPlayers {
    pub white: RawPlayerSide,
    pub black: RawPlayerSide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPlayerSide {
    #[serde(default)]
    pub user: Option<RawUser>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(rename = "ratingDiff", default)]
    pub rating_diff: Option<i64>,
    #[serde(default)]
    pub flair: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUser {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_minimal_game_line() {
        let line = r#"{
            "id": "abcd1234",
            "rated": true,
            "variant": "standard",
            "speed": "blitz",
            "perf": "blitz",
            "createdAt": 1000,
            "lastMoveAt": 2000,
            "status": "mate",
            "winner": "white",
            "moves": "e4 e5 Nf3 Nc6",
            "clock": {"initial": 300, "increment": 3, "totalTime": 420},
            "players": {
                "white": {"user": {"id": "alice", "name": "alice"}, "rating": 1500},
                "black": {"user": {"id": "bob", "name": "bob"}, "rating": 1480, "ratingDiff": -10}
            }
        }"#;

        let game: RawGame = serde_json::from_str(line).unwrap();
        assert_eq!(game.id, "abcd1234");
        assert_eq!(game.last_move_at, 2000);
        assert_eq!(game.moves.as_deref(), Some("e4 e5 Nf3 Nc6"));
        assert_eq!(game.players.white.user.as_ref().unwrap().id, "alice");
        assert_eq!(game.players.black.rating_diff, Some(-10));
    }

    #[test]
    fn anonymous_side_has_no_user() {
        let line = r#"{
            "id": "anon1",
            "variant": "standard",
            "speed": "bullet",
            "perf": "bullet",
            "createdAt": 1,
            "lastMoveAt": 2,
            "status": "draw",
            "players": {
                "white": {"rating": 1500},
                "black": {"user": {"id": "bob", "name": "bob"}, "rating": 1480}
            }
        }"#;

        let game: RawGame = serde_json::from_str(line).unwrap();
        assert!(game.players.white.user.is_none());
    }
}
