//! Normalizes and upserts one fetched game's entire subgraph: the game
//! row, its two players, their associations, and its parsed moves, per
//! §4.3. Idempotent — replaying the same item leaves the same final state.

use crate::moves::parse_move_sequence;
use lichess_client::{RawGame, RawPlayerSide};
use miette::Diagnostic;
use store_client::{ClockFields, Color, GamePlayerLink, GameUpsert, PlayerUpsert, StoreClient, StoreError};
use thiserror::Error;

/// One unit of ingest work: a raw fetched game plus the depth the
/// fetching player was crawled at (opponents sit one level deeper).
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub game: RawGame,
    pub depth: i32,
}

/// Everything that can end one ingest task short of completion (§4.3 /
/// §7): only Store calls, since a malformed move sequence is a recoverable
/// per-game condition the ingest pipeline logs and moves past.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("store call failed during ingest")]
    Store(#[from] StoreError),
}

pub struct Ingestor {
    store: StoreClient,
}

impl Ingestor {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Runs the full ingest pipeline for one game. Any step's failure is
    /// logged with the game id and the task ends without retry — the
    /// next fetch cycle will re-deliver the same game, and every step
    /// here is an upsert, so that replay is safe.
    pub async fn run(&self, item: IngestItem) {
        let game_id = item.game.id.clone();
        if let Err(err) = self.ingest(item).await {
            log::error!("ingest failed for game '{game_id}': {err}");
        }
    }

    async fn ingest(&self, item: IngestItem) -> Result<(), IngestError> {
        let IngestItem { game, depth } = item;

        let clock = game.clock.as_ref().map(|clock| ClockFields {
            initial: clock.initial,
            increment: clock.increment,
            total_time: clock.total_time,
        });

        self.store
            .upsert_game(&GameUpsert {
                game_id: game.id.clone(),
                rated: game.rated,
                variant: game.variant.clone(),
                speed: game.speed.clone(),
                perf: game.perf.clone(),
                created_at: game.created_at,
                last_move_at: game.last_move_at,
                status: game.status.clone(),
                winner: game.winner.clone(),
                pgn: game.pgn.clone(),
                clock,
            })
            .await?;

        let opponent_depth = depth + 1;
        let white = extract_player(&game.players.white, "white");
        let black = extract_player(&game.players.black, "black");

        self.store.upsert_player(&white.upsert(opponent_depth)).await?;
        self.store.upsert_player(&black.upsert(opponent_depth)).await?;

        self.store
            .link_player_to_game(&GamePlayerLink {
                game_id: game.id.clone(),
                player_id: white.id.clone(),
                color: Color::White,
                rating: white.rating,
                rating_diff: white.rating_diff,
            })
            .await?;
        self.store
            .link_player_to_game(&GamePlayerLink {
                game_id: game.id.clone(),
                player_id: black.id.clone(),
                color: Color::Black,
                rating: black.rating,
                rating_diff: black.rating_diff,
            })
            .await?;

        if let Some(moves) = game.moves.as_deref() {
            match parse_move_sequence(moves, &game.variant, None) {
                Ok(sans) => {
                    self.store.insert_moves(&game.id, &sans).await?;
                }
                Err(err) => {
                    log::warn!(
                        "unparseable move sequence for game '{}' at ply {:?}: {err}",
                        game.id,
                        err.failing_index()
                    );
                }
            }
        }

        Ok(())
    }
}

struct ExtractedPlayer {
    id: String,
    name: String,
    flair: Option<String>,
    rating: i64,
    rating_diff: i64,
}

impl ExtractedPlayer {
    fn upsert(&self, depth: i32) -> PlayerUpsert {
        PlayerUpsert {
            player_id: self.id.clone(),
            name: self.name.clone(),
            flair: self.flair.clone(),
            depth,
        }
    }
}

/// Anonymous sides get a synthetic id/name and zeroed rating fields
/// (§4.3 "Player extraction").
fn extract_player(side: &RawPlayerSide, color: &str) -> ExtractedPlayer {
    match &side.user {
        Some(user) => ExtractedPlayer {
            id: user.id.clone(),
            name: user.name.clone(),
            flair: side.flair.clone(),
            rating: side.rating.unwrap_or(0),
            rating_diff: side.rating_diff.unwrap_or(0),
        },
        None => ExtractedPlayer {
            id: format!("anonymous_{color}"),
            name: format!("Anonymous {}", capitalize(color)),
            flair: None,
            rating: 0,
            rating_diff: 0,
        },
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lichess_client::RawUser;

    #[test]
    fn anonymous_side_gets_synthetic_identity() {
        let side = RawPlayerSide {
            user: None,
            rating: None,
            rating_diff: None,
            flair: None,
        };
        let extracted = extract_player(&side, "black");
        assert_eq!(extracted.id, "anonymous_black");
        assert_eq!(extracted.name, "Anonymous Black");
        assert_eq!(extracted.rating, 0);
        assert_eq!(extracted.rating_diff, 0);
    }

    #[test]
    fn identified_side_keeps_its_fields() {
        let side = RawPlayerSide {
            user: Some(RawUser {
                id: "alice".to_string(),
                name: "Alice".to_string(),
            }),
            rating: Some(1500),
            rating_diff: Some(12),
            flair: Some(":smile:".to_string()),
        };
        let extracted = extract_player(&side, "white");
        assert_eq!(extracted.id, "alice");
        assert_eq!(extracted.rating, 1500);
        assert_eq!(extracted.rating_diff, 12);
    }

    #[test]
    fn opponent_depth_is_fetched_depth_plus_one() {
        let extracted = ExtractedPlayer {
            id: "bob".into(),
            name: "bob".into(),
            flair: None,
            rating: 1000,
            rating_diff: 0,
        };
        let upsert = extracted.upsert(3);
        assert_eq!(upsert.depth, 3);
    }
}
