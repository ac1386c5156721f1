//! SAN move-list parsing and legality validation for the ingestor.
//!
//! Grounded on the `shakmaty` usage in `lila-openingexplorer`'s importer
//! (`VariantPosition::from_setup` / `VariantPosition::new` to seed a
//! position from a variant and optional FEN, `San::to_move` + `Position::play`
//! to walk the move list one ply at a time, per
//! `other_examples/963e6420_lichess-org-lila-deepq__src-irwin.rs.rs`).
//!
//! The ingestor calls [`parse_move_sequence`] with the raw `moves` string
//! from a fetched game. On success it hands the returned SAN list to
//! `StoreClient::insert_moves`; on failure it logs the offending ply index
//! and inserts zero move rows, never calling the Store for moves at all.

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::variant::{Variant, VariantPosition};
use shakmaty::{CastlingMode, Position};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoveParseError {
    #[error("unrecognized variant {0:?}")]
    UnknownVariant(String),

    #[error("invalid initial FEN")]
    InvalidFen,

    #[error("could not set up the initial position for this variant/FEN combination")]
    SetupPosition,

    #[error("ply {index} (\"{token}\") is not valid SAN notation")]
    InvalidSan { index: usize, token: String },

    #[error("ply {index} (\"{token}\") is not a legal move in the current position")]
    IllegalMove { index: usize, token: String },
}

impl MoveParseError {
    /// The zero-based index of the first move that failed, for the
    /// ingestor's "inserted zero rows at ply N" log line.
    pub fn failing_index(&self) -> Option<usize> {
        match self {
            MoveParseError::InvalidSan { index, .. } | MoveParseError::IllegalMove { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

fn variant_from_name(name: &str) -> Option<Variant> {
    match name {
        "standard" | "fromPosition" | "chess960" => Some(Variant::Chess),
        "antichess" => Some(Variant::Antichess),
        "atomic" => Some(Variant::Atomic),
        "crazyhouse" => Some(Variant::Crazyhouse),
        "horde" => Some(Variant::Horde),
        "kingOfTheHill" => Some(Variant::KingOfTheHill),
        "racingKings" => Some(Variant::RacingKings),
        "threeCheck" => Some(Variant::ThreeCheck),
        _ => None,
    }
}

/// Parses and validates a whitespace-separated SAN move string against the
/// named variant's starting position (or `initial_fen`, for `fromPosition`
/// games). Returns the ordered SAN tokens on success.
pub fn parse_move_sequence(
    moves: &str,
    variant_name: &str,
    initial_fen: Option<&str>,
) -> Result<Vec<String>, MoveParseError> {
    let tokens: Vec<&str> = moves.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let variant =
        variant_from_name(variant_name).ok_or_else(|| MoveParseError::UnknownVariant(variant_name.to_string()))?;
    let castling_mode = if variant_name == "chess960" {
        CastlingMode::Chess960
    } else {
        CastlingMode::Standard
    };

    let mut position = match initial_fen {
        Some(fen_str) => {
            let fen = Fen::from_str(fen_str).map_err(|_| MoveParseError::InvalidFen)?;
            VariantPosition::from_setup(variant, fen.into_setup(), castling_mode)
                .map_err(|_| MoveParseError::SetupPosition)?
        }
        None => VariantPosition::new(variant),
    };

    let mut sans = Vec::with_capacity(tokens.len());
    for (index, token) in tokens.iter().enumerate() {
        let san = San::from_str(token).map_err(|_| MoveParseError::InvalidSan {
            index,
            token: token.to_string(),
        })?;
        let mv = san.to_move(&position).map_err(|_| MoveParseError::IllegalMove {
            index,
            token: token.to_string(),
        })?;
        position = position.play(&mv).map_err(|_| MoveParseError::IllegalMove {
            index,
            token: token.to_string(),
        })?;
        sans.push(token.to_string());
    }

    Ok(sans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_legal_opening() {
        let result = parse_move_sequence("e4 e5 Nf3 Nc6 Bb5", "standard", None).unwrap();
        assert_eq!(result, vec!["e4", "e5", "Nf3", "Nc6", "Bb5"]);
    }

    #[test]
    fn empty_move_string_parses_to_empty_list() {
        let result = parse_move_sequence("", "standard", None).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn reports_the_first_illegal_ply() {
        let err = parse_move_sequence("e4 e5 Nf9", "standard", None).unwrap_err();
        assert_eq!(err.failing_index(), Some(2));
    }

    #[test]
    fn rejects_an_unknown_variant() {
        let err = parse_move_sequence("e4", "bughouse", None).unwrap_err();
        assert!(matches!(err, MoveParseError::UnknownVariant(_)));
    }
}
