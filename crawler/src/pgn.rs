//! Thin PGN movetext parser feeding the analyzer's in-memory game (§4.5
//! step 3). Only the minimal amount of PGN handling the analyzer needs —
//! full PGN grammar (comments, NAGs, variations, recursive annotation
//! variations) is treated as an external concern; a game whose movetext
//! exercises that grammar simply fails to parse here, which the analyzer
//! treats the same as any other parse failure (log, return).
//!
//! As with [`crate::moves`], the actual SAN-to-board application is
//! delegated to `shakmaty`.

use shakmaty::fen::{EnPassantMode, Fen};
use shakmaty::san::San;
use shakmaty::{CastlingMode, Chess, Position};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgnParseError {
    #[error("ply {index} (\"{token}\") is not valid SAN notation")]
    InvalidSan { index: usize, token: String },

    #[error("ply {index} (\"{token}\") is not a legal move in the current position")]
    IllegalMove { index: usize, token: String },
}

#[derive(Debug, Clone)]
pub struct ParsedMove {
    pub ply: usize,
    pub san: String,
    pub uci: String,
    pub fen_after: String,
}

#[derive(Debug, Clone)]
pub struct ParsedGame {
    pub initial_fen: String,
    pub moves: Vec<ParsedMove>,
}

/// Strips `[Tag "value"]` header lines and move-number tokens (`12.`,
/// `12...`), then parses the remaining whitespace-separated tokens as SAN
/// against the standard starting position, stopping at a game-termination
/// marker (`1-0`, `0-1`, `1/2-1/2`, `*`).
pub fn parse_pgn(pgn: &str) -> Result<ParsedGame, PgnParseError> {
    let movetext: String = pgn
        .lines()
        .filter(|line| !line.trim_start().starts_with('['))
        .collect::<Vec<_>>()
        .join(" ");

    let mut position = Chess::default();
    let initial_fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
    let mut moves = Vec::new();

    for (index, token) in movetext.split_whitespace().enumerate() {
        let token = strip_move_number(token);
        if token.is_empty() || is_result_marker(token) {
            continue;
        }

        let san = San::from_str(token).map_err(|_| PgnParseError::InvalidSan {
            index,
            token: token.to_string(),
        })?;
        let mv = san.to_move(&position).map_err(|_| PgnParseError::IllegalMove {
            index,
            token: token.to_string(),
        })?;
        let uci = mv.to_uci(CastlingMode::Standard);
        position = position.play(&mv).map_err(|_| PgnParseError::IllegalMove {
            index,
            token: token.to_string(),
        })?;

        let fen_after = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();

        moves.push(ParsedMove {
            ply: moves.len() + 1,
            san: token.to_string(),
            uci: uci.to_string(),
            fen_after,
        });
    }

    Ok(ParsedGame { initial_fen, moves })
}

/// `shakmaty::Chess` is the standard-rules position; this parser does not
/// attempt variant detection from PGN tags (the Ingestor already records
/// variant at fetch time from the upstream provider's own `variant` field,
/// which is the source of truth this pipeline uses elsewhere).
fn strip_move_number(token: &str) -> &str {
    match token.find('.') {
        Some(dot) if token[..dot].chars().all(|c| c.is_ascii_digit()) && !token[..dot].is_empty() => {
            token[dot..].trim_start_matches('.')
        }
        _ => token,
    }
}

fn is_result_marker(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}
