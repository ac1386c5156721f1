//! Abstract interface to an externally managed analysis engine process.
//!
//! The concrete implementation — spawning and speaking UCI to a subprocess
//! — is out of scope (§1: "the chess-engine subprocess protocol"). What's
//! here is the trait shape an [`EnginePlugin`](crate::plugins::EnginePlugin)
//! is handed: "launched per task, released on all exit paths" (§4.5), plus
//! a [`NullEngine`] test double for exercising the plugin machinery without
//! a real engine on hand.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Centipawns from White's perspective.
    Centipawns(i32),
    /// Mate in N plies, signed: positive favors White.
    Mate(i32),
}

impl Evaluation {
    /// Clamps to ±10.0 pawns, per the original `largest_swing` plugin's
    /// mate-score normalization (`celery/analysis/plugins/largest_swing.py`).
    pub fn normalized_pawns(self) -> f64 {
        match self {
            Evaluation::Centipawns(cp) => (cp as f64 / 100.0).clamp(-10.0, 10.0),
            Evaluation::Mate(n) if n > 0 => 10.0,
            Evaluation::Mate(_) => -10.0,
        }
    }

    pub fn mate_in(self) -> Option<i32> {
        match self {
            Evaluation::Mate(n) => Some(n),
            Evaluation::Centipawns(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine process unavailable")]
    Unavailable,
    #[error("engine did not return an evaluation within the time limit")]
    TimedOut,
}

/// A released-on-exit handle to an analysis engine. Each
/// [`EnginePlugin::analyze`](crate::plugins::EnginePlugin::analyze) call is
/// handed one instance for the duration of a single task.
pub trait Engine: Send {
    /// Evaluates the position reached by FEN `fen`, thinking for up to
    /// `limit_secs` seconds.
    fn evaluate(&mut self, fen: &str, limit_secs: f64) -> Result<Evaluation, EngineError>;
}

/// A test double that always returns a fixed, non-mate evaluation. Useful
/// for exercising an `EnginePlugin`'s control flow without a real engine.
pub struct NullEngine {
    pub fixed: Evaluation,
}

impl Default for NullEngine {
    fn default() -> Self {
        Self {
            fixed: Evaluation::Centipawns(0),
        }
    }
}

impl Engine for NullEngine {
    fn evaluate(&mut self, _fen: &str, _limit_secs: f64) -> Result<Evaluation, EngineError> {
        Ok(self.fixed)
    }
}
