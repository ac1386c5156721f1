//! Grounded on `celery/analysis/plugins/largest_swing.py`: evaluates the
//! position after every ply and reports the largest absolute swing in
//! White's evaluation (normalized to pawns, clamped to ±10) between two
//! consecutive plies.

use super::{EnginePlugin, Plugin, PluginError};
use crate::engine::Engine;
use crate::pgn::ParsedGame;
use serde_json::{json, Value};

const INITIAL_EVAL_TIME_SECS: f64 = 0.1;
const PER_MOVE_EVAL_TIME_SECS: f64 = 0.5;

pub struct LargestSwingPlugin;

impl Plugin for LargestSwingPlugin {
    fn name(&self) -> &'static str {
        "largest_swing"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }
}

impl EnginePlugin for LargestSwingPlugin {
    fn analyze(&self, game: &ParsedGame, engine: &mut dyn Engine) -> Result<Value, PluginError> {
        let mut prev_score = match engine.evaluate(&game.initial_fen, INITIAL_EVAL_TIME_SECS) {
            Ok(eval) => eval.normalized_pawns(),
            Err(err) => {
                return Err(PluginError(format!("initial position evaluation failed: {err}")));
            }
        };

        let mut largest_swing = 0.0f64;
        let mut swing_ply = 0usize;
        let mut best_move_san: Option<String> = None;
        let mut best_move_uci: Option<String> = None;
        let mut best_mate_in: Option<i32> = None;

        for mv in &game.moves {
            let eval = match engine.evaluate(&mv.fen_after, PER_MOVE_EVAL_TIME_SECS) {
                Ok(eval) => eval,
                Err(err) => {
                    log::warn!("largest_swing: evaluation failed at ply {}: {err}", mv.ply);
                    continue;
                }
            };
            let score = eval.normalized_pawns();
            let swing = (score - prev_score).abs();

            if swing > largest_swing {
                largest_swing = swing;
                swing_ply = mv.ply;
                best_move_san = Some(mv.san.clone());
                best_move_uci = Some(mv.uci.clone());
                best_mate_in = eval.mate_in();
            }

            prev_score = score;
        }

        Ok(json!({
            "swing_eval": round2(largest_swing),
            "ply": swing_ply,
            "move_san": best_move_san,
            "move_uci": best_move_uci,
            "forced_mate_in": best_mate_in,
        }))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineError, Evaluation};
    use crate::pgn::parse_pgn;

    struct ScriptedEngine {
        evals: std::collections::VecDeque<Evaluation>,
    }

    impl Engine for ScriptedEngine {
        fn evaluate(&mut self, _fen: &str, _limit_secs: f64) -> Result<Evaluation, EngineError> {
            Ok(self.evals.pop_front().unwrap_or(Evaluation::Centipawns(0)))
        }
    }

    #[test]
    fn picks_the_largest_swing_ply() {
        let game = parse_pgn("1. e4 e5 2. Nf3 1-0").unwrap();
        let mut engine = ScriptedEngine {
            evals: vec![
                Evaluation::Centipawns(20),   // initial
                Evaluation::Centipawns(30),   // after e4
                Evaluation::Centipawns(-400), // after e5: big swing
                Evaluation::Centipawns(-380), // after Nf3
            ]
            .into(),
        };

        let result = LargestSwingPlugin.analyze(&game, &mut engine).unwrap();
        assert_eq!(result["ply"], 2);
        assert_eq!(result["move_san"], "e5");
    }
}
