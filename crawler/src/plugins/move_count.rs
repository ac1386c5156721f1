//! Grounded on `common/analytics/plugins/move_count.py`: counts the
//! number of plies played.

use super::{Plugin, PluginError, PurePlugin};
use crate::pgn::ParsedGame;
use serde_json::{json, Value};

pub struct MoveCountPlugin;

impl Plugin for MoveCountPlugin {
    fn name(&self) -> &'static str {
        "move_count"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }
}

impl PurePlugin for MoveCountPlugin {
    fn analyze(&self, game: &ParsedGame) -> Result<Value, PluginError> {
        Ok(json!({ "move_count": game.moves.len() }))
    }
}
