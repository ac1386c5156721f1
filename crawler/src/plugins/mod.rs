//! Plugin trait hierarchy (§4.5). Plugins are opaque to the core: each
//! exposes a stable `name` (unique, used as the key in `GameMetrics`) and
//! a `version`, and is either pure or engine-backed.

pub mod largest_swing;
pub mod move_count;

use crate::engine::Engine;
use crate::pgn::ParsedGame;
use serde_json::Value;
use thiserror::Error;

pub trait Plugin {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str;
}

/// A plugin's `analyze` "may throw" (§4.5); this is the analyzer's view
/// of that failure — logged, and the analyzer continues with the next
/// plugin (§7 "Plugin exception").
#[derive(Debug, Error)]
#[error("plugin failed: {0}")]
pub struct PluginError(pub String);

/// `(game) -> result`. No external process dependency.
pub trait PurePlugin: Plugin {
    fn analyze(&self, game: &ParsedGame) -> Result<Value, PluginError>;
}

/// `(game, engine) -> result`. `engine` is launched per task by the
/// analyzer and released on every exit path (§4.5).
pub trait EnginePlugin: Plugin {
    fn analyze(&self, game: &ParsedGame, engine: &mut dyn Engine) -> Result<Value, PluginError>;
}

/// The analyzer iterates a flat list of registered plugins regardless of
/// shape; this enum is the seam between the two plugin traits and a
/// single dispatch loop.
pub enum RegisteredPlugin {
    Pure(Box<dyn PurePlugin + Send + Sync>),
    Engine(Box<dyn EnginePlugin + Send + Sync>),
}

impl RegisteredPlugin {
    pub fn name(&self) -> &'static str {
        match self {
            RegisteredPlugin::Pure(plugin) => plugin.name(),
            RegisteredPlugin::Engine(plugin) => plugin.name(),
        }
    }
}

/// The fixed set of plugins this build ships. A real deployment's
/// registry would likely be built from configuration; the spec treats
/// "plugin business logic beyond the plugin interface" as out of scope,
/// so this crate ships exactly the two worked examples.
pub fn registry() -> Vec<RegisteredPlugin> {
    vec![
        RegisteredPlugin::Pure(Box::new(move_count::MoveCountPlugin)),
        RegisteredPlugin::Engine(Box::new(largest_swing::LargestSwingPlugin)),
    ]
}
