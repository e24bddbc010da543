//! Scene identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of a scene as given by the caller.
///
/// Input files usually use integers (`"scene": 3`) or strings
/// (`"scene": "intro"`). Any other JSON value (`2.5`, `true`) is kept as-is
/// in [`SceneId::Other`]. Every form serializes back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SceneId {
    Number(i64),
    Text(String),
    Other(Value),
}

impl SceneId {
    /// Placeholder used when a failure cannot be attributed to a scene.
    pub fn unknown() -> Self {
        Self::Text("N/A".to_string())
    }

    /// Positional id for a scene without an explicit one (1-based).
    pub fn positional(index: usize) -> Self {
        Self::Number(index as i64 + 1)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for SceneId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}
