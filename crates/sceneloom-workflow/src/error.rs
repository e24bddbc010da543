//! Error types for sceneloom-workflow.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or reading workflow documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The template file does not exist.
    #[error("template not found: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    /// The template is valid JSON but not a node map.
    #[error("template {} is not a JSON object keyed by node id", path.display())]
    NotANodeMap { path: PathBuf },

    /// An in-memory template is not a node map.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// The document handed to a path lookup is not an array.
    #[error("expected a JSON array, found {found}")]
    NotAnArray { found: &'static str },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a template not found error.
    pub fn template_not_found(path: impl Into<PathBuf>) -> Self {
        Self::TemplateNotFound { path: path.into() }
    }
}

/// Name of a JSON value's type, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
