//! Error taxonomy shared by the whole run.
//!
//! Global errors (malformed input, validation, setup, config) abort a run before
//! any scene is dispatched. Per-scene errors (submission, remote execution, poll
//! timeout) become failed outcomes for that scene only.

use crate::ids::SceneId;

/// Common error type for sceneloom.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scene input is not a JSON array of objects.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The scene input is an empty array.
    #[error("No scenes provided")]
    EmptyInput,

    /// A scene is missing a required field or has an impossible time range.
    #[error("Scene {scene}: {message}")]
    Validation { scene: SceneId, message: String },

    /// The remote service rejected or never acknowledged a job.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The remote service reported that the job itself failed.
    #[error("Remote execution failed: {0}")]
    RemoteExecution(String),

    /// The poll budget ran out before the job finished.
    #[error("Polling timed out after {attempts} attempts{}", last_error_suffix(.last_error))]
    PollTimeout {
        attempts: u32,
        last_error: Option<String>,
    },

    /// The run environment could not be prepared (output directory, templates).
    #[error("Setup failed: {0}")]
    Setup(String),

    /// The configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(err) => format!(" (last error: {err})"),
        None => String::new(),
    }
}

impl Error {
    /// Create a new MalformedInput error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Create a new Validation error for the given scene.
    pub fn validation<S: Into<String>>(scene: SceneId, msg: S) -> Self {
        Self::Validation {
            scene,
            message: msg.into(),
        }
    }

    /// Create a new Submission error.
    pub fn submission<S: Into<String>>(msg: S) -> Self {
        Self::Submission(msg.into())
    }

    /// Create a new RemoteExecution error.
    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::RemoteExecution(msg.into())
    }

    /// Create a new Setup error.
    pub fn setup<S: Into<String>>(msg: S) -> Self {
        Self::Setup(msg.into())
    }

    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Stable name of the error class, used in outcomes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MalformedInputError",
            Self::EmptyInput => "EmptyInputError",
            Self::Validation { .. } => "ValidationError",
            Self::Submission(_) => "SubmissionError",
            Self::RemoteExecution(_) => "RemoteExecutionError",
            Self::PollTimeout { .. } => "PollTimeoutError",
            Self::Setup(_) => "SetupError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
        }
    }

    /// Whether this error aborts the whole run rather than a single scene.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput(_)
                | Self::EmptyInput
                | Self::Validation { .. }
                | Self::Setup(_)
                | Self::Config(_)
                | Self::Io(_)
        )
    }

    /// The scene an error is attributed to in a single-element failure report.
    pub fn scene(&self) -> SceneId {
        match self {
            Self::Validation { scene, .. } => scene.clone(),
            _ => SceneId::unknown(),
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
