use protokit_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModuleError>;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("invalid module identity {value:?}: {reason}")]
    InvalidIdentity { value: String, reason: &'static str },

    #[error("{path}: {message}")]
    Config { path: String, message: String },

    #[error("cannot have both {first} and {second} at {prefix:?}")]
    ConflictingConfigs {
        prefix: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("cannot set the same path for both --path and --exclude-path: {0}")]
    TargetEqualsExclude(String),

    #[error("excluded path {exclude:?} contains targeted path {target:?}, so everything in {target:?} would be excluded")]
    ExcludeContainsTarget { target: String, exclude: String },

    #[error("{0}: input not found")]
    InputNotFound(String),

    #[error("{0}: no modules to build for this input")]
    NoTargetModules(String),

    #[error("module {0} appears more than once in the workspace")]
    DuplicateModule(String),

    #[error("{0}: module not found")]
    ModuleNotFound(String),

    #[error("invalid input {value:?}: {reason}")]
    InvalidInput { value: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ModuleError {
    pub fn config(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Config {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound(_) | Self::InputNotFound(_))
            || matches!(self, Self::Storage(err) if err.is_not_found())
    }
}
