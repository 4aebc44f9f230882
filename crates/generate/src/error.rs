use protokit_image::ImageError;
use protokit_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerateError>;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("{path}: {message}")]
    Config { path: String, message: String },

    #[error("{plugin}: {message}")]
    Plugin { plugin: String, message: String },

    #[error("{plugin} exited with {status}: {stderr}")]
    PluginExit {
        plugin: String,
        status: String,
        stderr: String,
    },

    #[error("{path} was generated by both {first} and {second}")]
    DuplicateOutput {
        path: String,
        first: String,
        second: String,
    },

    #[error("{plugin}: insertion point {point:?} not found in {path}")]
    InsertionPointNotFound {
        plugin: String,
        path: String,
        point: String,
    },

    #[error("{plugin}: cannot insert into {path}, which was not generated earlier in this run")]
    InsertionTargetMissing { plugin: String, path: String },

    #[error("{plugin}: invalid output path {path:?}")]
    InvalidOutputPath { plugin: String, path: String },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to decode plugin response: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl GenerateError {
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
}
