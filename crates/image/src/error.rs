use protokit_module::ModuleError;
use protokit_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("{0}: file appears more than once in the image")]
    DuplicatePath(String),

    #[error("{path} imports {import}, which appears later in the image")]
    ImportOrder { path: String, import: String },

    #[error("import cycle: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    #[error("{path} is defined differently by {first} and {second}")]
    MergeConflict {
        path: String,
        first: String,
        second: String,
    },

    #[error("{path} is provided by both {first} and {second}")]
    DuplicateFileAcrossModules {
        path: String,
        first: String,
        second: String,
    },

    #[error("{0}: no matching file in the image")]
    PathNotFound(String),

    #[error("descriptor for {path} is named {name:?}")]
    NameMismatch { path: String, name: String },

    #[error("compiler failed: {0}")]
    Compiler(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ImageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
