use protokit_image::ImageError;
use protokit_module::ModuleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    /// The full chain, starting and ending with the same node.
    #[error("cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("{name} is required at both commit {first} and commit {second}")]
    DivergentCommits {
        name: String,
        first: String,
        second: String,
    },

    #[error("{0}: imported module is not part of the build")]
    UnknownModule(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("dependency fetch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
