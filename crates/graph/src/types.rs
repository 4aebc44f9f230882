use crate::graph::Graph;
use protokit_analysis::FileAnnotationSet;
use protokit_module::ModuleKey;
use std::fmt;

/// A module in the dependency graph.
///
/// `identity` is the full name of named modules and a synthetic label
/// (`root`, `root-2`, ...) for unnamed local ones. `commit` is set for
/// modules fetched by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub identity: String,
    pub commit: Option<String>,
}

impl Node {
    pub fn local(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            commit: None,
        }
    }

    pub fn remote(key: &ModuleKey) -> Self {
        Self {
            identity: key.full_name().to_string(),
            commit: Some(key.commit().to_string()),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.commit {
            Some(commit) => write!(f, "{}:{commit}", self.identity),
            None => f.write_str(&self.identity),
        }
    }
}

/// Either a complete graph or the diagnostics that stopped it.
#[derive(Debug, Clone)]
pub enum GraphOutcome {
    Built(Graph<Node>),
    Failed(FileAnnotationSet),
}

impl GraphOutcome {
    pub fn into_result(self) -> std::result::Result<Graph<Node>, FileAnnotationSet> {
        match self {
            Self::Built(graph) => Ok(graph),
            Self::Failed(annotations) => Err(annotations),
        }
    }
}
