//! # Protokit Graph
//!
//! Module dependency graphs: which module imports from which, in what order
//! they must be built, and whether the requested set is consistent.
//!
//! ## Architecture
//!
//! ```text
//! Module[] (workspace)
//!     │
//!     ├──> resolve_dependency_closure
//!     │      ├─ declared deps, level by level
//!     │      ├─ workspace modules satisfy deps by full name
//!     │      └─ ModuleProvider fetches the rest (concurrently)
//!     │
//!     └──> GraphBuilder
//!            ├─ compile each module (ModuleImageBuilder)
//!            ├─ image_module_dependencies
//!            │    ├─ direct   -> edge to sibling node
//!            │    └─ indirect -> edge + recurse into fetched module
//!            └─ Graph<Node> (petgraph, cycle-rejecting)
//! ```
//!
//! A build either returns a complete graph or the compile diagnostics that
//! stopped it; never both.

mod builder;
mod closure;
mod error;
mod graph;
mod types;

pub use builder::{GraphBuilder, ModuleImageBuilder};
pub use closure::resolve_dependency_closure;
pub use error::{GraphError, Result};
pub use graph::Graph;
pub use types::{GraphOutcome, Node};
