//! # Protokit Module
//!
//! Everything needed to turn "what the user pointed at" into a set of
//! [`Module`]s: identities, configuration files, workspace discovery, path
//! targeting and remote module providers.
//!
//! ## Resolution
//!
//! ```text
//! InputRef ──┬─ Dir / ProtoFile ──> resolve_controlling_workspace
//!            │                          │
//!            │                          v
//!            │                     resolve_modules ──> ModuleSet
//!            │
//!            └─ Module ──> ModuleProvider
//!                            ├─ workspace-local module (by full name)
//!                            └─ ModuleKeyResolver ──> ModuleReader
//!                                                      └─ CachedModuleReader
//!                                                           └─ ModuleCache (disk)
//! ```
//!
//! Configuration errors and targeting conflicts surface here, before any
//! compilation starts.

mod cache;
pub mod config;
mod error;
mod identity;
mod input;
mod module;
mod provider;
mod registry;
mod targeting;
mod workspace;

pub use cache::{CachedModuleReader, ModuleCache};
pub use error::{ModuleError, Result};
pub use identity::{ModuleFullName, ModuleKey, ModuleRef};
pub use input::InputRef;
pub use module::{Module, ModuleSet};
pub use provider::{ModuleData, ModuleKeyResolver, ModuleProvider, ModuleReader, NoRegistry};
pub use registry::DirRegistry;
pub use targeting::{validate_targeting, Targeting};
pub use workspace::{
    resolve_controlling_workspace, resolve_modules, ControllingWorkspace, WorkspaceKind,
};
