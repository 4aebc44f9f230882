//! # Protokit Analysis
//!
//! Structured diagnostics for every stage of the toolchain: compiler errors,
//! lint findings and breaking-change reports all end up as [`FileAnnotation`]s.
//!
//! ## Pipeline
//!
//! ```text
//! FileAnnotation[] (any order, possibly duplicated)
//!     │
//!     ├──> FileAnnotationSet::new
//!     │      ├─ deduplicate (path, range, type, message, provenance)
//!     │      └─ stable sort (path, start, type, message, end)
//!     │
//!     └──> print_file_annotations(format)
//!            ├─ text            path:line:col:message
//!            ├─ msvs            path(line,col) : error TYPE : message
//!            ├─ json            one object per line
//!            ├─ junit           one <testsuite> per file
//!            ├─ github-actions  ::error file=...::message
//!            └─ gitlab-code-quality
//! ```
//!
//! An empty set is represented by `None`: callers branch on
//! `FileAnnotationSet::new(..).is_some()` to decide success or failure.

mod annotation;
mod error;
mod file_info;
mod format;
mod gitlab;
mod junit;
mod render;

pub use annotation::{FileAnnotation, FileAnnotationSet, ANNOTATION_TYPE_COMPILE};
pub use error::{AnalysisError, Result};
pub use file_info::FileInfo;
pub use format::{print_file_annotation_set, print_file_annotations, Format};

/// Path printed for annotations that are not tied to a file.
pub const INPUT_PLACEHOLDER: &str = "<input>";
