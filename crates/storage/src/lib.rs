//! # Protokit Storage
//!
//! Named byte blobs behind two small traits. Everything above this crate
//! (workspace resolution, image building, generation) reads and writes
//! through [`ReadBucket`] / [`WriteBucket`] and never touches a concrete
//! filesystem directly.
//!
//! ```text
//! OsBucket (directory)      MemoryBucket (tests, fetched modules)
//!        │                          │
//!        └──────────┬───────────────┘
//!                   │
//!             SubReadBucket (module root view + include/exclude)
//! ```
//!
//! Paths inside a bucket are normalized, relative and forward-slashed.
//! Writes go through [`WriteObject`]: nothing becomes visible until
//! `commit` is called, and dropping an uncommitted object discards it.

mod bucket;
mod error;
mod memory;
pub mod normalpath;
mod os;
mod sub;

pub use bucket::{ObjectInfo, ReadBucket, WriteBucket, WriteObject};
pub use error::{Result, StorageError};
pub use memory::MemoryBucket;
pub use os::OsBucket;
pub use sub::SubReadBucket;
