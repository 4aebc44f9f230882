//! # Protokit Generate
//!
//! Drives protoc-compatible plugins over an image and assembles what they
//! produce.
//!
//! ## Flow
//!
//! ```text
//! buf.gen.yaml ──> GenerateTemplate (plugins, in order)
//!
//! Image ──> strip source-retention options
//!   │
//!   └──> per plugin
//!          ├─ build_requests (directory | all)
//!          ├─ PluginRunner::run, one task per request
//!          └─ responses in request order ──> GeneratedOutput
//!                                             ├─ insertion points
//!                                             └─ duplicate detection
//!
//! GeneratedOutput ──> WriteBucket (only after every plugin succeeded)
//! ```

mod error;
mod generator;
mod output;
mod request;
mod runner;
mod template;

pub use error::{GenerateError, Result};
pub use generator::Generator;
pub use output::{GeneratedFile, GeneratedOutput};
pub use request::{build_requests, PluginRequest};
pub use runner::{PluginRunner, ProcessPluginRunner};
pub use template::{parse_buf_gen_yaml, GenerateTemplate, PluginConfig, Strategy, BUF_GEN_YAML};
