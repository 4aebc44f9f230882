//! # Protokit Image
//!
//! Turns modules into images: ordered sets of compiled file descriptors that
//! remember which module every file came from.
//!
//! ## Build flow
//!
//! ```text
//! Module + context modules
//!     │
//!     ├──> ModuleFileIndex (one path -> one module, duplicates rejected)
//!     │
//!     ├──> Compiler::compile (protoc, or any frontend)
//!     │       ├─ positioned errors ──> FileAnnotationSet  (BuildOutcome::Failed)
//!     │       └─ raw descriptors   ──> ImageFile[]        (BuildOutcome::Built)
//!     │
//!     └──> Image (imports before importers)
//!             ├─ merge_images
//!             ├─ strip_source_retention_options
//!             ├─ image_module_dependencies ──> dependency graph builder
//!             └─ to_bytes / from_bytes
//! ```
//!
//! Descriptors are kept as the raw bytes the compiler emitted. Decoding into
//! `prost_types` loses custom options, so every transform that writes bytes
//! back works on the wire encoding.

mod build;
mod compiler;
mod deps;
mod error;
mod image;
mod merge;
mod retention;
mod wire;

pub use build::{BuildOptions, BuildOutcome, Builder};
pub use compiler::{
    CompileOutput, Compiler, ImportResolver, PositionedError, ProtocCompiler, RawFile,
};
pub use deps::{image_module_dependencies, ImageModuleDependency};
pub use error::{ImageError, Result};
pub use image::{Image, ImageFile};
pub use merge::merge_images;
pub use retention::strip_source_retention_options;

#[cfg(test)]
pub(crate) mod test_util {
    use crate::compiler::{CompileOutput, Compiler, ImportResolver, PositionedError, RawFile};
    use crate::error::Result;
    use crate::image::ImageFile;
    use prost::Message;
    use prost_types::FileDescriptorProto;
    use protokit_analysis::FileInfo;
    use std::collections::HashSet;

    pub fn file(path: &str, imports: &[&str]) -> ImageFile {
        let raw = FileDescriptorProto {
            name: Some(path.to_string()),
            dependency: imports.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
        .encode_to_vec();
        ImageFile::new(FileInfo::new(path, path), raw).unwrap()
    }

    /// Understands `package x;` and `import "x";` lines and nothing else.
    pub struct FakeCompiler;

    struct Walk<'a> {
        resolver: &'a dyn ImportResolver,
        seen: HashSet<String>,
        output: CompileOutput,
    }

    impl Walk<'_> {
        fn visit(&mut self, path: &str, source: &str) -> Result<()> {
            if !self.seen.insert(path.to_string()) {
                return Ok(());
            }
            let mut package = None;
            let mut dependency = Vec::new();
            for (lineno, line) in source.lines().enumerate() {
                let line = line.trim();
                if let Some(rest) = line.strip_prefix("package ") {
                    package = Some(rest.trim_end_matches(';').trim().to_string());
                }
                let Some(rest) = line.strip_prefix("import ") else {
                    continue;
                };
                let import = rest.trim_end_matches(';').trim().trim_matches('"').to_string();
                match self.resolver.open(&import)? {
                    Some(data) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        self.visit(&import, &text)?;
                    }
                    None => self.output.errors.push(PositionedError {
                        path: Some(path.to_string()),
                        line: lineno as u32 + 1,
                        column: 1,
                        message: format!("Import \"{import}\" was not found or had errors."),
                    }),
                }
                dependency.push(import);
            }
            let bytes = FileDescriptorProto {
                name: Some(path.to_string()),
                package,
                dependency,
                ..Default::default()
            }
            .encode_to_vec();
            self.output.files.push(RawFile {
                path: path.to_string(),
                bytes: bytes.into(),
            });
            Ok(())
        }
    }

    impl Compiler for FakeCompiler {
        fn compile(
            &self,
            paths: &[String],
            resolver: &dyn ImportResolver,
            _include_source_info: bool,
        ) -> Result<CompileOutput> {
            let mut walk = Walk {
                resolver,
                seen: HashSet::new(),
                output: CompileOutput::default(),
            };
            for path in paths {
                let data = resolver.open(path)?.unwrap_or_default();
                walk.visit(path, &String::from_utf8_lossy(&data))?;
            }
            if !walk.output.errors.is_empty() {
                walk.output.files.clear();
            }
            Ok(walk.output)
        }
    }
}
