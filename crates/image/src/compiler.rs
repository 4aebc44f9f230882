use crate::error::{ImageError, Result};
use crate::wire::parse_fields;
use bytes::Bytes;
use prost::Message;
use prost_types::FileDescriptorProto;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One compiled file as raw `FileDescriptorProto` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFile {
    pub path: String,
    pub bytes: Bytes,
}

/// A problem reported by the compiler. Lines and columns are 1-based, zero
/// when unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedError {
    pub path: Option<String>,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutput {
    /// Every file reachable from the requested paths, imports first.
    pub files: Vec<RawFile>,
    pub errors: Vec<PositionedError>,
}

/// Supplies source text for every path the compiler may need.
pub trait ImportResolver: Send + Sync {
    /// All paths this resolver can open, sorted.
    fn paths(&self) -> Vec<String>;

    fn open(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Compiler frontend: source text in, descriptors or positioned errors out.
///
/// Compile problems belong in [`CompileOutput::errors`]; `Err` is reserved
/// for failures to run the compiler at all.
pub trait Compiler: Send + Sync {
    fn compile(
        &self,
        paths: &[String],
        resolver: &dyn ImportResolver,
        include_source_info: bool,
    ) -> Result<CompileOutput>;
}

/// [`Compiler`] backed by a `protoc` binary.
#[derive(Debug, Clone)]
pub struct ProtocCompiler {
    protoc: PathBuf,
    include: Option<PathBuf>,
    scratch_root: Option<PathBuf>,
}

impl ProtocCompiler {
    pub fn new(protoc: impl Into<PathBuf>, include: Option<PathBuf>) -> Self {
        Self {
            protoc: protoc.into(),
            include,
            scratch_root: None,
        }
    }

    /// Put per-compilation scratch directories under `root` instead of the
    /// system temp dir.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("protokit-protoc-");
        let created = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        created.map_err(|err| ImageError::io("protoc scratch directory", err))
    }

    /// The `protoc` bundled with the build, with its well-known types.
    pub fn vendored() -> Result<Self> {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .map_err(|err| ImageError::Compiler(format!("no vendored protoc: {err}")))?;
        let include = protoc_bin_vendored::include_path().ok();
        Ok(Self::new(protoc, include))
    }
}

fn write_scratch(root: &Path, relative: &str, data: &[u8]) -> Result<()> {
    let target = root.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| ImageError::io(parent.display().to_string(), err))?;
    }
    fs::write(&target, data).map_err(|err| ImageError::io(relative, err))
}

const DESCRIPTOR_SET_OUT: &str = ".protokit-descriptor-set.binpb";

impl Compiler for ProtocCompiler {
    fn compile(
        &self,
        paths: &[String],
        resolver: &dyn ImportResolver,
        include_source_info: bool,
    ) -> Result<CompileOutput> {
        if paths.is_empty() {
            return Ok(CompileOutput::default());
        }
        let scratch = self.scratch_dir()?;
        for path in resolver.paths() {
            if let Some(data) = resolver.open(&path)? {
                write_scratch(scratch.path(), &path, &data)?;
            }
        }

        let mut command = Command::new(&self.protoc);
        command.current_dir(scratch.path()).arg("--proto_path=.");
        if let Some(include) = &self.include {
            command.arg(format!("--proto_path={}", include.display()));
        }
        command
            .arg("--include_imports")
            .arg(format!("--descriptor_set_out={DESCRIPTOR_SET_OUT}"));
        if include_source_info {
            command.arg("--include_source_info");
        }
        command.args(paths);
        log::debug!("running {} on {} files", self.protoc.display(), paths.len());

        let output = command
            .output()
            .map_err(|err| ImageError::io(self.protoc.display().to_string(), err))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let (errors, warnings) = parse_protoc_stderr(&stderr);
        for warning in &warnings {
            log::warn!("{warning}");
        }
        if !output.status.success() {
            if errors.is_empty() {
                return Err(ImageError::Compiler(format!(
                    "protoc exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            return Ok(CompileOutput {
                files: Vec::new(),
                errors,
            });
        }

        let set_path = scratch.path().join(DESCRIPTOR_SET_OUT);
        let data = fs::read(&set_path)
            .map_err(|err| ImageError::io(set_path.display().to_string(), err))?;
        Ok(CompileOutput {
            files: split_descriptor_set(&data)?,
            errors: Vec::new(),
        })
    }
}

/// Split an encoded `FileDescriptorSet` into its files without decoding
/// (and losing) their unknown fields.
pub(crate) fn split_descriptor_set(data: &[u8]) -> Result<Vec<RawFile>> {
    let mut files = Vec::new();
    for field in parse_fields(data)? {
        if field.number != 1 {
            continue;
        }
        let name = FileDescriptorProto::decode(field.payload)?
            .name
            .unwrap_or_default();
        files.push(RawFile {
            path: name,
            bytes: Bytes::copy_from_slice(field.payload),
        });
    }
    Ok(files)
}

/// Parse protoc diagnostics: `path:line:col: message`, `path: message`, or a
/// bare message. Lines whose message starts with `warning:` are returned
/// separately.
fn parse_protoc_stderr(stderr: &str) -> (Vec<PositionedError>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for line in stderr.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        let error = parse_protoc_line(line);
        if error.message.starts_with("warning:") {
            warnings.push(line.to_string());
        } else {
            errors.push(error);
        }
    }
    (errors, warnings)
}

fn parse_protoc_line(line: &str) -> PositionedError {
    let parts: Vec<&str> = line.splitn(4, ':').collect();
    if let [path, line_no, column, message] = parts.as_slice() {
        if let (Ok(line_no), Ok(column)) = (line_no.parse::<u32>(), column.parse::<u32>()) {
            return PositionedError {
                path: Some(clean_path(path)),
                line: line_no,
                column,
                message: message.trim().to_string(),
            };
        }
    }
    if let Some((path, message)) = line.split_once(": ") {
        if path.ends_with(".proto") && !path.contains(' ') {
            return PositionedError {
                path: Some(clean_path(path)),
                line: 0,
                column: 0,
                message: message.trim().to_string(),
            };
        }
    }
    PositionedError {
        path: None,
        line: 0,
        column: 0,
        message: line.trim().to_string(),
    }
}

fn clean_path(path: &str) -> String {
    let path = path.trim();
    path.strip_prefix("./").unwrap_or(path).to_string()
}
