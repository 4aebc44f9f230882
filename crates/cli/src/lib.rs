//! # Protokit CLI
//!
//! Thin command wiring over the protokit crates.
//!
//! ```text
//! argv ──> Cli (clap)
//!            │
//!            ├─ build     ─┐
//!            ├─ generate   ├─> Controller ──> InputRef ──> ModuleSet | Image
//!            ├─ ls-files   │        │
//!            └─ dep graph ─┘        └─ ModuleProvider (registry dir + cache)
//! ```
//!
//! Exit codes: `0` on success, `100` when the inputs produced file
//! annotations (printed to stdout in `--error-format`), `1` on any other
//! failure.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use protokit_analysis::{print_file_annotation_set, FileAnnotationSet, Format};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

mod command;
mod controller;

use controller::{Controller, ControllerConfig};

/// Exit code used when the inputs themselves are at fault.
pub const EXIT_CODE_FILE_ANNOTATION: u8 = 100;

fn print_stdout(text: &str) -> Result<()> {
    write_stdout(format!("{text}\n").as_bytes())
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout.write_all(data).and_then(|_| stdout.flush()) {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "protokit")]
#[command(about = "Build, inspect and generate code from Protocol Buffers modules", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log progress (info level; RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Module cache root [default: <user cache dir>/protokit]
    #[arg(long, global = true, env = "PROTOKIT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Root of a directory-backed module registry
    #[arg(long, global = true, env = "PROTOKIT_REGISTRY_DIR")]
    registry_dir: Option<PathBuf>,

    /// protoc binary to compile with [default: the bundled one]
    #[arg(long, global = true, env = "PROTOKIT_PROTOC")]
    protoc: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the input into an image
    Build(BuildArgs),

    /// Run the plugins of a buf.gen.yaml over the input
    Generate(GenerateArgs),

    /// List the target files of the input
    LsFiles(LsFilesArgs),

    /// Inspect module dependencies
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },
}

#[derive(Subcommand)]
enum DepCommands {
    /// Print the module dependency graph in DOT format
    Graph(DepGraphArgs),
}

#[derive(Args, Clone)]
struct InputArgs {
    /// Directory, .proto file, module reference or image (value[#format=F])
    #[arg(default_value = ".")]
    input: String,

    /// Limit targets to these paths, relative to the input
    #[arg(long = "path")]
    paths: Vec<String>,

    /// Exclude these paths, relative to the input
    #[arg(long = "exclude-path")]
    exclude_paths: Vec<String>,
}

#[derive(Args, Clone, Copy)]
struct ErrorFormatArgs {
    /// Annotation format: text, json, msvs, junit, github-actions, gitlab-code-quality
    #[arg(long, default_value = "text", value_parser = parse_format)]
    error_format: Format,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    errors: ErrorFormatArgs,

    /// Write the image here; `-` for stdout. Without it the build only checks.
    #[arg(long, short)]
    output: Option<String>,

    #[arg(long)]
    exclude_source_info: bool,

    #[arg(long)]
    exclude_imports: bool,

    /// Write a plain FileDescriptorSet without image metadata
    #[arg(long)]
    as_file_descriptor_set: bool,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    errors: ErrorFormatArgs,

    /// Generation template
    #[arg(long, default_value = protokit_generate::BUF_GEN_YAML)]
    template: PathBuf,

    /// Base directory for plugin output
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

#[derive(Args)]
struct LsFilesArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(Args)]
struct DepGraphArgs {
    /// Directory or module reference
    #[arg(default_value = ".")]
    input: String,

    #[command(flatten)]
    errors: ErrorFormatArgs,
}

fn parse_format(value: &str) -> std::result::Result<Format, String> {
    value.parse().map_err(|err: protokit_analysis::AnalysisError| err.to_string())
}

/// How a command ended when it did not fail outright.
pub(crate) enum Outcome {
    Done,
    Annotations(FileAnnotationSet, Format),
}

pub async fn main_entry() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.target(env_logger::Target::Stderr).init();

    let controller = Controller::new(ControllerConfig {
        cache_dir: cli.cache_dir.or_else(default_cache_dir),
        registry_dir: cli.registry_dir,
        protoc: cli.protoc,
    })?;

    let subcommand = cli.command;
    let controller = &controller;
    let run = async move {
        match subcommand {
            Commands::Build(args) => command::build::run(controller, args).await,
            Commands::Generate(args) => command::generate::run(controller, args).await,
            Commands::LsFiles(args) => command::ls_files::run(controller, args).await,
            Commands::Dep {
                command: DepCommands::Graph(args),
            } => command::dep_graph::run(controller, args).await,
        }
    };

    let outcome = tokio::select! {
        outcome = run => outcome?,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("interrupted");
            return Ok(ExitCode::from(130));
        }
    };

    match outcome {
        Outcome::Done => Ok(ExitCode::SUCCESS),
        Outcome::Annotations(annotations, format) => {
            let mut rendered = Vec::new();
            print_file_annotation_set(&mut rendered, &annotations, format)?;
            write_stdout(&rendered)?;
            Ok(ExitCode::from(EXIT_CODE_FILE_ANNOTATION))
        }
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("protokit"))
}
