use anyhow::{bail, Context, Result};
use protokit_analysis::FileAnnotationSet;
use protokit_graph::resolve_dependency_closure;
use protokit_image::{merge_images, BuildOptions, BuildOutcome, Builder, Compiler, Image, ProtocCompiler};
use protokit_module::{
    resolve_controlling_workspace, resolve_modules, validate_targeting, CachedModuleReader,
    DirRegistry, InputRef, Module, ModuleCache, ModuleError, ModuleKeyResolver, ModuleProvider,
    ModuleReader, ModuleSet, NoRegistry, Targeting,
};
use protokit_storage::{normalpath, OsBucket, ReadBucket};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

pub(crate) struct ControllerConfig {
    pub cache_dir: Option<PathBuf>,
    pub registry_dir: Option<PathBuf>,
    pub protoc: Option<PathBuf>,
}

/// What an input resolved to.
pub(crate) enum ResolvedInput {
    /// Every module of the workspace; targets are marked on each module.
    Modules(ModuleSet),
    Image(Image),
}

/// Shared wiring for all commands: input resolution, module lookup and
/// compilation.
pub(crate) struct Controller {
    resolver: Arc<dyn ModuleKeyResolver>,
    reader: Arc<dyn ModuleReader>,
    protoc: Option<PathBuf>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let Some(registry_dir) = config.registry_dir else {
            return Ok(Self {
                resolver: Arc::new(NoRegistry),
                reader: Arc::new(NoRegistry),
                protoc: config.protoc,
            });
        };
        let registry = Arc::new(DirRegistry::new(registry_dir));
        let reader: Arc<dyn ModuleReader> = match config.cache_dir {
            Some(cache_dir) => {
                log::debug!("module cache at {}", cache_dir.display());
                let inner: Arc<dyn ModuleReader> = registry.clone();
                Arc::new(CachedModuleReader::new(Arc::new(ModuleCache::new(cache_dir)), inner))
            }
            None => {
                log::warn!("no cache directory available, reading modules uncached");
                registry.clone()
            }
        };
        Ok(Self {
            resolver: registry,
            reader,
            protoc: config.protoc,
        })
    }

    pub fn compiler(&self) -> Result<Arc<dyn Compiler>> {
        let compiler = match &self.protoc {
            Some(protoc) => ProtocCompiler::new(protoc.clone(), None),
            None => ProtocCompiler::vendored()?,
        };
        Ok(Arc::new(compiler))
    }

    /// Provider that satisfies references from `local` first.
    pub fn provider(&self, local: &[Module]) -> ModuleProvider {
        ModuleProvider::new(Arc::clone(&self.resolver), Arc::clone(&self.reader))
            .with_local_modules(local.iter().cloned())
    }

    pub async fn resolve(
        &self,
        input: &str,
        paths: &[String],
        exclude_paths: &[String],
    ) -> Result<ResolvedInput> {
        validate_targeting(paths, exclude_paths)?;
        match InputRef::parse(input)? {
            InputRef::Dir { path } => {
                let modules = resolve_source(&path, paths, exclude_paths)?;
                Ok(ResolvedInput::Modules(modules))
            }
            InputRef::ProtoFile {
                path,
                include_package_files,
            } => {
                if !paths.is_empty() {
                    bail!("--path cannot be combined with a .proto file input");
                }
                if !Path::new(&path).is_file() {
                    return Err(ModuleError::InputNotFound(path).into());
                }
                let dir = Path::new(&path)
                    .parent()
                    .map(|parent| parent.to_string_lossy().into_owned())
                    .filter(|parent| !parent.is_empty())
                    .unwrap_or_else(|| ".".to_string());
                let (root, input_dir) = split_root(&dir)?;
                let bucket = OsBucket::new(&root)?;
                let base = normalpath::base(&path).to_string();
                let targets = if include_package_files {
                    package_files(&bucket, &input_dir, &base)?
                } else {
                    vec![base]
                };
                let bucket: Arc<dyn ReadBucket> = Arc::new(bucket);
                let workspace = resolve_controlling_workspace(bucket.as_ref(), &input_dir)?;
                let modules = resolve_modules(
                    bucket,
                    workspace.as_ref(),
                    &input_dir,
                    &targets,
                    exclude_paths,
                )?;
                Ok(ResolvedInput::Modules(modules))
            }
            InputRef::Module { module_ref } => {
                let module = self
                    .provider(&[])
                    .get_module(&module_ref)
                    .await?
                    .with_targeting(Targeting::new(paths.to_vec(), exclude_paths.to_vec())?)
                    .with_is_target(true);
                Ok(ResolvedInput::Modules(ModuleSet::new(vec![module])?))
            }
            InputRef::Image { path } => {
                let data = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read image {path}"))?;
                let image = Image::from_bytes(&data)
                    .with_context(|| format!("failed to decode image {path}"))?;
                Ok(ResolvedInput::Image(image.with_only_paths(paths, exclude_paths)?))
            }
        }
    }

    /// Build every target module against the dependency closure of the
    /// set and merge the results. Annotations from all modules are
    /// reported together.
    pub async fn build(&self, modules: &ModuleSet, options: BuildOptions) -> Result<BuildOutcome> {
        let provider = Arc::new(self.provider(modules.modules()));
        let context = Arc::new(resolve_dependency_closure(provider, modules.modules()).await?);
        let builder = Builder::new(self.compiler()?).with_options(options);

        let mut tasks = JoinSet::new();
        for (i, module) in modules.target_modules().cloned().enumerate() {
            let builder = builder.clone();
            let context = Arc::clone(&context);
            tasks.spawn_blocking(move || {
                log::info!("building {}", module.description());
                (i, builder.build(&module, &context))
            });
        }
        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let (i, outcome) = joined?;
            outcomes.push((i, outcome?));
        }
        outcomes.sort_by_key(|(i, _)| *i);

        let mut images = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (_, outcome) in outcomes {
            match outcome {
                BuildOutcome::Built(image) => images.push(image),
                BuildOutcome::Failed(annotations) => failures.push(annotations),
            }
        }
        if let Some(annotations) = FileAnnotationSet::merge(failures) {
            return Ok(BuildOutcome::Failed(annotations));
        }
        Ok(BuildOutcome::Built(merge_images(&images)?))
    }
}

fn resolve_source(
    path: &str,
    paths: &[String],
    exclude_paths: &[String],
) -> Result<ModuleSet> {
    if !Path::new(path).is_dir() {
        return Err(ModuleError::InputNotFound(path.to_string()).into());
    }
    let (root, input_dir) = split_root(path)?;
    let bucket: Arc<dyn ReadBucket> = Arc::new(OsBucket::new(&root)?);
    let workspace = resolve_controlling_workspace(bucket.as_ref(), &input_dir)?;
    if let Some(workspace) = &workspace {
        log::debug!("{input_dir} is controlled by the workspace at {}", workspace.root_prefix());
    }
    Ok(resolve_modules(
        bucket,
        workspace.as_ref(),
        &input_dir,
        paths,
        exclude_paths,
    )?)
}

/// Pick the bucket root for a local input: the current directory when the
/// input lies inside it, so configuration above the input is found and
/// diagnostics use the paths the user typed. Otherwise the input itself.
fn split_root(path: &str) -> Result<(PathBuf, String)> {
    let cwd = std::env::current_dir().context("cannot read the current directory")?;
    let input = Path::new(path);
    let relative = if input.is_absolute() {
        input
            .strip_prefix(&cwd)
            .ok()
            .map(|rel| normalpath::normalize(&rel.to_string_lossy()))
    } else {
        Some(normalpath::normalize(path))
    };
    match relative {
        Some(rel) if normalpath::normalize_and_validate(&rel).is_ok() => Ok((PathBuf::from("."), rel)),
        _ => Ok((input.to_path_buf(), ".".to_string())),
    }
}

/// Base names of the `.proto` files in `dir` declaring the same package as
/// `file`, including `file` itself.
fn package_files(bucket: &dyn ReadBucket, dir: &str, file: &str) -> Result<Vec<String>> {
    let path = normalpath::join(dir, file);
    let package = declared_package(&bucket.read_all(&path)?);
    let mut files = Vec::new();
    for info in bucket.list(dir)? {
        if normalpath::dir(&info.path) != dir || !info.path.ends_with(".proto") {
            continue;
        }
        if info.path == path || declared_package(&bucket.read_all(&info.path)?) == package {
            files.push(normalpath::base(&info.path).to_string());
        }
    }
    files.sort();
    Ok(files)
}

fn declared_package(source: &[u8]) -> Option<String> {
    String::from_utf8_lossy(source).lines().find_map(|line| {
        let rest = line.trim().strip_prefix("package")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let name = rest.trim().trim_end_matches(';').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}
