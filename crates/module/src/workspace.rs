//! Workspace discovery and module resolution.
//!
//! ```text
//! input dir ──> resolve_controlling_workspace ──> ControllingWorkspace | None
//!                 (walk ancestors, nearest match wins)
//!                                   │
//!              --path/--exclude-path│
//!                                   v
//!                           resolve_modules ──> ModuleSet (targets + context)
//! ```
//!
//! A v2 `buf.yaml` controls when the input is its directory, or is equal to,
//! inside of, or above one of its module directories. A `buf.work.yaml`
//! controls when the input is its directory or is equal to or inside one of
//! its listed directories. When neither matches on the way up, the nearest
//! v1 `buf.yaml` that contains the input controls as a single-module
//! workspace; with none of those either, the input directory is a standalone
//! module.

use crate::config::{
    read_buf_lock, read_buf_work_yaml, read_buf_yaml, BufLock, FileVersion, ModuleDirConfig,
    BUF_WORK_YAML, BUF_YAML,
};
use crate::error::{ModuleError, Result};
use crate::identity::ModuleRef;
use crate::module::{Module, ModuleSet};
use crate::targeting::{validate_targeting, Targeting};
use protokit_storage::{normalpath, ReadBucket, SubReadBucket};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceKind {
    /// A v2 `buf.yaml` listing one or more modules.
    V2,
    /// A `buf.work.yaml` listing v1 module directories.
    BufWork,
    /// A lone v1/v1beta1 `buf.yaml`.
    V1Module,
}

impl WorkspaceKind {
    pub fn is_legacy(self) -> bool {
        self != Self::V2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllingWorkspace {
    root_prefix: String,
    kind: WorkspaceKind,
    module_configs: Vec<ModuleDirConfig>,
}

impl ControllingWorkspace {
    /// Bucket-relative directory holding the configuration file.
    pub fn root_prefix(&self) -> &str {
        &self.root_prefix
    }

    pub fn kind(&self) -> WorkspaceKind {
        self.kind
    }

    /// Declared modules in file order; `dir` is relative to `root_prefix`.
    /// Dependencies are already pinned from the matching `buf.lock`.
    pub fn module_configs(&self) -> &[ModuleDirConfig] {
        &self.module_configs
    }

    fn module_dir(&self, config: &ModuleDirConfig) -> String {
        normalpath::join(&self.root_prefix, &config.dir)
    }
}

fn pin_all(deps: &[ModuleRef], lock: &BufLock) -> Vec<ModuleRef> {
    deps.iter().map(|dep| lock.pin(dep)).collect()
}

/// Walk from `input_dir` towards the bucket root and return the workspace
/// that controls it, if any.
pub fn resolve_controlling_workspace(
    bucket: &dyn ReadBucket,
    input_dir: &str,
) -> Result<Option<ControllingWorkspace>> {
    let input_dir = normalpath::normalize_and_validate(input_dir)?;
    let mut v1_fallback: Option<ControllingWorkspace> = None;

    for prefix in normalpath::ancestors(&input_dir) {
        let buf_work = read_buf_work_yaml(bucket, &prefix)?;
        let buf_yaml = read_buf_yaml(bucket, &prefix)?;

        match (buf_work, buf_yaml) {
            (Some(_), Some(buf_yaml)) if buf_yaml.version.is_v2() => {
                return Err(ModuleError::ConflictingConfigs {
                    prefix,
                    first: BUF_WORK_YAML,
                    second: "a v2 buf.yaml",
                });
            }
            (Some(buf_work), _) => {
                let controls = prefix == input_dir
                    || buf_work.directories.iter().any(|dir| {
                        normalpath::equals_or_contains(&normalpath::join(&prefix, dir), &input_dir)
                    });
                if !controls {
                    log::debug!("{BUF_WORK_YAML} at {prefix:?} does not list {input_dir:?}");
                    continue;
                }
                let mut module_configs = Vec::new();
                for dir in &buf_work.directories {
                    let module_dir = normalpath::join(&prefix, dir);
                    module_configs.extend(legacy_module_configs(bucket, &module_dir, dir)?);
                }
                log::debug!("{BUF_WORK_YAML} at {prefix:?} controls {input_dir:?}");
                return Ok(Some(ControllingWorkspace {
                    root_prefix: prefix,
                    kind: WorkspaceKind::BufWork,
                    module_configs,
                }));
            }
            (None, Some(buf_yaml)) if buf_yaml.version.is_v2() => {
                let controls = prefix == input_dir
                    || buf_yaml.modules.iter().any(|module| {
                        let module_dir = normalpath::join(&prefix, &module.dir);
                        normalpath::equals_or_contains(&module_dir, &input_dir)
                            || normalpath::contains(&input_dir, &module_dir)
                    });
                if !controls {
                    log::debug!("v2 {BUF_YAML} at {prefix:?} has no module for {input_dir:?}");
                    continue;
                }
                let lock = read_buf_lock(bucket, &prefix)?;
                let module_configs = buf_yaml
                    .modules
                    .into_iter()
                    .map(|mut module| {
                        module.deps = pin_all(&module.deps, &lock);
                        module
                    })
                    .collect();
                log::debug!("v2 {BUF_YAML} at {prefix:?} controls {input_dir:?}");
                return Ok(Some(ControllingWorkspace {
                    root_prefix: prefix,
                    kind: WorkspaceKind::V2,
                    module_configs,
                }));
            }
            (None, Some(_)) => {
                if v1_fallback.is_none() {
                    v1_fallback = Some(ControllingWorkspace {
                        module_configs: legacy_module_configs(bucket, &prefix, ".")?,
                        root_prefix: prefix,
                        kind: WorkspaceKind::V1Module,
                    });
                }
            }
            (None, None) => {}
        }
    }
    Ok(v1_fallback)
}

/// Module configs for one legacy module directory, read from its own
/// `buf.yaml` and `buf.lock`. `relative_dir` is `module_dir` as seen from the
/// controlling workspace root.
fn legacy_module_configs(
    bucket: &dyn ReadBucket,
    module_dir: &str,
    relative_dir: &str,
) -> Result<Vec<ModuleDirConfig>> {
    let Some(buf_yaml) = read_buf_yaml(bucket, module_dir)? else {
        return Ok(vec![ModuleDirConfig::new(relative_dir)]);
    };
    if buf_yaml.version == FileVersion::V2 {
        return Err(ModuleError::config(
            normalpath::join(module_dir, BUF_YAML),
            "a v2 buf.yaml cannot be part of a buf.work.yaml workspace",
        ));
    }
    let lock = read_buf_lock(bucket, module_dir)?;
    Ok(buf_yaml
        .modules
        .into_iter()
        .map(|mut module| {
            module.dir = normalpath::join(relative_dir, &module.dir);
            module.deps = pin_all(&module.deps, &lock);
            module
        })
        .collect())
}

/// Turn a workspace (or a standalone directory) into modules.
///
/// `target_paths` and `exclude_paths` are relative to `input_dir`. Conflicts
/// between them are reported before any file is read; explicit targets that
/// match no file are reported as missing inputs.
pub fn resolve_modules(
    bucket: Arc<dyn ReadBucket>,
    workspace: Option<&ControllingWorkspace>,
    input_dir: &str,
    target_paths: &[String],
    exclude_paths: &[String],
) -> Result<ModuleSet> {
    validate_targeting(target_paths, exclude_paths)?;
    let input_dir = normalpath::normalize_and_validate(input_dir)?;
    let targets = rebase_all(&input_dir, target_paths)?;
    let excludes = rebase_all(&input_dir, exclude_paths)?;

    let Some(workspace) = workspace else {
        return resolve_standalone(bucket, &input_dir, &targets, &excludes);
    };

    let mut modules = Vec::with_capacity(workspace.module_configs.len());
    let mut claimed = vec![false; targets.len()];
    for config in &workspace.module_configs {
        let module_dir = workspace.module_dir(config);
        let module_bucket: Arc<dyn ReadBucket> = Arc::new(
            SubReadBucket::new(Arc::clone(&bucket), &module_dir)?
                .with_includes(&config.includes)?
                .with_excludes(&config.excludes)?,
        );
        let mut module = Module::local(&module_dir, module_bucket)
            .with_full_name(config.name.clone())
            .with_declared_deps(config.deps.clone());

        let selected = input_dir == workspace.root_prefix
            || normalpath::equals_or_contains(&module_dir, &input_dir)
            || (workspace.kind == WorkspaceKind::V2
                && normalpath::contains(&input_dir, &module_dir));
        let excluded_entirely = excludes
            .iter()
            .any(|exclude| normalpath::equals_or_contains(exclude, &module_dir));

        if !selected || excluded_entirely {
            modules.push(module.with_is_target(false));
            continue;
        }

        // Narrow to the input directory when it sits inside the module.
        let input_scope = normalpath::rel(&module_dir, &input_dir).filter(|rel| rel != ".");
        let mut module_targets = Vec::new();
        for (i, target) in targets.iter().enumerate() {
            if let Some(rel) = normalpath::rel(&module_dir, target) {
                module_targets.push(rel);
                claimed[i] = true;
            }
        }
        if !targets.is_empty() && module_targets.is_empty() {
            modules.push(module.with_is_target(false));
            continue;
        }
        if module_targets.is_empty() {
            module_targets.extend(input_scope);
        }
        let module_excludes = excludes
            .iter()
            .filter_map(|exclude| normalpath::rel(&module_dir, exclude))
            .collect();
        module = module.with_targeting(Targeting::new(module_targets, module_excludes)?);
        modules.push(module);
    }

    if let Some((target, _)) = targets.iter().zip(&claimed).find(|(_, claimed)| !**claimed) {
        return Err(ModuleError::InputNotFound(target.clone()));
    }
    let set = ModuleSet::new(modules)?;
    for module in set.target_modules() {
        ensure_targets_exist(module, &input_dir)?;
    }
    if set.target_modules().next().is_none() {
        return Err(ModuleError::NoTargetModules(input_dir));
    }
    Ok(set)
}

fn resolve_standalone(
    bucket: Arc<dyn ReadBucket>,
    input_dir: &str,
    targets: &[String],
    excludes: &[String],
) -> Result<ModuleSet> {
    let module_bucket: Arc<dyn ReadBucket> = Arc::new(SubReadBucket::new(bucket, input_dir)?);
    let rel = |paths: &[String]| -> Vec<String> {
        paths
            .iter()
            .filter_map(|path| normalpath::rel(input_dir, path))
            .collect()
    };
    let module = Module::local(input_dir, module_bucket)
        .with_targeting(Targeting::new(rel(targets), rel(excludes))?);
    ensure_targets_exist(&module, input_dir)?;
    if module.files()?.is_empty() {
        return Err(ModuleError::NoTargetModules(input_dir.to_string()));
    }
    ModuleSet::new(vec![module])
}

fn rebase_all(input_dir: &str, paths: &[String]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| -> Result<String> {
            let path = normalpath::normalize_and_validate(path)?;
            Ok(normalpath::join(input_dir, &path))
        })
        .collect()
}

/// Every explicit target must name an existing file or a directory with at
/// least one file in it.
fn ensure_targets_exist(module: &Module, input_dir: &str) -> Result<()> {
    let targets = module.targeting().target_paths();
    if targets.is_empty() {
        return Ok(());
    }
    let files = module.files()?;
    for target in targets {
        let found = files
            .iter()
            .any(|file| normalpath::equals_or_contains(target, &file.path));
        if !found {
            let path = normalpath::join(module.opaque_id(), target);
            let shown = normalpath::rel(input_dir, &path).unwrap_or(path);
            return Err(ModuleError::InputNotFound(shown));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use protokit_storage::MemoryBucket;

    fn bucket(files: &[(&str, &str)]) -> Arc<dyn ReadBucket> {
        Arc::new(MemoryBucket::from_files(files.iter().copied()).unwrap())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn both_workspace_formats_at_one_prefix_fail() {
        let bucket = bucket(&[
            ("buf.work.yaml", "version: v1\ndirectories: [a]\n"),
            ("buf.yaml", "version: v2\n"),
            ("a/x.proto", ""),
        ]);
        let err = resolve_controlling_workspace(bucket.as_ref(), "a").unwrap_err();
        assert!(err.to_string().contains("cannot have both"), "{err}");
    }

    #[test]
    fn v2_controls_descendants_and_ancestors_of_modules() {
        let bucket = bucket(&[
            (
                "buf.yaml",
                "version: v2\nmodules:\n  - path: proto/a\n  - path: proto/b\n",
            ),
            ("proto/a/a.proto", ""),
            ("proto/b/b.proto", ""),
        ]);
        for input in [".", "proto", "proto/a", "proto/a/sub"] {
            let workspace = resolve_controlling_workspace(bucket.as_ref(), input)
                .unwrap()
                .unwrap_or_else(|| panic!("no workspace for {input}"));
            assert_eq!(workspace.root_prefix(), ".");
            assert_eq!(workspace.kind(), WorkspaceKind::V2);
        }
        assert!(resolve_controlling_workspace(bucket.as_ref(), "other").unwrap().is_none());
    }

    #[test]
    fn buf_work_does_not_control_parents_of_directories() {
        let bucket = bucket(&[
            ("ws/buf.work.yaml", "version: v1\ndirectories: [proto/a, proto/b]\n"),
            ("ws/proto/a/buf.yaml", "version: v1\nname: buf.build/acme/a\n"),
            ("ws/proto/a/a.proto", ""),
            ("ws/proto/b/b.proto", ""),
        ]);
        let workspace = resolve_controlling_workspace(bucket.as_ref(), "ws/proto/a")
            .unwrap()
            .unwrap();
        assert_eq!(workspace.root_prefix(), "ws");
        assert_eq!(workspace.module_configs().len(), 2);
        assert_eq!(
            workspace.module_configs()[0].name.as_ref().unwrap().to_string(),
            "buf.build/acme/a"
        );
        assert!(resolve_controlling_workspace(bucket.as_ref(), "ws/proto")
            .unwrap()
            .is_none());
    }

    #[test]
    fn resolve_modules_keeps_siblings_as_context() {
        let bucket = bucket(&[
            ("buf.yaml", "version: v2\nmodules:\n  - path: a\n  - path: b\n"),
            ("a/a.proto", ""),
            ("b/b.proto", ""),
        ]);
        let workspace = resolve_controlling_workspace(bucket.as_ref(), "a").unwrap();
        let set = resolve_modules(Arc::clone(&bucket), workspace.as_ref(), "a", &[], &[]).unwrap();
        let targets: Vec<&str> = set.target_modules().map(|m| m.opaque_id()).collect();
        assert_eq!(targets, vec!["a"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn targeting_conflict_fails_before_reading() {
        let bucket = bucket(&[("a/b/c.proto", "")]);
        let err = resolve_modules(
            bucket,
            None,
            ".",
            &strings(&["a/b/c.proto"]),
            &strings(&["a/b"]),
        )
        .unwrap_err();
        assert!(matches!(err, ModuleError::ExcludeContainsTarget { .. }));
    }

    #[test]
    fn disjoint_targeting_selects_only_included_files() {
        let bucket = bucket(&[("a/x.proto", ""), ("a/y.proto", ""), ("b/z.proto", "")]);
        let set = resolve_modules(bucket, None, ".", &strings(&["a"]), &strings(&["a/y.proto"]))
            .unwrap();
        let files: Vec<String> = set.modules()[0]
            .target_files()
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(files, vec!["a/x.proto"]);
    }

    #[test]
    fn missing_target_is_input_not_found() {
        let bucket = bucket(&[("a/x.proto", "")]);
        let err = resolve_modules(bucket, None, ".", &strings(&["nope.proto"]), &[]).unwrap_err();
        assert!(matches!(err, ModuleError::InputNotFound(path) if path == "nope.proto"));
    }

    #[test]
    fn workspace_without_matching_modules_is_fatal() {
        let bucket = bucket(&[
            ("buf.yaml", "version: v2\nmodules:\n  - path: a\n"),
            ("a/x.proto", ""),
        ]);
        let workspace = resolve_controlling_workspace(bucket.as_ref(), ".").unwrap();
        let err = resolve_modules(bucket, workspace.as_ref(), ".", &[], &strings(&["a"]))
            .unwrap_err();
        assert!(matches!(err, ModuleError::NoTargetModules(_)));
    }
}
