//! `buf.yaml`, `buf.work.yaml` and `buf.lock`.
//!
//! Every file is probed for its `version` key first and then decoded with the
//! matching schema. Paths inside the files are normalized and validated here
//! so that the resolver only ever sees clean, bucket-relative paths.

use crate::error::{ModuleError, Result};
use crate::identity::{ModuleFullName, ModuleKey, ModuleRef};
use protokit_storage::{normalpath, ReadBucket};
use serde::Deserialize;

pub const BUF_YAML: &str = "buf.yaml";
pub const BUF_WORK_YAML: &str = "buf.work.yaml";
pub const BUF_LOCK: &str = "buf.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVersion {
    V1Beta1,
    V1,
    V2,
}

impl FileVersion {
    fn parse(path: &str, raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None | Some("") => Err(ModuleError::config(path, "missing version key")),
            Some("v1beta1") => Ok(Self::V1Beta1),
            Some("v1") => Ok(Self::V1),
            Some("v2") => Ok(Self::V2),
            Some(other) => Err(ModuleError::config(
                path,
                format!("unknown version {other:?}, expected one of v1beta1, v1, v2"),
            )),
        }
    }

    pub fn is_v2(self) -> bool {
        self == Self::V2
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: Option<String>,
}

fn probe_version(path: &str, data: &[u8]) -> Result<Option<String>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let probe: VersionProbe =
        serde_yaml::from_slice(data).map_err(|err| ModuleError::config(path, err))?;
    Ok(probe.version)
}

/// One module declared by a configuration file. `dir` is relative to the
/// directory holding the configuration; `includes` and `excludes` are
/// relative to `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDirConfig {
    pub dir: String,
    pub name: Option<ModuleFullName>,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub deps: Vec<ModuleRef>,
}

impl ModuleDirConfig {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: None,
            includes: Vec::new(),
            excludes: Vec::new(),
            deps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufYaml {
    pub version: FileVersion,
    pub modules: Vec<ModuleDirConfig>,
    /// Dependencies shared by every module the file declares.
    pub deps: Vec<ModuleRef>,
}

#[derive(Deserialize, Default)]
struct BuildV1 {
    #[serde(default)]
    roots: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
}

#[derive(Deserialize)]
struct BufYamlV1 {
    name: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    build: BuildV1,
}

#[derive(Deserialize)]
struct ModuleV2 {
    #[serde(default = "dot")]
    path: String,
    name: Option<String>,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
}

#[derive(Deserialize)]
struct BufYamlV2 {
    #[serde(default)]
    modules: Vec<ModuleV2>,
    name: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
}

fn dot() -> String {
    ".".to_string()
}

fn clean_path(file: &str, raw: &str) -> Result<String> {
    normalpath::normalize_and_validate(raw)
        .map_err(|err| ModuleError::config(file, format!("invalid path {raw:?}: {err}")))
}

fn parse_name(file: &str, raw: Option<String>) -> Result<Option<ModuleFullName>> {
    raw.filter(|name| !name.trim().is_empty())
        .map(|name| {
            name.parse()
                .map_err(|err| ModuleError::config(file, format!("invalid module name: {err}")))
        })
        .transpose()
}

fn parse_deps(file: &str, raw: Vec<String>) -> Result<Vec<ModuleRef>> {
    let mut deps: Vec<ModuleRef> = Vec::with_capacity(raw.len());
    for dep in raw {
        let dep: ModuleRef = dep
            .parse()
            .map_err(|err| ModuleError::config(file, format!("invalid dependency: {err}")))?;
        if deps.iter().any(|d| d.full_name() == dep.full_name()) {
            return Err(ModuleError::config(
                file,
                format!("dependency {} is declared more than once", dep.full_name()),
            ));
        }
        deps.push(dep);
    }
    Ok(deps)
}

/// Rebase `path` (relative to the config root) onto `dir`. It must live
/// inside `dir`.
fn rebase(file: &str, dir: &str, path: &str) -> Result<String> {
    match normalpath::rel(dir, path) {
        Some(rel) if rel != "." => Ok(rel),
        _ => Err(ModuleError::config(
            file,
            format!("path {path:?} must be strictly inside module directory {dir:?}"),
        )),
    }
}

pub fn parse_buf_yaml(file: &str, data: &[u8]) -> Result<BufYaml> {
    let version = probe_version(file, data)?;
    // Files without a version predate versioning and read as v1beta1.
    let version = match version {
        Some(raw) => FileVersion::parse(file, Some(&raw))?,
        None => FileVersion::V1Beta1,
    };
    match version {
        FileVersion::V1Beta1 | FileVersion::V1 => parse_buf_yaml_v1(file, data, version),
        FileVersion::V2 => parse_buf_yaml_v2(file, data),
    }
}

fn parse_buf_yaml_v1(file: &str, data: &[u8], version: FileVersion) -> Result<BufYaml> {
    let raw: BufYamlV1 = if data.iter().all(u8::is_ascii_whitespace) {
        BufYamlV1 {
            name: None,
            deps: Vec::new(),
            build: BuildV1::default(),
        }
    } else {
        serde_yaml::from_slice(data).map_err(|err| ModuleError::config(file, err))?
    };
    let name = parse_name(file, raw.name)?;
    let deps = parse_deps(file, raw.deps)?;
    let roots = if version == FileVersion::V1Beta1 && !raw.build.roots.is_empty() {
        raw.build
            .roots
            .iter()
            .map(|root| clean_path(file, root))
            .collect::<Result<Vec<_>>>()?
    } else {
        if !raw.build.roots.is_empty() {
            return Err(ModuleError::config(file, "build.roots is only valid in v1beta1"));
        }
        vec![".".to_string()]
    };
    if roots.len() > 1 && name.is_some() {
        return Err(ModuleError::config(
            file,
            "a named module cannot declare more than one root",
        ));
    }
    let excludes = raw
        .build
        .excludes
        .iter()
        .map(|exclude| clean_path(file, exclude))
        .collect::<Result<Vec<_>>>()?;

    let mut modules = Vec::with_capacity(roots.len());
    for root in roots {
        let mut module = ModuleDirConfig::new(root.clone());
        module.name = name.clone();
        module.deps = deps.clone();
        for exclude in &excludes {
            if version == FileVersion::V1Beta1 {
                // v1beta1 excludes are relative to the root they belong to.
                if let Some(rel) = normalpath::rel(&root, exclude) {
                    module.excludes.push(rel);
                }
            } else {
                module.excludes.push(exclude.clone());
            }
        }
        modules.push(module);
    }
    Ok(BufYaml {
        version,
        modules,
        deps,
    })
}

fn parse_buf_yaml_v2(file: &str, data: &[u8]) -> Result<BufYaml> {
    let raw: BufYamlV2 = serde_yaml::from_slice(data).map_err(|err| ModuleError::config(file, err))?;
    let deps = parse_deps(file, raw.deps)?;
    let mut raw_modules = raw.modules;
    if raw_modules.is_empty() {
        raw_modules.push(ModuleV2 {
            path: dot(),
            name: raw.name,
            includes: Vec::new(),
            excludes: Vec::new(),
        });
    } else if raw.name.is_some() {
        return Err(ModuleError::config(
            file,
            "top-level name cannot be combined with a modules list",
        ));
    }

    let mut modules: Vec<ModuleDirConfig> = Vec::with_capacity(raw_modules.len());
    for raw_module in raw_modules {
        let dir = clean_path(file, &raw_module.path)?;
        let mut module = ModuleDirConfig::new(dir.clone());
        module.name = parse_name(file, raw_module.name)?;
        module.deps = deps.clone();
        for include in &raw_module.includes {
            module.includes.push(rebase(file, &dir, &clean_path(file, include)?)?);
        }
        for exclude in &raw_module.excludes {
            module.excludes.push(rebase(file, &dir, &clean_path(file, exclude)?)?);
        }
        if let Some(name) = &module.name {
            if modules.iter().any(|m| m.name.as_ref() == Some(name)) {
                return Err(ModuleError::config(
                    file,
                    format!("module name {name} is declared more than once"),
                ));
            }
        }
        modules.push(module);
    }
    validate_disjoint_dirs(file, modules.iter().map(|m| m.dir.as_str()), true)?;
    Ok(BufYaml {
        version: FileVersion::V2,
        modules,
        deps,
    })
}

/// Module directories may not overlap. v2 allows the same directory more
/// than once as long as the include/exclude split differs.
fn validate_disjoint_dirs<'a>(
    file: &str,
    dirs: impl Iterator<Item = &'a str>,
    allow_equal: bool,
) -> Result<()> {
    let dirs: Vec<&str> = dirs.collect();
    for (i, a) in dirs.iter().enumerate() {
        for b in &dirs[i + 1..] {
            if a == b {
                if allow_equal {
                    continue;
                }
                return Err(ModuleError::config(
                    file,
                    format!("directory {a:?} is listed more than once"),
                ));
            }
            if normalpath::contains(a, b) || normalpath::contains(b, a) {
                return Err(ModuleError::config(
                    file,
                    format!("directory {a:?} overlaps with directory {b:?}"),
                ));
            }
        }
    }
    Ok(())
}

/// A legacy `buf.work.yaml`: a flat list of module directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufWorkYaml {
    pub directories: Vec<String>,
}

#[derive(Deserialize)]
struct BufWorkYamlV1 {
    #[serde(default)]
    directories: Vec<String>,
}

pub fn parse_buf_work_yaml(file: &str, data: &[u8]) -> Result<BufWorkYaml> {
    let version = FileVersion::parse(file, probe_version(file, data)?.as_deref())?;
    if version != FileVersion::V1 {
        return Err(ModuleError::config(file, "buf.work.yaml only supports version v1"));
    }
    let raw: BufWorkYamlV1 =
        serde_yaml::from_slice(data).map_err(|err| ModuleError::config(file, err))?;
    if raw.directories.is_empty() {
        return Err(ModuleError::config(file, "directories must not be empty"));
    }
    let directories = raw
        .directories
        .iter()
        .map(|dir| clean_path(file, dir))
        .collect::<Result<Vec<_>>>()?;
    if directories.iter().any(|dir| dir == ".") {
        return Err(ModuleError::config(
            file,
            "directories cannot include \".\", the workspace root",
        ));
    }
    validate_disjoint_dirs(file, directories.iter().map(String::as_str), false)?;
    Ok(BufWorkYaml { directories })
}

/// Pinned dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufLock {
    pub deps: Vec<ModuleKey>,
}

impl BufLock {
    /// Pin `dep` to the locked commit when the lock knows the module and the
    /// dependency does not already carry a reference.
    pub fn pin(&self, dep: &ModuleRef) -> ModuleRef {
        if dep.reference().is_some() {
            return dep.clone();
        }
        match self.deps.iter().find(|key| key.full_name() == dep.full_name()) {
            Some(key) => key.to_module_ref(),
            None => dep.clone(),
        }
    }
}

#[derive(Deserialize)]
struct LockDepV1 {
    remote: String,
    owner: String,
    repository: String,
    commit: String,
}

#[derive(Deserialize)]
struct BufLockV1 {
    #[serde(default)]
    deps: Vec<LockDepV1>,
}

#[derive(Deserialize)]
struct LockDepV2 {
    name: String,
    commit: String,
}

#[derive(Deserialize)]
struct BufLockV2 {
    #[serde(default)]
    deps: Vec<LockDepV2>,
}

pub fn parse_buf_lock(file: &str, data: &[u8]) -> Result<BufLock> {
    let version = match probe_version(file, data)? {
        Some(raw) => FileVersion::parse(file, Some(&raw))?,
        None if data.iter().all(u8::is_ascii_whitespace) => return Ok(BufLock::default()),
        None => FileVersion::V1,
    };
    let invalid = |err: ModuleError| ModuleError::config(file, format!("invalid dependency: {err}"));
    let deps = match version {
        FileVersion::V1Beta1 | FileVersion::V1 => {
            let raw: BufLockV1 =
                serde_yaml::from_slice(data).map_err(|err| ModuleError::config(file, err))?;
            raw.deps
                .into_iter()
                .map(|dep| {
                    let name = ModuleFullName::new(dep.remote, dep.owner, dep.repository)
                        .map_err(invalid)?;
                    ModuleKey::new(name, dep.commit).map_err(invalid)
                })
                .collect::<Result<Vec<_>>>()?
        }
        FileVersion::V2 => {
            let raw: BufLockV2 =
                serde_yaml::from_slice(data).map_err(|err| ModuleError::config(file, err))?;
            raw.deps
                .into_iter()
                .map(|dep| {
                    let name: ModuleFullName = dep.name.parse().map_err(invalid)?;
                    ModuleKey::new(name, dep.commit).map_err(invalid)
                })
                .collect::<Result<Vec<_>>>()?
        }
    };
    Ok(BufLock { deps })
}

/// Read and parse `name` under `dir` if present.
pub(crate) fn read_optional<T>(
    bucket: &dyn ReadBucket,
    dir: &str,
    name: &str,
    parse: impl FnOnce(&str, &[u8]) -> Result<T>,
) -> Result<Option<T>> {
    let path = normalpath::join(dir, name);
    if !bucket.exists(&path)? {
        return Ok(None);
    }
    let info = bucket.stat(&path)?;
    let data = bucket.read_all(&path)?;
    parse(&info.external_path, &data).map(Some)
}

pub fn read_buf_yaml(bucket: &dyn ReadBucket, dir: &str) -> Result<Option<BufYaml>> {
    read_optional(bucket, dir, BUF_YAML, parse_buf_yaml)
}

pub fn read_buf_work_yaml(bucket: &dyn ReadBucket, dir: &str) -> Result<Option<BufWorkYaml>> {
    read_optional(bucket, dir, BUF_WORK_YAML, parse_buf_work_yaml)
}

pub fn read_buf_lock(bucket: &dyn ReadBucket, dir: &str) -> Result<BufLock> {
    Ok(read_optional(bucket, dir, BUF_LOCK, parse_buf_lock)?.unwrap_or_default())
}
