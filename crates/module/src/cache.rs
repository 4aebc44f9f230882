use crate::error::{ModuleError, Result};
use crate::identity::{ModuleKey, ModuleRef};
use crate::provider::{ModuleData, ModuleReader};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, OnceCell};

const MANIFEST_FILE: &str = "manifest.json";
const FILES_DIR: &str = "files";

#[derive(Serialize, Deserialize)]
struct Manifest {
    module: String,
    files: Vec<ManifestFile>,
    deps: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct ManifestFile {
    path: String,
    sha256: String,
}

/// On-disk cache of fetched module content, shared by every fetch in one
/// process.
///
/// Entries live under `<root>/<registry>/<owner>/<name>/<commit>/` and are
/// published by renaming a fully written staging directory into place, so a
/// reader never sees a partial entry. Concurrent requests for one key share a
/// single in-flight fetch.
pub struct ModuleCache {
    root: PathBuf,
    inflight: Mutex<HashMap<ModuleKey, Arc<OnceCell<Arc<ModuleData>>>>>,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache").field("root", &self.root).finish()
    }
}

impl ModuleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &ModuleKey) -> PathBuf {
        let name = key.full_name();
        self.root
            .join(safe_component(name.registry()))
            .join(safe_component(name.owner()))
            .join(safe_component(name.name()))
            .join(safe_component(key.commit()))
    }

    /// Return the cached module, running `fetch` only when neither the disk
    /// nor a concurrent caller has it.
    pub async fn get_or_fetch<F, Fut>(&self, key: &ModuleKey, fetch: F) -> Result<ModuleData>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<ModuleData>>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key.clone()).or_default())
        };
        let data = cell
            .get_or_try_init(|| async move {
                if let Some(data) = self.load(key).await? {
                    log::debug!("module cache hit for {key}");
                    return Ok(Arc::new(data));
                }
                log::debug!("module cache miss for {key}");
                let data = fetch().await?;
                self.store(&data).await?;
                Ok::<_, ModuleError>(Arc::new(data))
            })
            .await?;
        Ok(ModuleData::clone(data))
    }

    async fn load(&self, key: &ModuleKey) -> Result<Option<ModuleData>> {
        let dir = self.entry_dir(key);
        let manifest_path = dir.join(MANIFEST_FILE);
        let bytes = match tokio::fs::read(&manifest_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ModuleError::io(manifest_path.display().to_string(), err)),
        };
        let manifest: Manifest = match serde_json::from_slice(&bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                log::warn!("ignoring corrupt cache manifest {}: {err}", manifest_path.display());
                return Ok(None);
            }
        };
        if manifest.module != key.to_string() {
            log::warn!(
                "cache entry {} belongs to {}, expected {key}",
                dir.display(),
                manifest.module
            );
            return Ok(None);
        }
        let mut files = BTreeMap::new();
        for file in manifest.files {
            let path = dir.join(FILES_DIR).join(&file.path);
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(err) => {
                    log::warn!("cache entry for {key} is incomplete ({}): {err}", file.path);
                    return Ok(None);
                }
            };
            if sha256_hex(&data) != file.sha256 {
                log::warn!("cache entry for {key} has a corrupt file {}", file.path);
                return Ok(None);
            }
            files.insert(file.path, data);
        }
        let declared_deps = manifest
            .deps
            .iter()
            .map(|dep| dep.parse::<ModuleRef>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(ModuleData {
            key: key.clone(),
            files,
            declared_deps,
        }))
    }

    async fn store(&self, data: &ModuleData) -> Result<()> {
        let dir = self.entry_dir(&data.key);
        let parent = dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|err| ModuleError::io(parent.display().to_string(), err))?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let staging = parent.join(format!(
            ".{}.tmp-{}-{nanos}",
            safe_component(data.key.commit()),
            std::process::id()
        ));
        let result = self.write_entry(&staging, data).await;
        if let Err(err) = result {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(err);
        }
        if tokio::fs::rename(&staging, &dir).await.is_err() {
            // Another process published the same entry first.
            let _ = tokio::fs::remove_dir_all(&staging).await;
        }
        Ok(())
    }

    async fn write_entry(&self, staging: &Path, data: &ModuleData) -> Result<()> {
        let files_dir = staging.join(FILES_DIR);
        let mut manifest = Manifest {
            module: data.key.to_string(),
            files: Vec::with_capacity(data.files.len()),
            deps: data.declared_deps.iter().map(ToString::to_string).collect(),
        };
        for (path, content) in &data.files {
            let target = files_dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| ModuleError::io(parent.display().to_string(), err))?;
            }
            tokio::fs::write(&target, content)
                .await
                .map_err(|err| ModuleError::io(target.display().to_string(), err))?;
            manifest.files.push(ManifestFile {
                path: path.clone(),
                sha256: sha256_hex(content),
            });
        }
        let manifest_path = staging.join(MANIFEST_FILE);
        tokio::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
            .await
            .map_err(|err| ModuleError::io(manifest_path.display().to_string(), err))?;
        Ok(())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn safe_component(raw: &str) -> String {
    let out: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out == "." || out == ".." {
        "_".to_string()
    } else {
        out
    }
}

/// A [`ModuleReader`] that consults a [`ModuleCache`] before delegating.
pub struct CachedModuleReader {
    cache: Arc<ModuleCache>,
    inner: Arc<dyn ModuleReader>,
}

impl CachedModuleReader {
    pub fn new(cache: Arc<ModuleCache>, inner: Arc<dyn ModuleReader>) -> Self {
        Self { cache, inner }
    }
}

#[async_trait]
impl ModuleReader for CachedModuleReader {
    async fn read(&self, key: &ModuleKey) -> Result<ModuleData> {
        self.cache
            .get_or_fetch(key, || self.inner.read(key))
            .await
    }
}
