use crate::config::{parse_buf_lock, parse_buf_yaml, BUF_LOCK, BUF_YAML};
use crate::error::{ModuleError, Result};
use crate::identity::{ModuleFullName, ModuleKey, ModuleRef};
use crate::provider::{ModuleData, ModuleKeyResolver, ModuleReader};
use async_trait::async_trait;
use protokit_storage::{OsBucket, ReadBucket};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_REF: &str = "main";

/// A module registry laid out on disk:
///
/// ```text
/// <root>/<registry>/<owner>/<name>/commits/<commit>/...   module files
/// <root>/<registry>/<owner>/<name>/refs/<ref>             file holding a commit id
/// ```
///
/// A reference that names an existing commit directory resolves to itself;
/// otherwise it is looked up under `refs/`. No reference means `main`.
#[derive(Debug, Clone)]
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_dir(&self, name: &ModuleFullName) -> PathBuf {
        self.root
            .join(name.registry())
            .join(name.owner())
            .join(name.name())
    }

    fn commit_dir(&self, key: &ModuleKey) -> PathBuf {
        self.module_dir(key.full_name())
            .join("commits")
            .join(key.commit())
    }
}

#[async_trait]
impl ModuleKeyResolver for DirRegistry {
    async fn resolve(&self, module_ref: &ModuleRef) -> Result<ModuleKey> {
        let module_dir = self.module_dir(module_ref.full_name());
        if !tokio::fs::try_exists(&module_dir).await.unwrap_or(false) {
            return Err(ModuleError::ModuleNotFound(module_ref.to_string()));
        }
        let reference = module_ref.reference().unwrap_or(DEFAULT_REF);
        if ModuleKey::new(module_ref.full_name().clone(), reference).is_ok() {
            let commit_dir = module_dir.join("commits").join(reference);
            if tokio::fs::try_exists(&commit_dir).await.unwrap_or(false) {
                return ModuleKey::new(module_ref.full_name().clone(), reference);
            }
        }
        let ref_path = module_dir.join("refs").join(reference);
        let commit = match tokio::fs::read_to_string(&ref_path).await {
            Ok(commit) => commit,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModuleError::ModuleNotFound(module_ref.to_string()));
            }
            Err(err) => return Err(ModuleError::io(ref_path.display().to_string(), err)),
        };
        ModuleKey::new(module_ref.full_name().clone(), commit.trim())
    }
}

#[async_trait]
impl ModuleReader for DirRegistry {
    async fn read(&self, key: &ModuleKey) -> Result<ModuleData> {
        let commit_dir = self.commit_dir(key);
        if !tokio::fs::try_exists(&commit_dir).await.unwrap_or(false) {
            return Err(ModuleError::ModuleNotFound(key.to_string()));
        }
        let key = key.clone();
        tokio::task::spawn_blocking(move || read_commit_dir(&commit_dir, key)).await?
    }
}

fn read_commit_dir(commit_dir: &Path, key: ModuleKey) -> Result<ModuleData> {
    let bucket = OsBucket::new(commit_dir)?;
    let mut files = BTreeMap::new();
    for info in bucket.list(".")? {
        if info.path.ends_with(".proto") {
            let data = bucket.read_all(&info.path)?;
            files.insert(info.path, data);
        }
    }
    let mut declared_deps = Vec::new();
    if bucket.exists(BUF_YAML)? {
        let config = parse_buf_yaml(BUF_YAML, &bucket.read_all(BUF_YAML)?)?;
        declared_deps = config.deps;
    }
    if bucket.exists(BUF_LOCK)? {
        let lock = parse_buf_lock(BUF_LOCK, &bucket.read_all(BUF_LOCK)?)?;
        for locked in &lock.deps {
            if !declared_deps.iter().any(|d| d.full_name() == locked.full_name()) {
                declared_deps.push(locked.to_module_ref());
            }
        }
        declared_deps = declared_deps.iter().map(|dep| lock.pin(dep)).collect();
    }
    log::debug!("read {} files for {key} from {}", files.len(), commit_dir.display());
    Ok(ModuleData {
        key,
        files,
        declared_deps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    #[tokio::test]
    async fn resolves_refs_and_reads_commits() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "buf.build/acme/pet/refs/main", "c2\n");
        write(root, "buf.build/acme/pet/commits/c2/acme/pet/v1/pet.proto", "syntax = \"proto3\";");
        write(
            root,
            "buf.build/acme/pet/commits/c2/buf.lock",
            "version: v2\ndeps:\n  - name: buf.build/acme/money\n    commit: m1\n",
        );
        let registry = DirRegistry::new(root);

        let key = registry
            .resolve(&"buf.build/acme/pet".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(key.to_string(), "buf.build/acme/pet:c2");
        let pinned = registry
            .resolve(&"buf.build/acme/pet:c2".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(pinned, key);

        let data = registry.read(&key).await.unwrap();
        assert_eq!(data.files.keys().collect::<Vec<_>>(), vec!["acme/pet/v1/pet.proto"]);
        assert_eq!(data.declared_deps[0].to_string(), "buf.build/acme/money:m1");
    }

    #[tokio::test]
    async fn unknown_modules_are_not_found() {
        let dir = tempdir().unwrap();
        let registry = DirRegistry::new(dir.path());
        let err = registry
            .resolve(&"buf.build/acme/none".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::ModuleNotFound(_)));
        let key: ModuleKey = "buf.build/acme/none:c1".parse().unwrap();
        assert!(registry.read(&key).await.unwrap_err().is_not_found());
    }
}
