use crate::error::{ModuleError, Result};
use crate::identity::{ModuleKey, ModuleRef};
use crate::module::Module;
use async_trait::async_trait;
use protokit_storage::MemoryBucket;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Content of one pinned module as delivered by a [`ModuleReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleData {
    pub key: ModuleKey,
    /// Module-root-relative path to file content.
    pub files: BTreeMap<String, Vec<u8>>,
    /// Dependencies of this module, pinned where a lock file said so.
    pub declared_deps: Vec<ModuleRef>,
}

impl ModuleData {
    pub fn into_module(self) -> Result<Module> {
        let bucket = MemoryBucket::from_files(self.files)?.with_external_prefix(self.key.to_string());
        Ok(Module::remote(&self.key, Arc::new(bucket)).with_declared_deps(self.declared_deps))
    }
}

/// Maps a reference (possibly a branch or label) to a pinned commit.
#[async_trait]
pub trait ModuleKeyResolver: Send + Sync {
    async fn resolve(&self, module_ref: &ModuleRef) -> Result<ModuleKey>;
}

/// Fetches the content of a pinned module.
#[async_trait]
pub trait ModuleReader: Send + Sync {
    async fn read(&self, key: &ModuleKey) -> Result<ModuleData>;
}

/// Provider used when no registry is configured: every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

#[async_trait]
impl ModuleKeyResolver for NoRegistry {
    async fn resolve(&self, module_ref: &ModuleRef) -> Result<ModuleKey> {
        Err(ModuleError::ModuleNotFound(module_ref.to_string()))
    }
}

#[async_trait]
impl ModuleReader for NoRegistry {
    async fn read(&self, key: &ModuleKey) -> Result<ModuleData> {
        Err(ModuleError::ModuleNotFound(key.to_string()))
    }
}

/// Finds modules by reference: workspace modules first, then the remote
/// resolver/reader pair.
#[derive(Clone)]
pub struct ModuleProvider {
    local: Vec<Module>,
    resolver: Arc<dyn ModuleKeyResolver>,
    reader: Arc<dyn ModuleReader>,
}

impl ModuleProvider {
    pub fn new(resolver: Arc<dyn ModuleKeyResolver>, reader: Arc<dyn ModuleReader>) -> Self {
        Self {
            local: Vec::new(),
            resolver,
            reader,
        }
    }

    #[must_use]
    pub fn with_local_modules(mut self, modules: impl IntoIterator<Item = Module>) -> Self {
        self.local.extend(modules);
        self
    }

    pub fn local_module(&self, module_ref: &ModuleRef) -> Option<&Module> {
        self.local
            .iter()
            .find(|module| module.full_name() == Some(module_ref.full_name()))
    }

    pub async fn get_module(&self, module_ref: &ModuleRef) -> Result<Module> {
        if let Some(module) = self.local_module(module_ref) {
            log::debug!("{module_ref} resolved to workspace module {}", module.opaque_id());
            return Ok(module.clone());
        }
        let key = self.resolver.resolve(module_ref).await?;
        log::debug!("{module_ref} resolved to {key}");
        let data = self.reader.read(&key).await?;
        if data.key != key {
            return Err(ModuleError::InvalidIdentity {
                value: data.key.to_string(),
                reason: "reader returned a different module than requested",
            });
        }
        data.into_module()
    }
}
