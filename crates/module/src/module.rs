use crate::error::{ModuleError, Result};
use crate::identity::{ModuleFullName, ModuleKey, ModuleRef};
use crate::targeting::Targeting;
use protokit_storage::{normalpath, ObjectInfo, ReadBucket};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A compilable set of `.proto` files plus the modules they may import from.
///
/// Values are immutable: narrowing the targeting or flipping the target flag
/// returns a new `Module` sharing the same bucket.
#[derive(Clone)]
pub struct Module {
    opaque_id: String,
    full_name: Option<ModuleFullName>,
    commit: Option<String>,
    bucket: Arc<dyn ReadBucket>,
    targeting: Targeting,
    is_target: bool,
    declared_deps: Vec<ModuleRef>,
    is_local: bool,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("opaque_id", &self.opaque_id)
            .field("full_name", &self.full_name)
            .field("commit", &self.commit)
            .field("targeting", &self.targeting)
            .field("is_target", &self.is_target)
            .field("declared_deps", &self.declared_deps)
            .field("is_local", &self.is_local)
            .finish()
    }
}

impl Module {
    /// A module read from the local workspace. `dir` is its bucket-relative
    /// directory and doubles as the opaque id.
    pub fn local(dir: &str, bucket: Arc<dyn ReadBucket>) -> Self {
        Self {
            opaque_id: normalpath::normalize(dir),
            full_name: None,
            commit: None,
            bucket,
            targeting: Targeting::all(),
            is_target: true,
            declared_deps: Vec::new(),
            is_local: true,
        }
    }

    /// A module fetched by key. Never a target.
    pub fn remote(key: &ModuleKey, bucket: Arc<dyn ReadBucket>) -> Self {
        Self {
            opaque_id: key.full_name().to_string(),
            full_name: Some(key.full_name().clone()),
            commit: Some(key.commit().to_string()),
            bucket,
            targeting: Targeting::all(),
            is_target: false,
            declared_deps: Vec::new(),
            is_local: false,
        }
    }

    #[must_use]
    pub fn with_full_name(mut self, full_name: Option<ModuleFullName>) -> Self {
        self.full_name = full_name;
        self
    }

    #[must_use]
    pub fn with_declared_deps(mut self, deps: Vec<ModuleRef>) -> Self {
        self.declared_deps = deps;
        self
    }

    #[must_use]
    pub fn with_targeting(mut self, targeting: Targeting) -> Self {
        self.targeting = targeting;
        self
    }

    #[must_use]
    pub fn with_is_target(mut self, is_target: bool) -> Self {
        self.is_target = is_target;
        self
    }

    pub fn opaque_id(&self) -> &str {
        &self.opaque_id
    }

    pub fn full_name(&self) -> Option<&ModuleFullName> {
        self.full_name.as_ref()
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref()
    }

    pub fn key(&self) -> Option<ModuleKey> {
        let full_name = self.full_name.clone()?;
        let commit = self.commit.clone()?;
        ModuleKey::new(full_name, commit).ok()
    }

    pub fn bucket(&self) -> &Arc<dyn ReadBucket> {
        &self.bucket
    }

    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    pub fn is_target(&self) -> bool {
        self.is_target
    }

    pub fn declared_deps(&self) -> &[ModuleRef] {
        &self.declared_deps
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Human-facing name: the full name when known, else the directory.
    pub fn description(&self) -> String {
        match (&self.full_name, &self.commit) {
            (Some(name), Some(commit)) => format!("{name}:{commit}"),
            (Some(name), None) => name.to_string(),
            _ => self.opaque_id.clone(),
        }
    }

    /// Every `.proto` file of the module, sorted by path.
    pub fn files(&self) -> Result<Vec<ObjectInfo>> {
        let mut files = Vec::new();
        self.bucket.walk(".", &mut |info| {
            if normalpath::ext(&info.path) == ".proto" {
                files.push(info);
            }
            Ok(())
        })?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Files selected for building. Empty when the module is not a target.
    pub fn target_files(&self) -> Result<Vec<ObjectInfo>> {
        if !self.is_target {
            return Ok(Vec::new());
        }
        Ok(self
            .files()?
            .into_iter()
            .filter(|info| self.targeting.matches(&info.path))
            .collect())
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.bucket.read_all(path)?)
    }
}

/// Ordered set of modules resolved for one input.
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
    modules: Vec<Module>,
}

impl ModuleSet {
    pub fn new(modules: Vec<Module>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for module in &modules {
            if !ids.insert(module.opaque_id().to_string()) {
                return Err(ModuleError::DuplicateModule(module.opaque_id().to_string()));
            }
            if let Some(name) = module.full_name() {
                if !names.insert(name.clone()) {
                    return Err(ModuleError::DuplicateModule(name.to_string()));
                }
            }
        }
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn into_modules(self) -> Vec<Module> {
        self.modules
    }

    pub fn target_modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter().filter(|module| module.is_target())
    }

    pub fn get_by_opaque_id(&self, opaque_id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.opaque_id() == opaque_id)
    }

    pub fn get_by_full_name(&self, full_name: &ModuleFullName) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.full_name() == Some(full_name))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use protokit_storage::MemoryBucket;

    fn bucket(files: &[&str]) -> Arc<dyn ReadBucket> {
        Arc::new(MemoryBucket::from_files(files.iter().map(|f| (*f, ""))).unwrap())
    }

    #[test]
    fn files_are_proto_only_and_sorted() {
        let module = Module::local("proto", bucket(&["b.proto", "a/x.proto", "README.md"]));
        let paths: Vec<String> = module.files().unwrap().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["a/x.proto", "b.proto"]);
    }

    #[test]
    fn retargeting_returns_a_new_value() {
        let module = Module::local("proto", bucket(&["a/x.proto", "b/y.proto"]));
        let narrowed = module
            .clone()
            .with_targeting(Targeting::new(vec!["a".into()], vec![]).unwrap());
        let paths: Vec<String> = narrowed
            .target_files()
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["a/x.proto"]);
        assert_eq!(module.target_files().unwrap().len(), 2);
        assert!(module.clone().with_is_target(false).target_files().unwrap().is_empty());
    }

    #[test]
    fn module_set_rejects_duplicate_names() {
        let name: ModuleFullName = "buf.build/acme/a".parse().unwrap();
        let a = Module::local("a", bucket(&[])).with_full_name(Some(name.clone()));
        let b = Module::local("b", bucket(&[])).with_full_name(Some(name));
        assert!(matches!(
            ModuleSet::new(vec![a, b]),
            Err(ModuleError::DuplicateModule(_))
        ));
    }
}
