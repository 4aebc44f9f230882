use serde::{Deserialize, Serialize};

/// One proto source file as seen by the toolchain.
///
/// `path` is the module-root-relative name used in `import` statements.
/// `external_path` is what a human should be shown: a filesystem path, a
/// registry location or a synthetic label for piped input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileInfo {
    path: String,
    external_path: String,
    is_import: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    commit: Option<String>,
}

impl FileInfo {
    /// Create a file info. An empty external path falls back to `path`.
    pub fn new(path: impl Into<String>, external_path: impl Into<String>) -> Self {
        let path = clean(&path.into());
        let external_path = external_path.into();
        let external_path = if external_path.is_empty() {
            path.clone()
        } else {
            external_path
        };
        Self {
            path,
            external_path,
            is_import: false,
            module: None,
            commit: None,
        }
    }

    #[must_use]
    pub fn with_import(mut self, is_import: bool) -> Self {
        self.is_import = is_import;
        self
    }

    /// Attach the owning module identity (`registry/owner/name`) and commit.
    #[must_use]
    pub fn with_module(mut self, module: Option<String>, commit: Option<String>) -> Self {
        self.module = module;
        self.commit = commit;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn external_path(&self) -> &str {
        &self.external_path
    }

    pub fn is_import(&self) -> bool {
        self.is_import
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref()
    }
}

fn clean(raw: &str) -> String {
    let mut value = raw.replace('\\', "/");
    while let Some(rest) = value.strip_prefix("./") {
        value = rest.to_string();
    }
    value
}
