use crate::bucket::{ObjectInfo, ReadBucket};
use crate::error::{Result, StorageError};
use crate::normalpath;
use std::io::Read;
use std::sync::Arc;

/// Read-only view of `prefix` inside another bucket, optionally narrowed by
/// include/exclude prefixes expressed relative to `prefix`.
#[derive(Clone)]
pub struct SubReadBucket {
    inner: Arc<dyn ReadBucket>,
    prefix: String,
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl std::fmt::Debug for SubReadBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubReadBucket")
            .field("prefix", &self.prefix)
            .field("includes", &self.includes)
            .field("excludes", &self.excludes)
            .finish()
    }
}

impl SubReadBucket {
    pub fn new(inner: Arc<dyn ReadBucket>, prefix: &str) -> Result<Self> {
        Ok(Self {
            inner,
            prefix: normalpath::normalize_and_validate(prefix)?,
            includes: Vec::new(),
            excludes: Vec::new(),
        })
    }

    /// Only paths equal to or under one of `includes` stay visible. Empty
    /// means everything.
    pub fn with_includes<I, S>(mut self, includes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.includes = validate_all(includes)?;
        Ok(self)
    }

    pub fn with_excludes<I, S>(mut self, excludes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excludes = validate_all(excludes)?;
        Ok(self)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn visible(&self, path: &str) -> bool {
        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|include| normalpath::equals_or_contains(include, path));
        included
            && !self
                .excludes
                .iter()
                .any(|exclude| normalpath::equals_or_contains(exclude, path))
    }

    fn outer(&self, path: &str) -> Result<(String, String)> {
        let path = normalpath::normalize_and_validate(path)?;
        let outer = normalpath::join(&self.prefix, &path);
        Ok((path, outer))
    }
}

fn validate_all<I, S>(paths: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|path| normalpath::normalize_and_validate(path.as_ref()))
        .collect()
}

impl ReadBucket for SubReadBucket {
    fn get(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let (path, outer) = self.outer(path)?;
        if !self.visible(&path) {
            return Err(StorageError::NotFound(path));
        }
        self.inner.get(&outer)
    }

    fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let (path, outer) = self.outer(path)?;
        if !self.visible(&path) {
            return Err(StorageError::NotFound(path));
        }
        let info = self.inner.stat(&outer)?;
        Ok(ObjectInfo {
            path,
            external_path: info.external_path,
            size: info.size,
        })
    }

    fn walk(&self, prefix: &str, visit: &mut dyn FnMut(ObjectInfo) -> Result<()>) -> Result<()> {
        let (_, outer) = self.outer(prefix)?;
        self.inner.walk(&outer, &mut |info| {
            let Some(path) = normalpath::rel(&self.prefix, &info.path) else {
                return Ok(());
            };
            if !self.visible(&path) {
                return Ok(());
            }
            visit(ObjectInfo {
                path,
                external_path: info.external_path,
                size: info.size,
            })
        })
    }
}
