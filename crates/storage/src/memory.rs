use crate::bucket::{ObjectInfo, ReadBucket, WriteBucket, WriteObject};
use crate::error::{Result, StorageError};
use crate::normalpath;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, RwLock};

/// In-memory bucket. Cloning shares the underlying objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryBucket {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    external_prefix: Option<String>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bucket from `(path, content)` pairs.
    pub fn from_files<P, D>(files: impl IntoIterator<Item = (P, D)>) -> Result<Self>
    where
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        let mut objects = BTreeMap::new();
        for (path, data) in files {
            let path = normalpath::normalize_and_validate(path.as_ref())?;
            objects.insert(path, data.into());
        }
        Ok(Self {
            objects: Arc::new(RwLock::new(objects)),
            external_prefix: None,
        })
    }

    /// Prefix shown in external paths, e.g. a registry location.
    #[must_use]
    pub fn with_external_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.external_prefix = Some(prefix.into());
        self
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every object, sorted by path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects
            .read()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }

    fn external_path(&self, path: &str) -> String {
        match &self.external_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }

    fn info(&self, path: &str, size: usize) -> ObjectInfo {
        ObjectInfo {
            path: path.to_string(),
            external_path: self.external_path(path),
            size: size as u64,
        }
    }
}

fn poisoned() -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        "memory bucket lock poisoned",
    ))
}

impl ReadBucket for MemoryBucket {
    fn get(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let path = normalpath::normalize_and_validate(path)?;
        let objects = self.objects.read().map_err(|_| poisoned())?;
        let data = objects
            .get(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let path = normalpath::normalize_and_validate(path)?;
        let objects = self.objects.read().map_err(|_| poisoned())?;
        match objects.get(&path) {
            Some(data) => Ok(self.info(&path, data.len())),
            None => Err(StorageError::NotFound(path)),
        }
    }

    fn walk(&self, prefix: &str, visit: &mut dyn FnMut(ObjectInfo) -> Result<()>) -> Result<()> {
        let prefix = normalpath::normalize_and_validate(prefix)?;
        let infos: Vec<ObjectInfo> = {
            let objects = self.objects.read().map_err(|_| poisoned())?;
            objects
                .iter()
                .filter(|(path, _)| normalpath::equals_or_contains(&prefix, path))
                .map(|(path, data)| self.info(path, data.len()))
                .collect()
        };
        for info in infos {
            visit(info)?;
        }
        Ok(())
    }
}

struct MemoryWriteObject<'a> {
    bucket: &'a MemoryBucket,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemoryWriteObject<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl WriteObject for MemoryWriteObject<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        let mut objects = self.bucket.objects.write().map_err(|_| poisoned())?;
        objects.insert(self.path, self.buffer);
        Ok(())
    }
}

impl WriteBucket for MemoryBucket {
    fn put(&self, path: &str) -> Result<Box<dyn WriteObject + '_>> {
        let path = normalpath::normalize_and_validate(path)?;
        Ok(Box::new(MemoryWriteObject {
            bucket: self,
            path,
            buffer: Vec::new(),
        }))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let path = normalpath::normalize_and_validate(path)?;
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.remove(&path);
        Ok(())
    }
}
