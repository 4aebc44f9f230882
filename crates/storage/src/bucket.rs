use crate::error::{Result, StorageError};
use std::io::{Read, Write};

/// Metadata about one object in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectInfo {
    /// Normalized bucket-relative path.
    pub path: String,
    /// Human-facing location (filesystem path, archive entry, label).
    pub external_path: String,
    pub size: u64,
}

pub trait ReadBucket: Send + Sync {
    /// Open an object for reading.
    fn get(&self, path: &str) -> Result<Box<dyn Read + Send + '_>>;

    /// Stat an object. Missing objects return [`StorageError::NotFound`].
    fn stat(&self, path: &str) -> Result<ObjectInfo>;

    /// Visit every object under `prefix` (`.` for all) in path order.
    fn walk(&self, prefix: &str, visit: &mut dyn FnMut(ObjectInfo) -> Result<()>) -> Result<()>;

    fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.get(path)?;
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .map_err(|err| StorageError::io(path, err))?;
        Ok(out)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// All objects under `prefix`, sorted by path.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut out = Vec::new();
        self.walk(prefix, &mut |info| {
            out.push(info);
            Ok(())
        })?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }
}

/// A pending write. Data is only published by [`WriteObject::commit`];
/// dropping the object without committing discards it.
pub trait WriteObject: Write + Send {
    fn commit(self: Box<Self>) -> Result<()>;
}

pub trait WriteBucket: Send + Sync {
    fn put(&self, path: &str) -> Result<Box<dyn WriteObject + '_>>;

    fn delete(&self, path: &str) -> Result<()>;

    fn put_all(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut object = self.put(path)?;
        object
            .write_all(data)
            .map_err(|err| StorageError::io(path, err))?;
        object.commit()
    }
}
