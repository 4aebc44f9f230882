use crate::bucket::{ObjectInfo, ReadBucket, WriteBucket, WriteObject};
use crate::error::{Result, StorageError};
use crate::normalpath;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Bucket rooted at a directory on disk.
///
/// External paths are rendered relative to `external_root`, which is the
/// directory as the user spelled it (e.g. `proto` rather than an absolute
/// path), so diagnostics point at paths the user recognises.
#[derive(Debug, Clone)]
pub struct OsBucket {
    root: PathBuf,
    external_root: String,
}

impl OsBucket {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let metadata =
            fs::metadata(&root).map_err(|err| StorageError::io(root.display().to_string(), err))?;
        if !metadata.is_dir() {
            return Err(StorageError::InvalidPath {
                path: root.display().to_string(),
                reason: "not a directory",
            });
        }
        let external_root = normalpath::normalize(&root.to_string_lossy());
        Ok(Self {
            root,
            external_root,
        })
    }

    /// Create the directory first if needed; used for output buckets.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|err| StorageError::io(root.display().to_string(), err))?;
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf)> {
        let path = normalpath::normalize_and_validate(path)?;
        let full = if path == "." {
            self.root.clone()
        } else {
            self.root.join(&path)
        };
        Ok((path, full))
    }

    fn external_path(&self, path: &str) -> String {
        normalpath::join(&self.external_root, path)
    }
}

impl ReadBucket for OsBucket {
    fn get(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let (path, full) = self.resolve(path)?;
        match File::open(&full) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(self.external_path(&path)))
            }
            Err(err) => Err(StorageError::io(self.external_path(&path), err)),
        }
    }

    fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let (path, full) = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(metadata) if metadata.is_file() => Ok(ObjectInfo {
                external_path: self.external_path(&path),
                path,
                size: metadata.len(),
            }),
            Ok(_) => Err(StorageError::NotFound(self.external_path(&path))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(self.external_path(&path)))
            }
            Err(err) => Err(StorageError::io(self.external_path(&path), err)),
        }
    }

    fn walk(&self, prefix: &str, visit: &mut dyn FnMut(ObjectInfo) -> Result<()>) -> Result<()> {
        let (_, full) = self.resolve(prefix)?;
        if !full.exists() {
            return Ok(());
        }
        for entry in WalkDir::new(&full).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| full.display().to_string());
                    return Err(StorageError::io(
                        path,
                        err.into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
                    ));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let path = normalpath::normalize(&relative.to_string_lossy());
            if path.split('/').any(|part| part.ends_with(TMP_SUFFIX)) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            visit(ObjectInfo {
                external_path: self.external_path(&path),
                path,
                size,
            })?;
        }
        Ok(())
    }
}

const TMP_SUFFIX: &str = ".protokit-tmp";

/// Writes land in a sibling staging file that is renamed over the target on
/// commit and removed if the object is dropped first.
struct OsWriteObject {
    target: PathBuf,
    staging: PathBuf,
    file: Option<File>,
    external_path: String,
}

impl Write for OsWriteObject {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(std::io::Error::other("write object already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl WriteObject for OsWriteObject {
    fn commit(mut self: Box<Self>) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|err| StorageError::io(self.external_path.clone(), err))?;
        }
        fs::rename(&self.staging, &self.target)
            .map_err(|err| StorageError::io(self.external_path.clone(), err))?;
        Ok(())
    }
}

impl Drop for OsWriteObject {
    fn drop(&mut self) {
        if self.staging.exists() {
            if let Err(err) = fs::remove_file(&self.staging) {
                log::warn!(
                    "Failed to remove staging file {}: {err}",
                    self.staging.display()
                );
            }
        }
    }
}

impl WriteBucket for OsBucket {
    fn put(&self, path: &str) -> Result<Box<dyn WriteObject + '_>> {
        let (path, target) = self.resolve(path)?;
        if path == "." {
            return Err(StorageError::InvalidPath {
                path,
                reason: "cannot write to the bucket root",
            });
        }
        let external_path = self.external_path(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::io(external_path.clone(), err))?;
        }
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let staging = target.with_file_name(format!(".{file_name}.{}{TMP_SUFFIX}", std::process::id()));
        let file =
            File::create(&staging).map_err(|err| StorageError::io(external_path.clone(), err))?;
        Ok(Box::new(OsWriteObject {
            target,
            staging,
            file: Some(file),
            external_path,
        }))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let (path, full) = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(self.external_path(&path), err)),
        }
    }
}
