use crate::error::{ImageError, Result};
use crate::wire::{encode_bytes_field, parse_fields, rewrite_fields};
use bytes::Bytes;
use prost::Message;
use prost_types::FileDescriptorProto;
use protokit_analysis::FileInfo;
use protokit_storage::normalpath;
use std::collections::{HashMap, HashSet};

/// Field number of the per-file provenance extension in encoded images.
const IMAGE_FILE_EXTENSION_FIELD: u32 = 8042;

/// `FileDescriptorProto.source_code_info`.
const SOURCE_CODE_INFO_FIELD: u32 = 9;

#[derive(Clone, PartialEq, Message)]
struct ImageWire {
    #[prost(bytes = "vec", repeated, tag = "1")]
    file: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
struct ImageFileWire {
    #[prost(message, optional, tag = "8042")]
    extension: Option<ImageFileExtension>,
}

#[derive(Clone, PartialEq, Message)]
struct ImageFileExtension {
    #[prost(bool, optional, tag = "1")]
    is_import: Option<bool>,
    #[prost(message, optional, tag = "2")]
    module_info: Option<ModuleInfoWire>,
}

#[derive(Clone, PartialEq, Message)]
struct ModuleInfoWire {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
    #[prost(string, optional, tag = "2")]
    commit: Option<String>,
}

/// One compiled file.
///
/// `raw` is the descriptor exactly as the compiler produced it, so custom
/// options survive even though `descriptor` cannot represent them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    info: FileInfo,
    module_id: Option<String>,
    descriptor: FileDescriptorProto,
    raw: Bytes,
}

impl ImageFile {
    pub fn new(info: FileInfo, raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let descriptor = FileDescriptorProto::decode(raw.clone())?;
        let name = descriptor.name.clone().unwrap_or_default();
        if name != info.path() {
            return Err(ImageError::NameMismatch {
                path: info.path().to_string(),
                name,
            });
        }
        Ok(Self {
            info,
            module_id: None,
            descriptor,
            raw,
        })
    }

    /// Opaque id of the module the file came from; the directory for local
    /// modules and the full name for fetched ones.
    #[must_use]
    pub fn with_module_id(mut self, module_id: Option<String>) -> Self {
        self.module_id = module_id;
        self
    }

    #[must_use]
    pub fn with_is_import(mut self, is_import: bool) -> Self {
        self.info = self.info.with_import(is_import);
        self
    }

    pub fn path(&self) -> &str {
        self.info.path()
    }

    pub fn external_path(&self) -> &str {
        self.info.external_path()
    }

    pub fn is_import(&self) -> bool {
        self.info.is_import()
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    pub fn descriptor(&self) -> &FileDescriptorProto {
        &self.descriptor
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn imports(&self) -> &[String] {
        &self.descriptor.dependency
    }

    /// Where the file came from, for error messages.
    pub fn origin(&self) -> String {
        match (self.info.module(), self.info.commit(), &self.module_id) {
            (Some(module), Some(commit), _) => format!("{module}:{commit}"),
            (Some(module), None, _) => module.to_string(),
            (None, _, Some(id)) => id.clone(),
            (None, _, None) => self.info.external_path().to_string(),
        }
    }
}

/// An ordered set of compiled files in which every file comes after the
/// files it imports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image {
    files: Vec<ImageFile>,
    index: HashMap<String, usize>,
}

impl Image {
    /// Validate uniqueness and import order. Imports that are not part of
    /// the image are allowed (images built without imports).
    pub fn new(files: Vec<ImageFile>) -> Result<Self> {
        let mut index = HashMap::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            if index.insert(file.path().to_string(), i).is_some() {
                return Err(ImageError::DuplicatePath(file.path().to_string()));
            }
        }
        for (i, file) in files.iter().enumerate() {
            for import in file.imports() {
                if let Some(&j) = index.get(import) {
                    if j >= i {
                        return Err(ImageError::ImportOrder {
                            path: file.path().to_string(),
                            import: import.clone(),
                        });
                    }
                }
            }
        }
        Ok(Self { files, index })
    }

    pub fn files(&self) -> &[ImageFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<ImageFile> {
        self.files
    }

    pub fn file(&self, path: &str) -> Option<&ImageFile> {
        self.index.get(path).map(|&i| &self.files[i])
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn target_files(&self) -> impl Iterator<Item = &ImageFile> {
        self.files.iter().filter(|file| !file.is_import())
    }

    #[must_use]
    pub fn without_imports(&self) -> Self {
        let files = self.target_files().cloned().collect::<Vec<_>>();
        let index = files
            .iter()
            .enumerate()
            .map(|(i, file)| (file.path().to_string(), i))
            .collect();
        Self { files, index }
    }

    /// Drop `source_code_info` from every file, leaving all other bytes as
    /// they were.
    pub fn without_source_info(&self) -> Result<Self> {
        let files = self
            .files
            .iter()
            .map(|file| -> Result<ImageFile> {
                let raw = rewrite_fields(file.raw(), &|f| f.number != SOURCE_CODE_INFO_FIELD, &mut |_| {
                    Ok(None)
                })?;
                Ok(ImageFile::new(file.info().clone(), raw)?.with_module_id(file.module_id.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(files)
    }

    /// Narrow the targets to files equal to or under `paths` (all targets
    /// when empty) and not under `exclude_paths`. The result keeps every
    /// file the new targets transitively import, marked as imports.
    pub fn with_only_paths(&self, paths: &[String], exclude_paths: &[String]) -> Result<Self> {
        let paths: Vec<String> = paths.iter().map(|p| normalpath::normalize(p)).collect();
        let excludes: Vec<String> = exclude_paths
            .iter()
            .map(|p| normalpath::normalize(p))
            .collect();
        let selected = |file: &ImageFile| {
            (paths.is_empty()
                || paths
                    .iter()
                    .any(|p| normalpath::equals_or_contains(p, file.path())))
                && !excludes
                    .iter()
                    .any(|p| normalpath::equals_or_contains(p, file.path()))
        };
        let targets: HashSet<&str> = self
            .target_files()
            .filter(|file| selected(*file))
            .map(ImageFile::path)
            .collect();
        for path in &paths {
            let matched = targets
                .iter()
                .any(|target| normalpath::equals_or_contains(path, target));
            if !matched {
                return Err(ImageError::PathNotFound(path.clone()));
            }
        }

        let mut needed: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = targets.iter().copied().collect();
        while let Some(path) = stack.pop() {
            if !needed.insert(path) {
                continue;
            }
            if let Some(file) = self.file(path) {
                stack.extend(file.imports().iter().map(String::as_str));
            }
        }
        let files = self
            .files
            .iter()
            .filter(|file| needed.contains(file.path()))
            .map(|file| file.clone().with_is_import(!targets.contains(file.path())))
            .collect();
        Self::new(files)
    }

    /// Encode as an image: a `FileDescriptorSet`-compatible message whose
    /// files carry an extension with the import flag and module identity.
    pub fn to_bytes(&self) -> Vec<u8> {
        let file = self
            .files
            .iter()
            .map(|file| {
                let extension = ImageFileExtension {
                    is_import: Some(file.is_import()),
                    module_info: file.info().module().map(|name| ModuleInfoWire {
                        name: Some(name.to_string()),
                        commit: file.info().commit().map(str::to_string),
                    }),
                };
                let mut bytes = file.raw().to_vec();
                encode_bytes_field(
                    IMAGE_FILE_EXTENSION_FIELD,
                    &extension.encode_to_vec(),
                    &mut bytes,
                );
                bytes
            })
            .collect();
        ImageWire { file }.encode_to_vec()
    }

    /// Plain `FileDescriptorSet` encoding without provenance.
    pub fn to_file_descriptor_set_bytes(&self) -> Vec<u8> {
        let file = self.files.iter().map(|file| file.raw().to_vec()).collect();
        ImageWire { file }.encode_to_vec()
    }

    /// Decode either encoding. Files without provenance are targets.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let wire = ImageWire::decode(data)?;
        let mut files = Vec::with_capacity(wire.file.len());
        for bytes in wire.file {
            let extension = ImageFileWire::decode(bytes.as_slice())?.extension;
            let mut raw = Vec::with_capacity(bytes.len());
            for field in parse_fields(&bytes)? {
                if field.number != IMAGE_FILE_EXTENSION_FIELD {
                    raw.extend_from_slice(field.raw);
                }
            }
            let name = FileDescriptorProto::decode(raw.as_slice())?
                .name
                .unwrap_or_default();
            let (is_import, module, commit) = match extension {
                Some(extension) => {
                    let (module, commit) = extension
                        .module_info
                        .map(|info| (info.name, info.commit))
                        .unwrap_or((None, None));
                    (extension.is_import.unwrap_or(false), module, commit)
                }
                None => (false, None, None),
            };
            let info = FileInfo::new(name.clone(), name)
                .with_import(is_import)
                .with_module(module.clone(), commit);
            files.push(ImageFile::new(info, raw)?.with_module_id(module));
        }
        Self::new(files)
    }
}
