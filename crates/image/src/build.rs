use crate::compiler::{Compiler, ImportResolver, PositionedError};
use crate::error::{ImageError, Result};
use crate::image::{Image, ImageFile};
use protokit_analysis::{FileAnnotation, FileAnnotationSet, FileInfo, ANNOTATION_TYPE_COMPILE};
use protokit_module::Module;
use protokit_storage::ObjectInfo;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub exclude_source_info: bool,
    pub exclude_imports: bool,
}

/// Result of a build that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built(Image),
    /// The compiler reported problems; no image was produced.
    Failed(FileAnnotationSet),
}

impl BuildOutcome {
    pub fn into_result(self) -> std::result::Result<Image, FileAnnotationSet> {
        match self {
            Self::Built(image) => Ok(image),
            Self::Failed(annotations) => Err(annotations),
        }
    }
}

struct IndexedFile {
    module: usize,
    info: ObjectInfo,
}

/// Every file visible to one compilation, keyed by import path.
struct ModuleFileIndex<'a> {
    modules: Vec<&'a Module>,
    files: BTreeMap<String, IndexedFile>,
}

impl<'a> ModuleFileIndex<'a> {
    fn new(module: &'a Module, context: &'a [Module]) -> Result<Self> {
        let mut modules = vec![module];
        modules.extend(
            context
                .iter()
                .filter(|other| other.opaque_id() != module.opaque_id()),
        );
        let mut files: BTreeMap<String, IndexedFile> = BTreeMap::new();
        for (i, m) in modules.iter().enumerate() {
            for info in m.files()? {
                if let Some(existing) = files.get(&info.path) {
                    return Err(ImageError::DuplicateFileAcrossModules {
                        path: info.path,
                        first: modules[existing.module].description(),
                        second: m.description(),
                    });
                }
                files.insert(info.path.clone(), IndexedFile { module: i, info });
            }
        }
        Ok(Self { modules, files })
    }

    fn file_info(&self, path: &str) -> FileInfo {
        match self.files.get(path) {
            Some(file) => {
                let module = self.modules[file.module];
                FileInfo::new(path, file.info.external_path.clone()).with_module(
                    module.full_name().map(ToString::to_string),
                    module.commit().map(str::to_string),
                )
            }
            None => FileInfo::new(path, path),
        }
    }

    fn module_id(&self, path: &str) -> Option<String> {
        self.files
            .get(path)
            .map(|file| self.modules[file.module].opaque_id().to_string())
    }
}

impl ImportResolver for ModuleFileIndex<'_> {
    fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn open(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.files.get(path) {
            Some(file) => Ok(Some(self.modules[file.module].read_file(path)?)),
            None => Ok(None),
        }
    }
}

/// Compiles one module against the modules it may import from.
#[derive(Clone)]
pub struct Builder {
    compiler: Arc<dyn Compiler>,
    options: BuildOptions,
}

impl Builder {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self {
            compiler,
            options: BuildOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    /// Compile the target files of `module`. `context` supplies every module
    /// whose files may be imported; a path provided by two modules is an
    /// error. Files of `module` that are not targets, and all files of the
    /// context, show up as imports when imported.
    pub fn build(&self, module: &Module, context: &[Module]) -> Result<BuildOutcome> {
        let index = ModuleFileIndex::new(module, context)?;
        let targets: Vec<String> = module
            .target_files()?
            .into_iter()
            .map(|info| info.path)
            .collect();
        if targets.is_empty() {
            log::debug!("{} has no target files", module.description());
            return Ok(BuildOutcome::Built(Image::default()));
        }
        log::debug!(
            "compiling {} target files of {} with {} visible files",
            targets.len(),
            module.description(),
            index.files.len()
        );

        let output = self
            .compiler
            .compile(&targets, &index, !self.options.exclude_source_info)?;
        if !output.errors.is_empty() {
            let annotations = output
                .errors
                .iter()
                .map(|error| annotation_for(&index, error));
            if let Some(set) = FileAnnotationSet::new(annotations) {
                return Ok(BuildOutcome::Failed(set));
            }
        }

        let target_set: HashSet<&str> = targets.iter().map(String::as_str).collect();
        let mut files = Vec::with_capacity(output.files.len());
        for raw in output.files {
            let is_import = !target_set.contains(raw.path.as_str());
            let info = index.file_info(&raw.path).with_import(is_import);
            let module_id = index.module_id(&raw.path);
            files.push(ImageFile::new(info, raw.bytes)?.with_module_id(module_id));
        }
        let image = Image::new(files)?;
        Ok(BuildOutcome::Built(if self.options.exclude_imports {
            image.without_imports()
        } else {
            image
        }))
    }
}

fn annotation_for(index: &ModuleFileIndex<'_>, error: &PositionedError) -> FileAnnotation {
    let file_info = error.path.as_deref().map(|path| index.file_info(path));
    FileAnnotation::new(
        file_info,
        error.line,
        error.column,
        error.line,
        error.column,
        ANNOTATION_TYPE_COMPILE,
        error.message.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FakeCompiler;
    use pretty_assertions::assert_eq;
    use protokit_storage::{MemoryBucket, ReadBucket};

    fn module(dir: &str, files: &[(&str, &str)]) -> Module {
        let bucket: Arc<dyn ReadBucket> =
            Arc::new(MemoryBucket::from_files(files.iter().copied()).unwrap());
        Module::local(dir, bucket)
    }

    #[test]
    fn partitions_targets_and_imports() {
        let a = module("a", &[("a.proto", "import \"b.proto\";")]);
        let b = module("b", &[("b.proto", "")]);
        let builder = Builder::new(Arc::new(FakeCompiler));
        let image = builder
            .build(&a, &[a.clone(), b])
            .unwrap()
            .into_result()
            .unwrap();
        let summary: Vec<(&str, bool, Option<&str>)> = image
            .files()
            .iter()
            .map(|f| (f.path(), f.is_import(), f.module_id()))
            .collect();
        assert_eq!(
            summary,
            vec![("b.proto", true, Some("b")), ("a.proto", false, Some("a"))]
        );

        let without = builder
            .with_options(BuildOptions {
                exclude_imports: true,
                ..BuildOptions::default()
            })
            .build(&a, &[module("b", &[("b.proto", "")])])
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(without.len(), 1);
    }

    #[test]
    fn compile_errors_become_annotations() {
        let a = module("a", &[("a.proto", "import \"missing.proto\";")]);
        let outcome = Builder::new(Arc::new(FakeCompiler)).build(&a, &[]).unwrap();
        let BuildOutcome::Failed(set) = outcome else {
            panic!("expected annotations");
        };
        assert_eq!(
            set.to_string(),
            "a.proto:1:1:Import \"missing.proto\" was not found or had errors."
        );
        assert_eq!(set.file_annotations()[0].type_string(), ANNOTATION_TYPE_COMPILE);
    }

    #[test]
    fn duplicate_paths_across_modules_are_rejected() {
        let a = module("a", &[("x.proto", "")]);
        let b = module("b", &[("x.proto", "")]);
        let err = Builder::new(Arc::new(FakeCompiler)).build(&a, &[b]).unwrap_err();
        assert!(matches!(err, ImageError::DuplicateFileAcrossModules { path, .. } if path == "x.proto"));
    }
}
