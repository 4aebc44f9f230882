use crate::error::Result;
use crate::image::Image;
use protokit_module::{ModuleFullName, ModuleKey};
use std::collections::BTreeSet;
use std::fmt;

/// A module outside the built one that an image imports from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageModuleDependency {
    /// Already part of the build context, identified by opaque id.
    Direct { opaque_id: String },
    /// Pinned module that has to come from a provider.
    Indirect { key: ModuleKey },
}

impl ImageModuleDependency {
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }
}

impl fmt::Display for ImageModuleDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { opaque_id } => write!(f, "{opaque_id}"),
            Self::Indirect { key } => write!(f, "{key}"),
        }
    }
}

/// Modules, other than `built_module_id`, providing files that the
/// non-import files of `image` import directly. Files reached only through
/// other imports belong to the dependencies of those modules and are not
/// reported. Files carrying a module name and commit are indirect; any
/// other foreign file is direct. Sorted, without duplicates.
pub fn image_module_dependencies(
    image: &Image,
    built_module_id: &str,
) -> Result<Vec<ImageModuleDependency>> {
    let imported: BTreeSet<&str> = image
        .target_files()
        .flat_map(|file| file.imports().iter().map(String::as_str))
        .collect();
    let mut deps = BTreeSet::new();
    for file in imported.into_iter().filter_map(|path| image.file(path)) {
        if !file.is_import() {
            continue;
        }
        let Some(module_id) = file.module_id() else {
            continue;
        };
        if module_id == built_module_id {
            continue;
        }
        let dep = match (file.info().module(), file.info().commit()) {
            (Some(name), Some(commit)) => {
                let full_name: ModuleFullName = name.parse()?;
                ImageModuleDependency::Indirect {
                    key: ModuleKey::new(full_name, commit)?,
                }
            }
            _ => ImageModuleDependency::Direct {
                opaque_id: module_id.to_string(),
            },
        };
        deps.insert(dep);
    }
    Ok(deps.into_iter().collect())
}
