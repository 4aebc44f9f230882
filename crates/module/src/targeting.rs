use crate::error::{ModuleError, Result};
use protokit_storage::normalpath;

/// Reject `--path` / `--exclude-path` combinations that can never select
/// anything. Runs before any file is read.
pub fn validate_targeting(target_paths: &[String], exclude_paths: &[String]) -> Result<()> {
    for target in target_paths {
        let target = normalpath::normalize(target);
        for exclude in exclude_paths {
            let exclude = normalpath::normalize(exclude);
            if target == exclude {
                return Err(ModuleError::TargetEqualsExclude(target));
            }
            if normalpath::contains(&exclude, &target) {
                return Err(ModuleError::ExcludeContainsTarget {
                    target,
                    exclude,
                });
            }
        }
    }
    Ok(())
}

/// Which files of a module are selected. Paths are module-root-relative.
/// An empty target list selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targeting {
    target_paths: Vec<String>,
    exclude_paths: Vec<String>,
}

impl Targeting {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(target_paths: Vec<String>, exclude_paths: Vec<String>) -> Result<Self> {
        let target_paths: Vec<String> = target_paths
            .iter()
            .map(|p| normalpath::normalize_and_validate(p))
            .collect::<std::result::Result<_, _>>()?;
        let exclude_paths: Vec<String> = exclude_paths
            .iter()
            .map(|p| normalpath::normalize_and_validate(p))
            .collect::<std::result::Result<_, _>>()?;
        validate_targeting(&target_paths, &exclude_paths)?;
        Ok(Self {
            target_paths,
            exclude_paths,
        })
    }

    pub fn target_paths(&self) -> &[String] {
        &self.target_paths
    }

    pub fn exclude_paths(&self) -> &[String] {
        &self.exclude_paths
    }

    pub fn is_all(&self) -> bool {
        self.target_paths.is_empty() && self.exclude_paths.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        let targeted = self.target_paths.is_empty()
            || self
                .target_paths
                .iter()
                .any(|target| normalpath::equals_or_contains(target, path));
        targeted
            && !self
                .exclude_paths
                .iter()
                .any(|exclude| normalpath::equals_or_contains(exclude, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn exclude_of_ancestor_is_rejected_naming_both() {
        let err = validate_targeting(&strings(&["a/b/c.proto"]), &strings(&["a/b"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("a/b/c.proto"), "{message}");
        assert!(message.contains("\"a/b\""), "{message}");
    }

    #[test]
    fn identical_paths_are_rejected() {
        assert!(matches!(
            validate_targeting(&strings(&["./a"]), &strings(&["a"])),
            Err(ModuleError::TargetEqualsExclude(path)) if path == "a"
        ));
    }

    #[test]
    fn disjoint_targeting_filters() {
        let targeting = Targeting::new(strings(&["a"]), strings(&["a/internal", "b"])).unwrap();
        assert!(targeting.matches("a/x.proto"));
        assert!(!targeting.matches("a/internal/y.proto"));
        assert!(!targeting.matches("c/z.proto"));
        assert!(Targeting::all().matches("anything.proto"));
    }

    #[test]
    fn narrower_exclude_inside_target_is_fine() {
        assert!(validate_targeting(&strings(&["a"]), &strings(&["a/b"])).is_ok());
    }
}
