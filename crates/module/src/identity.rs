use crate::error::{ModuleError, Result};
use std::fmt;
use std::str::FromStr;

/// `registry/owner/name`, e.g. `buf.build/acme/weather`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleFullName {
    registry: String,
    owner: String,
    name: String,
}

impl ModuleFullName {
    pub fn new(
        registry: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let full = Self {
            registry: registry.into(),
            owner: owner.into(),
            name: name.into(),
        };
        let display = full.to_string();
        validate_component(&display, &full.registry, true)?;
        validate_component(&display, &full.owner, false)?;
        validate_component(&display, &full.name, false)?;
        Ok(full)
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_component(value: &str, component: &str, registry: bool) -> Result<()> {
    if component.is_empty() {
        return Err(ModuleError::InvalidIdentity {
            value: value.to_string(),
            reason: "expected registry/owner/name with non-empty components",
        });
    }
    let valid = component.chars().all(|ch| {
        ch.is_ascii_alphanumeric()
            || matches!(ch, '-' | '_' | '.')
            || (registry && ch == ':')
    });
    if !valid {
        return Err(ModuleError::InvalidIdentity {
            value: value.to_string(),
            reason: "components may only contain letters, digits, '-', '_' and '.'",
        });
    }
    Ok(())
}

impl fmt::Display for ModuleFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.owner, self.name)
    }
}

impl FromStr for ModuleFullName {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('/').collect();
        let [registry, owner, name] = parts.as_slice() else {
            return Err(ModuleError::InvalidIdentity {
                value: s.to_string(),
                reason: "expected registry/owner/name",
            });
        };
        Self::new(*registry, *owner, *name)
    }
}

/// A module name with an optional reference: a commit, branch, tag or label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleRef {
    full_name: ModuleFullName,
    reference: Option<String>,
}

impl ModuleRef {
    pub fn new(full_name: ModuleFullName, reference: Option<String>) -> Self {
        Self {
            full_name,
            reference: reference.filter(|r| !r.is_empty()),
        }
    }

    pub fn full_name(&self) -> &ModuleFullName {
        &self.full_name
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Same module, pinned to `commit`.
    #[must_use]
    pub fn pinned(&self, commit: impl Into<String>) -> Self {
        Self::new(self.full_name.clone(), Some(commit.into()))
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(reference) => write!(f, "{}:{}", self.full_name, reference),
            None => write!(f, "{}", self.full_name),
        }
    }
}

impl FromStr for ModuleRef {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        // A ':' in the registry is a port; the reference separator comes after the last '/'.
        let slash = s.rfind('/').unwrap_or(0);
        match s[slash..].find(':') {
            Some(idx) => {
                let split = slash + idx;
                let reference = &s[split + 1..];
                if reference.is_empty() {
                    return Err(ModuleError::InvalidIdentity {
                        value: s.to_string(),
                        reason: "empty reference after ':'",
                    });
                }
                Ok(Self::new(s[..split].parse()?, Some(reference.to_string())))
            }
            None => Ok(Self::new(s.parse()?, None)),
        }
    }
}

/// A module name pinned to a concrete commit. This is the unit the cache and
/// the dependency graph key on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    full_name: ModuleFullName,
    commit: String,
}

impl ModuleKey {
    pub fn new(full_name: ModuleFullName, commit: impl Into<String>) -> Result<Self> {
        let commit = commit.into();
        if commit.is_empty() || commit.chars().any(|ch| !ch.is_ascii_alphanumeric() && ch != '-') {
            return Err(ModuleError::InvalidIdentity {
                value: format!("{full_name}:{commit}"),
                reason: "commit must be a non-empty alphanumeric id",
            });
        }
        Ok(Self { full_name, commit })
    }

    pub fn full_name(&self) -> &ModuleFullName {
        &self.full_name
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn to_module_ref(&self) -> ModuleRef {
        ModuleRef::new(self.full_name.clone(), Some(self.commit.clone()))
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.full_name, self.commit)
    }
}

impl FromStr for ModuleKey {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self> {
        let module_ref: ModuleRef = s.parse()?;
        match module_ref.reference {
            Some(commit) => Self::new(module_ref.full_name, commit),
            None => Err(ModuleError::InvalidIdentity {
                value: s.to_string(),
                reason: "expected registry/owner/name:commit",
            }),
        }
    }
}
