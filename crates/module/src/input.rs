use crate::error::{ModuleError, Result};
use crate::identity::ModuleRef;
use std::fmt;
use std::path::Path;

/// What the user pointed a command at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRef {
    Dir {
        path: String,
    },
    ProtoFile {
        path: String,
        /// Widen to every file in the same directory and package.
        include_package_files: bool,
    },
    Module {
        module_ref: ModuleRef,
    },
    /// A binary image produced by `build -o`.
    Image {
        path: String,
    },
}

impl InputRef {
    /// Parse `value[#format=F][,include_package_files=true]`.
    ///
    /// Without an explicit format, the suffix and the filesystem decide:
    /// `.proto` is a file, `.binpb`/`.bin` an image, an existing directory a
    /// directory, and anything that parses as `registry/owner/name[:ref]` a
    /// module reference. Everything else falls back to a directory so that the
    /// resolver reports it as not found.
    pub fn parse(value: &str) -> Result<Self> {
        let (raw, options) = match value.split_once('#') {
            Some((raw, options)) => (raw, Some(options)),
            None => (value, None),
        };
        let raw = if raw.is_empty() { "." } else { raw };

        let mut format: Option<&str> = None;
        let mut include_package_files = false;
        for option in options.into_iter().flat_map(|o| o.split(',')) {
            let option = option.trim();
            if option.is_empty() {
                continue;
            }
            let Some((key, val)) = option.split_once('=') else {
                return Err(invalid(value, format!("option {option:?} must be key=value")));
            };
            match key {
                "format" => format = Some(val),
                "include_package_files" => {
                    include_package_files = val.parse().map_err(|_| {
                        invalid(value, format!("include_package_files must be true or false, got {val:?}"))
                    })?;
                }
                other => return Err(invalid(value, format!("unknown option {other:?}"))),
            }
        }

        let input = match format {
            Some("dir") => Self::Dir {
                path: raw.to_string(),
            },
            Some("protofile") => Self::ProtoFile {
                path: raw.to_string(),
                include_package_files,
            },
            Some("mod") => Self::Module {
                module_ref: raw.parse()?,
            },
            Some("binpb" | "bin") => Self::Image {
                path: raw.to_string(),
            },
            Some(other) => {
                return Err(invalid(
                    value,
                    format!("unknown format {other:?}, expected one of dir, protofile, mod, binpb"),
                ))
            }
            None => Self::infer(raw, include_package_files),
        };
        if include_package_files && !matches!(input, Self::ProtoFile { .. }) {
            return Err(invalid(value, "include_package_files only applies to .proto inputs".to_string()));
        }
        Ok(input)
    }

    fn infer(raw: &str, include_package_files: bool) -> Self {
        if raw.ends_with(".proto") {
            return Self::ProtoFile {
                path: raw.to_string(),
                include_package_files,
            };
        }
        if raw.ends_with(".binpb") || raw.ends_with(".bin") {
            return Self::Image {
                path: raw.to_string(),
            };
        }
        if Path::new(raw).is_dir() {
            return Self::Dir {
                path: raw.to_string(),
            };
        }
        match raw.parse::<ModuleRef>() {
            Ok(module_ref) => Self::Module { module_ref },
            Err(_) => Self::Dir {
                path: raw.to_string(),
            },
        }
    }
}

fn invalid(value: &str, reason: String) -> ModuleError {
    ModuleError::InvalidInput {
        value: value.to_string(),
        reason,
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir { path } | Self::Image { path } => f.write_str(path),
            Self::ProtoFile { path, .. } => f.write_str(path),
            Self::Module { module_ref } => write!(f, "{module_ref}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn infers_from_suffix_and_shape() {
        assert_eq!(
            InputRef::parse("a/b.proto").unwrap(),
            InputRef::ProtoFile {
                path: "a/b.proto".into(),
                include_package_files: false
            }
        );
        assert_eq!(
            InputRef::parse("out.binpb").unwrap(),
            InputRef::Image {
                path: "out.binpb".into()
            }
        );
        assert!(matches!(
            InputRef::parse("buf.build/acme/pet:main").unwrap(),
            InputRef::Module { module_ref } if module_ref.reference() == Some("main")
        ));
        assert_eq!(InputRef::parse("").unwrap(), InputRef::Dir { path: ".".into() });
    }

    #[test]
    fn explicit_format_wins() {
        assert_eq!(
            InputRef::parse("weird.proto#format=dir").unwrap(),
            InputRef::Dir {
                path: "weird.proto".into()
            }
        );
        assert_eq!(
            InputRef::parse("a/b.proto#include_package_files=true").unwrap(),
            InputRef::ProtoFile {
                path: "a/b.proto".into(),
                include_package_files: true
            }
        );
    }

    #[test]
    fn rejects_bad_options() {
        assert!(InputRef::parse("x#format=zip").is_err());
        assert!(InputRef::parse("x#nope").is_err());
        assert!(InputRef::parse("dir#include_package_files=true,format=dir").is_err());
    }
}
