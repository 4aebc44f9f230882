use crate::annotation::{FileAnnotation, FileAnnotationSet};
use crate::error::{AnalysisError, Result};
use crate::{gitlab, junit, render};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Output encodings for annotations. The selector strings are part of the
/// CLI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
    Msvs,
    Junit,
    GithubActions,
    GitlabCodeQuality,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::Text,
        Format::Json,
        Format::Msvs,
        Format::Junit,
        Format::GithubActions,
        Format::GitlabCodeQuality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Text => "text",
            Format::Json => "json",
            Format::Msvs => "msvs",
            Format::Junit => "junit",
            Format::GithubActions => "github-actions",
            Format::GitlabCodeQuality => "gitlab-code-quality",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = AnalysisError;

    fn from_str(raw: &str) -> Result<Self> {
        let wanted = raw.trim().to_ascii_lowercase();
        Format::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Format::ALL.iter().map(|f| f.as_str()).collect();
                AnalysisError::UnknownFormat(raw.to_string(), known.join(", "))
            })
    }
}

/// Render annotations as given; callers normally pass a set's sorted slice.
pub fn print_file_annotations(
    writer: &mut dyn Write,
    annotations: &[FileAnnotation],
    format: Format,
) -> Result<()> {
    match format {
        Format::Text => render::print_text(writer, annotations),
        Format::Json => render::print_json(writer, annotations),
        Format::Msvs => render::print_msvs(writer, annotations),
        Format::Junit => junit::print_junit(writer, annotations),
        Format::GithubActions => render::print_github_actions(writer, annotations),
        Format::GitlabCodeQuality => gitlab::print_gitlab_code_quality(writer, annotations),
    }
}

pub fn print_file_annotation_set(
    writer: &mut dyn Write,
    set: &FileAnnotationSet,
    format: Format,
) -> Result<()> {
    print_file_annotations(writer, set.file_annotations(), format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_round_trip() {
        for format in Format::ALL {
            assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
        }
        assert_eq!(" JSON ".parse::<Format>().unwrap(), Format::Json);
    }

    #[test]
    fn unknown_selector_lists_choices() {
        let err = "yaml".parse::<Format>().unwrap_err().to_string();
        assert!(err.contains("github-actions"), "{err}");
    }
}
