use crate::file_info::FileInfo;
use crate::INPUT_PLACEHOLDER;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Annotation type used for compiler-reported problems.
pub const ANNOTATION_TYPE_COMPILE: &str = "COMPILE";

/// A single diagnostic, optionally tied to a file location.
///
/// Lines and columns are 1-based; zero means "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileAnnotation {
    file_info: Option<FileInfo>,
    start_line: u32,
    start_column: u32,
    end_line: u32,
    end_column: u32,
    type_string: String,
    message: String,
    plugin_name: Option<String>,
    policy_name: Option<String>,
}

impl FileAnnotation {
    pub fn new(
        file_info: Option<FileInfo>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        type_string: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file_info,
            start_line,
            start_column,
            end_line,
            end_column,
            type_string: type_string.into(),
            message: message.into(),
            plugin_name: None,
            policy_name: None,
        }
    }

    /// Annotation reported by an external check plugin.
    #[must_use]
    pub fn with_plugin_name(mut self, plugin_name: impl Into<String>) -> Self {
        self.plugin_name = Some(plugin_name.into()).filter(|name| !name.is_empty());
        self
    }

    /// Annotation reported on behalf of a named policy.
    #[must_use]
    pub fn with_policy_name(mut self, policy_name: impl Into<String>) -> Self {
        self.policy_name = Some(policy_name.into()).filter(|name| !name.is_empty());
        self
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.file_info.as_ref()
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn start_column(&self) -> u32 {
        self.start_column
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn end_column(&self) -> u32 {
        self.end_column
    }

    pub fn type_string(&self) -> &str {
        &self.type_string
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin_name.as_deref()
    }

    pub fn policy_name(&self) -> Option<&str> {
        self.policy_name.as_deref()
    }

    /// External path, or `<input>` when the annotation has no file.
    pub fn display_path(&self) -> &str {
        self.file_info
            .as_ref()
            .map(FileInfo::external_path)
            .unwrap_or(INPUT_PLACEHOLDER)
    }

    /// ` (plugin, policy)`, ` (plugin)`, ` (policy)` or empty.
    pub(crate) fn provenance_suffix(&self) -> String {
        match (self.plugin_name(), self.policy_name()) {
            (Some(plugin), Some(policy)) => format!(" ({plugin}, {policy})"),
            (Some(plugin), None) => format!(" ({plugin})"),
            (None, Some(policy)) => format!(" ({policy})"),
            (None, None) => String::new(),
        }
    }

    fn sort_path(&self) -> &str {
        self.file_info
            .as_ref()
            .map(FileInfo::external_path)
            .unwrap_or("")
    }

    fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            external_path: self.sort_path(),
            start_line: self.start_line,
            start_column: self.start_column,
            end_line: self.end_line,
            end_column: self.end_column,
            type_string: &self.type_string,
            message: &self.message,
            plugin_name: self.plugin_name.as_deref(),
            policy_name: self.policy_name.as_deref(),
        }
    }

    fn sort_cmp(&self, other: &Self) -> Ordering {
        self.sort_path()
            .cmp(other.sort_path())
            .then(self.start_line.cmp(&other.start_line))
            .then(self.start_column.cmp(&other.start_column))
            .then(self.type_string.cmp(&other.type_string))
            .then(self.message.cmp(&other.message))
            .then(self.end_line.cmp(&other.end_line))
            .then(self.end_column.cmp(&other.end_column))
            .then(self.plugin_name.cmp(&other.plugin_name))
            .then(self.policy_name.cmp(&other.policy_name))
    }
}

/// Text form: `path:line:col:message`, with 0 lines/columns shown as 1.
impl fmt::Display for FileAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.start_line.max(1);
        let column = self.start_column.max(1);
        let message = if !self.message.is_empty() {
            self.message.as_str()
        } else if !self.type_string.is_empty() {
            self.type_string.as_str()
        } else {
            "FAILURE"
        };
        write!(
            f,
            "{}:{}:{}:{}{}",
            self.display_path(),
            line,
            column,
            message,
            self.provenance_suffix()
        )
    }
}

#[derive(Hash, PartialEq, Eq)]
struct DedupKey<'a> {
    external_path: &'a str,
    start_line: u32,
    start_column: u32,
    end_line: u32,
    end_column: u32,
    type_string: &'a str,
    message: &'a str,
    plugin_name: Option<&'a str>,
    policy_name: Option<&'a str>,
}

/// Deduplicated, stably sorted, non-empty collection of annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAnnotationSet {
    file_annotations: Vec<FileAnnotation>,
}

impl FileAnnotationSet {
    /// Returns `None` when no annotation survives deduplication.
    pub fn new(annotations: impl IntoIterator<Item = FileAnnotation>) -> Option<Self> {
        let annotations: Vec<FileAnnotation> = annotations.into_iter().collect();
        let mut unique = Vec::with_capacity(annotations.len());
        {
            let mut seen = HashSet::new();
            for (idx, annotation) in annotations.iter().enumerate() {
                if seen.insert(annotation.dedup_key()) {
                    unique.push(idx);
                }
            }
        }
        if unique.is_empty() {
            return None;
        }
        let mut slots: Vec<Option<FileAnnotation>> = annotations.into_iter().map(Some).collect();
        let mut file_annotations: Vec<FileAnnotation> = unique
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect();
        file_annotations.sort_by(FileAnnotation::sort_cmp);
        Some(Self { file_annotations })
    }

    /// Combine several sets (or none) into one.
    pub fn merge(sets: impl IntoIterator<Item = FileAnnotationSet>) -> Option<Self> {
        Self::new(sets.into_iter().flat_map(Self::into_file_annotations))
    }

    pub fn file_annotations(&self) -> &[FileAnnotation] {
        &self.file_annotations
    }

    pub fn into_file_annotations(self) -> Vec<FileAnnotation> {
        self.file_annotations
    }

    pub fn len(&self) -> usize {
        self.file_annotations.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.file_annotations.is_empty()
    }
}

impl fmt::Display for FileAnnotationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, annotation) in self.file_annotations.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{annotation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FileAnnotationSet {}
