use crate::error::{GenerateError, Result};
use prost_types::compiler::CodeGeneratorResponse;
use protokit_storage::{normalpath, WriteBucket};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub content: Vec<u8>,
    /// Plugin that created the file.
    pub producer: String,
}

/// Everything a generation run produced, held in memory until the run has
/// completed without errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedOutput {
    files: BTreeMap<String, GeneratedFile>,
}

impl GeneratedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &BTreeMap<String, GeneratedFile> {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|file| file.content.as_slice())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Add the files of one plugin response under `out`.
    ///
    /// A file with an insertion point edits a file generated earlier in the
    /// run; a file without a name continues the previous one. Producing a
    /// path that already exists is an error naming both producers.
    pub fn add_response(
        &mut self,
        plugin: &str,
        out: &str,
        response: CodeGeneratorResponse,
    ) -> Result<()> {
        if let Some(message) = response.error.filter(|message| !message.is_empty()) {
            return Err(GenerateError::Plugin {
                plugin: plugin.to_string(),
                message,
            });
        }
        let mut previous: Option<String> = None;
        for file in response.file {
            let name = file.name.unwrap_or_default();
            let content = file.content.unwrap_or_default();
            let point = file.insertion_point.unwrap_or_default();

            if name.is_empty() {
                let target = previous
                    .as_ref()
                    .and_then(|path| self.files.get_mut(path))
                    .ok_or_else(|| GenerateError::InvalidOutputPath {
                        plugin: plugin.to_string(),
                        path: name.clone(),
                    })?;
                target.content.extend_from_slice(content.as_bytes());
                continue;
            }

            let path = output_path(plugin, out, &name)?;
            if !point.is_empty() {
                self.insert(plugin, &path, &point, content.as_bytes())?;
                previous = None;
                continue;
            }
            if let Some(existing) = self.files.get(&path) {
                return Err(GenerateError::DuplicateOutput {
                    path,
                    first: existing.producer.clone(),
                    second: plugin.to_string(),
                });
            }
            self.files.insert(
                path.clone(),
                GeneratedFile {
                    content: content.into_bytes(),
                    producer: plugin.to_string(),
                },
            );
            previous = Some(path);
        }
        Ok(())
    }

    /// Insert `content` above the line holding the insertion point marker,
    /// indented like that line.
    fn insert(&mut self, plugin: &str, path: &str, point: &str, content: &[u8]) -> Result<()> {
        let target = self
            .files
            .get_mut(path)
            .ok_or_else(|| GenerateError::InsertionTargetMissing {
                plugin: plugin.to_string(),
                path: path.to_string(),
            })?;
        let marker = format!("@@protoc_insertion_point({point})");
        let position = find(&target.content, marker.as_bytes()).ok_or_else(|| {
            GenerateError::InsertionPointNotFound {
                plugin: plugin.to_string(),
                path: path.to_string(),
                point: point.to_string(),
            }
        })?;
        let line_start = target.content[..position]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let indent: Vec<u8> = target.content[line_start..]
            .iter()
            .take_while(|&&b| b == b' ' || b == b'\t')
            .copied()
            .collect();

        let mut inserted = Vec::with_capacity(content.len() + indent.len());
        for line in content.split_inclusive(|&b| b == b'\n') {
            if line != b"\n" {
                inserted.extend_from_slice(&indent);
            }
            inserted.extend_from_slice(line);
        }
        if !inserted.is_empty() && !inserted.ends_with(b"\n") {
            inserted.push(b'\n');
        }
        target.content.splice(line_start..line_start, inserted);
        Ok(())
    }

    /// Write every file through `bucket`. Each file becomes visible only
    /// once it is completely written.
    pub fn write_to(&self, bucket: &dyn WriteBucket) -> Result<()> {
        for (path, file) in &self.files {
            let mut object = bucket.put(path)?;
            object
                .write_all(&file.content)
                .map_err(|err| GenerateError::io(path.clone(), err))?;
            object.commit()?;
            log::debug!("wrote {path} ({} bytes, {})", file.content.len(), file.producer);
        }
        Ok(())
    }
}

fn output_path(plugin: &str, out: &str, name: &str) -> Result<String> {
    let invalid = || GenerateError::InvalidOutputPath {
        plugin: plugin.to_string(),
        path: name.to_string(),
    };
    let name = normalpath::normalize_and_validate(name).map_err(|_| invalid())?;
    if name == "." {
        return Err(invalid());
    }
    Ok(normalpath::join(out, &name))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
