use crate::error::{ImageError, Result};
use crate::image::{Image, ImageFile};
use std::collections::HashMap;

/// Merge per-module images into one.
///
/// A path present in several images must carry byte-identical descriptors;
/// the copy that is a target wins over one that is only an import. The
/// result is re-sorted so that imports precede importers, keeping first-seen
/// order wherever the imports allow it.
pub fn merge_images(images: &[Image]) -> Result<Image> {
    let mut files: Vec<ImageFile> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for image in images {
        for file in image.files() {
            match positions.get(file.path()) {
                Some(&i) => {
                    let existing = &files[i];
                    if existing.raw() != file.raw() {
                        return Err(ImageError::MergeConflict {
                            path: file.path().to_string(),
                            first: existing.origin(),
                            second: file.origin(),
                        });
                    }
                    if existing.is_import() && !file.is_import() {
                        files[i] = file.clone();
                    }
                }
                None => {
                    positions.insert(file.path().to_string(), files.len());
                    files.push(file.clone());
                }
            }
        }
    }
    Image::new(topological_order(files, &positions)?)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

fn topological_order(
    files: Vec<ImageFile>,
    positions: &HashMap<String, usize>,
) -> Result<Vec<ImageFile>> {
    let mut marks = vec![Mark::Unvisited; files.len()];
    let mut order = Vec::with_capacity(files.len());
    let mut chain = Vec::new();
    for i in 0..files.len() {
        visit(i, &files, positions, &mut marks, &mut order, &mut chain)?;
    }
    let mut slots: Vec<Option<ImageFile>> = files.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

fn visit(
    i: usize,
    files: &[ImageFile],
    positions: &HashMap<String, usize>,
    marks: &mut [Mark],
    order: &mut Vec<usize>,
    chain: &mut Vec<String>,
) -> Result<()> {
    match marks[i] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let path = files[i].path().to_string();
            let start = chain.iter().position(|p| *p == path).unwrap_or(0);
            let mut cycle: Vec<String> = chain[start..].to_vec();
            cycle.push(path);
            return Err(ImageError::ImportCycle(cycle));
        }
        Mark::Unvisited => {}
    }
    marks[i] = Mark::InProgress;
    chain.push(files[i].path().to_string());
    for import in files[i].imports() {
        if let Some(&j) = positions.get(import) {
            visit(j, files, positions, marks, order, chain)?;
        }
    }
    chain.pop();
    marks[i] = Mark::Done;
    order.push(i);
    Ok(())
}
