use crate::template::Strategy;
use bytes::Bytes;
use prost::encoding::{encode_key, encode_varint, WireType};
use prost::Message;
use prost_types::compiler::CodeGeneratorRequest;
use protokit_image::Image;
use protokit_storage::normalpath;
use std::collections::{BTreeMap, HashSet};

/// `CodeGeneratorRequest.proto_file`.
const PROTO_FILE_FIELD: u32 = 15;

/// One encoded `CodeGeneratorRequest`.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginRequest {
    pub files_to_generate: Vec<String>,
    pub encoded: Bytes,
}

/// Requests for the target files of `image`, split per `strategy`.
/// Directory requests come out in directory order; empty images give none.
pub fn build_requests(image: &Image, strategy: Strategy, parameter: Option<&str>) -> Vec<PluginRequest> {
    let targets: Vec<String> = image.target_files().map(|f| f.path().to_string()).collect();
    if targets.is_empty() {
        return Vec::new();
    }
    match strategy {
        Strategy::All => vec![encode_request(image, targets, parameter)],
        Strategy::Directory => {
            let mut by_dir: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for path in targets {
                by_dir.entry(normalpath::dir(&path)).or_default().push(path);
            }
            by_dir
                .into_values()
                .map(|files| encode_request(image, files, parameter))
                .collect()
        }
    }
}

/// The descriptors are appended as raw bytes so custom options reach the
/// plugin intact; `proto_file` lists `files` and their transitive imports in
/// image order.
fn encode_request(image: &Image, files: Vec<String>, parameter: Option<&str>) -> PluginRequest {
    let mut needed: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = files.iter().map(String::as_str).collect();
    while let Some(path) = stack.pop() {
        if !needed.insert(path) {
            continue;
        }
        if let Some(file) = image.file(path) {
            stack.extend(file.imports().iter().map(String::as_str));
        }
    }

    let header = CodeGeneratorRequest {
        file_to_generate: files.clone(),
        parameter: parameter.map(str::to_string),
        ..Default::default()
    };
    let mut encoded = header.encode_to_vec();
    for file in image.files().iter().filter(|f| needed.contains(f.path())) {
        encode_key(PROTO_FILE_FIELD, WireType::LengthDelimited, &mut encoded);
        encode_varint(file.raw().len() as u64, &mut encoded);
        encoded.extend_from_slice(file.raw());
    }
    PluginRequest {
        files_to_generate: files,
        encoded: encoded.into(),
    }
}
