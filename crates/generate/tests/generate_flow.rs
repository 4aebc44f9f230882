use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use prost::Message;
use prost_types::compiler::code_generator_response::File;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::FileDescriptorProto;
use protokit_analysis::FileInfo;
use protokit_generate::{
    parse_buf_gen_yaml, GenerateError, Generator, PluginConfig, PluginRunner, BUF_GEN_YAML,
};
use protokit_image::{Image, ImageFile};
use protokit_storage::{MemoryBucket, ReadBucket};
use std::sync::Arc;
use std::time::Duration;

/// `listing` writes one `<file>.txt` per file to generate, with a marker;
/// `extra` fills the marker; `summary` always writes `summary.txt`.
struct FakeRunner;

#[async_trait]
impl PluginRunner for FakeRunner {
    async fn run(
        &self,
        plugin: &PluginConfig,
        request: Bytes,
    ) -> protokit_generate::Result<CodeGeneratorResponse> {
        let request = CodeGeneratorRequest::decode(request)?;
        let mut files = Vec::new();
        for path in &request.file_to_generate {
            // Later directories finish first.
            if path.starts_with("a/") {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let file = match plugin.name.as_str() {
                "listing" => File {
                    name: Some(format!("{path}.txt")),
                    content: Some(format!(
                        "{path} with {} descriptors\n// @@protoc_insertion_point(extra)\n",
                        request.proto_file.len()
                    )),
                    ..Default::default()
                },
                "extra" => File {
                    name: Some(format!("{path}.txt")),
                    insertion_point: Some("extra".into()),
                    content: Some(format!("param={}", request.parameter.clone().unwrap_or_default())),
                    ..Default::default()
                },
                _ => File {
                    name: Some("summary.txt".into()),
                    content: Some(path.clone()),
                    ..Default::default()
                },
            };
            files.push(file);
        }
        Ok(CodeGeneratorResponse {
            file: files,
            ..Default::default()
        })
    }
}

fn image() -> Image {
    let file = |path: &str, imports: &[&str]| {
        let raw = FileDescriptorProto {
            name: Some(path.to_string()),
            dependency: imports.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
        .encode_to_vec();
        ImageFile::new(FileInfo::new(path, path), raw).unwrap()
    };
    Image::new(vec![file("a/a.proto", &[]), file("b/b.proto", &["a/a.proto"])]).unwrap()
}

#[tokio::test]
async fn plugins_run_in_order_and_insert_into_earlier_output() {
    let template = parse_buf_gen_yaml(
        BUF_GEN_YAML,
        b"version: v1\nplugins:\n  - plugin: listing\n    out: gen\n  - plugin: extra\n    out: gen\n    opt: x=1\n",
    )
    .unwrap();
    let output = Generator::new(Arc::new(FakeRunner))
        .generate(&image(), &template)
        .await
        .unwrap();
    let paths: Vec<&str> = output.files().keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["gen/a/a.proto.txt", "gen/b/b.proto.txt"]);
    assert_eq!(
        String::from_utf8(output.get("gen/b/b.proto.txt").unwrap().to_vec()).unwrap(),
        "b/b.proto with 2 descriptors\nparam=x=1\n// @@protoc_insertion_point(extra)\n"
    );

    let bucket = MemoryBucket::new();
    output.write_to(&bucket).unwrap();
    assert_eq!(bucket.list(".").unwrap().len(), 2);
}

#[tokio::test]
async fn same_file_from_two_directory_requests_is_rejected() {
    let template = parse_buf_gen_yaml(
        BUF_GEN_YAML,
        b"version: v1\nplugins:\n  - plugin: summary\n    out: gen\n",
    )
    .unwrap();
    let err = Generator::new(Arc::new(FakeRunner))
        .generate(&image(), &template)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, GenerateError::DuplicateOutput { path, .. } if path == "gen/summary.txt"),
        "{err}"
    );

    let all = parse_buf_gen_yaml(
        BUF_GEN_YAML,
        b"version: v1\nplugins:\n  - plugin: summary\n    out: gen\n    strategy: all\n",
    )
    .unwrap();
    let err = Generator::new(Arc::new(FakeRunner))
        .generate(&image(), &all)
        .await
        .unwrap_err();
    assert!(matches!(err, GenerateError::DuplicateOutput { .. }), "{err}");
}
