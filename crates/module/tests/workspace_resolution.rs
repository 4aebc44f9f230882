use pretty_assertions::assert_eq;
use protokit_module::{
    resolve_controlling_workspace, resolve_modules, ModuleError, ModuleProvider, NoRegistry,
    WorkspaceKind,
};
use protokit_storage::{OsBucket, ReadBucket};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn legacy_workspace_with_named_modules_and_locks() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "buf.work.yaml", "version: v1\ndirectories:\n  - pet\n  - money\n");
    write(
        root,
        "pet/buf.yaml",
        "version: v1\nname: buf.build/acme/pet\ndeps:\n  - buf.build/acme/money\n  - buf.build/googleapis/googleapis\n",
    );
    write(
        root,
        "pet/buf.lock",
        "version: v1\ndeps:\n  - remote: buf.build\n    owner: googleapis\n    repository: googleapis\n    commit: g1\n",
    );
    write(root, "pet/acme/pet/v1/pet.proto", "syntax = \"proto3\";");
    write(root, "money/buf.yaml", "version: v1\nname: buf.build/acme/money\n");
    write(root, "money/acme/money/v1/money.proto", "syntax = \"proto3\";");

    let bucket: Arc<dyn ReadBucket> = Arc::new(OsBucket::new(root).unwrap());
    let workspace = resolve_controlling_workspace(bucket.as_ref(), "pet")
        .unwrap()
        .unwrap();
    assert_eq!(workspace.kind(), WorkspaceKind::BufWork);

    let set = resolve_modules(Arc::clone(&bucket), Some(&workspace), "pet", &[], &[]).unwrap();
    let pet = set.get_by_opaque_id("pet").unwrap();
    assert!(pet.is_target());
    let deps: Vec<String> = pet.declared_deps().iter().map(|d| d.to_string()).collect();
    assert_eq!(
        deps,
        vec![
            "buf.build/acme/money",
            "buf.build/googleapis/googleapis:g1"
        ]
    );
    assert!(!set.get_by_opaque_id("money").unwrap().is_target());
}

#[test]
fn subdirectory_input_narrows_targets() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "buf.yaml", "version: v2\nmodules:\n  - path: proto\n");
    write(root, "proto/a/one.proto", "");
    write(root, "proto/b/two.proto", "");

    let bucket: Arc<dyn ReadBucket> = Arc::new(OsBucket::new(root).unwrap());
    let workspace = resolve_controlling_workspace(bucket.as_ref(), "proto/a").unwrap();
    let set = resolve_modules(bucket, workspace.as_ref(), "proto/a", &[], &[]).unwrap();
    let module = set.get_by_opaque_id("proto").unwrap();
    let targets: Vec<String> = module
        .target_files()
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(targets, vec!["a/one.proto"]);
    assert_eq!(module.files().unwrap().len(), 2);
}

#[test]
fn explicit_paths_are_relative_to_the_input() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "buf.yaml", "version: v2\nmodules:\n  - path: proto\n");
    write(root, "proto/a/one.proto", "");

    let bucket: Arc<dyn ReadBucket> = Arc::new(OsBucket::new(root).unwrap());
    let workspace = resolve_controlling_workspace(bucket.as_ref(), ".").unwrap();
    let err = resolve_modules(
        Arc::clone(&bucket),
        workspace.as_ref(),
        ".",
        &strings(&["proto/a/missing.proto"]),
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::InputNotFound(path) if path == "proto/a/missing.proto"));

    let set = resolve_modules(
        bucket,
        workspace.as_ref(),
        ".",
        &strings(&["proto/a/one.proto"]),
        &[],
    )
    .unwrap();
    assert_eq!(
        set.modules()[0].targeting().target_paths(),
        &["a/one.proto".to_string()]
    );
}

#[tokio::test]
async fn provider_prefers_workspace_modules() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "buf.yaml",
        "version: v2\nmodules:\n  - path: a\n    name: buf.build/acme/a\n  - path: b\n",
    );
    write(root, "a/a.proto", "");
    write(root, "b/b.proto", "");

    let bucket: Arc<dyn ReadBucket> = Arc::new(OsBucket::new(root).unwrap());
    let workspace = resolve_controlling_workspace(bucket.as_ref(), "b").unwrap();
    let set = resolve_modules(bucket, workspace.as_ref(), "b", &[], &[]).unwrap();
    let provider = ModuleProvider::new(Arc::new(NoRegistry), Arc::new(NoRegistry))
        .with_local_modules(set.modules().to_vec());

    let found = provider
        .get_module(&"buf.build/acme/a".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(found.opaque_id(), "a");
    assert!(provider
        .get_module(&"buf.build/acme/zzz".parse().unwrap())
        .await
        .unwrap_err()
        .is_not_found());
}
