use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const PET: &str = "syntax = \"proto3\";\n\
package acme.pet.v1;\n\
import \"google/protobuf/timestamp.proto\";\n\
message Pet {\n\
  string name = 1;\n\
  google.protobuf.Timestamp born = 2;\n\
}\n";

const SHOP: &str = "syntax = \"proto3\";\n\
package acme.pet.v1;\n\
import \"acme/pet/v1/pet.proto\";\n\
message Shop { repeated Pet pets = 1; }\n";

#[allow(deprecated)]
fn protokit(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("protokit").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("PROTOKIT_REGISTRY_DIR")
        .env("PROTOKIT_CACHE_DIR", workdir.join(".cache"));
    cmd
}

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup_module() -> TempDir {
    let temp = tempdir().unwrap();
    write(temp.path(), "proto/acme/pet/v1/pet.proto", PET);
    write(temp.path(), "proto/acme/pet/v1/shop.proto", SHOP);
    temp
}

#[test]
fn build_writes_an_image() {
    let temp = setup_module();
    protokit(temp.path())
        .args(["build", "proto", "-o", "out/image.binpb"])
        .assert()
        .success();
    let image = fs::read(temp.path().join("out/image.binpb")).unwrap();
    assert!(!image.is_empty());

    // The image is itself an input.
    let output = protokit(temp.path())
        .args([
            "build",
            "out/image.binpb",
            "--path",
            "acme/pet/v1/pet.proto",
            "--exclude-imports",
            "--as-file-descriptor-set",
            "-o",
            "-",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(contains(&output.stdout, b"acme/pet/v1/pet.proto"));
    assert!(!contains(&output.stdout, b"acme/pet/v1/shop.proto"));
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn compile_errors_exit_with_annotations() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "proto/broken.proto",
        "syntax = \"proto3\";\nmessage Broken {\n  int32 id = ;\n}\n",
    );
    protokit(temp.path())
        .args(["build", "proto"])
        .assert()
        .code(100)
        .stdout(predicate::str::contains("broken.proto:3:"));

    protokit(temp.path())
        .args(["build", "proto", "--error-format", "json"])
        .assert()
        .code(100)
        .stdout(predicate::str::contains("\"path\""));
}

#[test]
fn unknown_error_formats_are_rejected() {
    let temp = setup_module();
    protokit(temp.path())
        .args(["build", "proto", "--error-format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("yaml"));
}

#[test]
fn ls_files_lists_targets() {
    let temp = setup_module();
    protokit(temp.path())
        .args(["ls-files", "proto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("proto/acme/pet/v1/pet.proto"))
        .stdout(predicate::str::contains("proto/acme/pet/v1/shop.proto"));

    protokit(temp.path())
        .args(["ls-files", "proto", "--path", "acme/pet/v1/shop.proto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pet.proto").not());
}

#[test]
fn conflicting_targeting_fails() {
    let temp = setup_module();
    protokit(temp.path())
        .args(["build", "proto", "--path", "acme", "--exclude-path", "acme"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "cannot set the same path for both --path and --exclude-path",
        ));

    protokit(temp.path())
        .args(["build", "missing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing: input not found"));
}

#[test]
fn dep_graph_prints_workspace_edges() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(root, "buf.work.yaml", "version: v1\ndirectories:\n  - a\n  - b\n");
    write(root, "a/buf.yaml", "version: v1\nname: buf.build/acme/a\n");
    write(
        root,
        "a/acme/a/v1/a.proto",
        "syntax = \"proto3\";\npackage acme.a.v1;\nmessage A {}\n",
    );
    write(
        root,
        "b/buf.yaml",
        "version: v1\nname: buf.build/acme/b\ndeps:\n  - buf.build/acme/a\n",
    );
    write(
        root,
        "b/acme/b/v1/b.proto",
        "syntax = \"proto3\";\npackage acme.b.v1;\nimport \"acme/a/v1/a.proto\";\nmessage B { acme.a.v1.A a = 1; }\n",
    );

    protokit(root)
        .args(["dep", "graph", "."])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains(
            "\"buf.build/acme/b\" -> \"buf.build/acme/a\";",
        ));
}

#[cfg(unix)]
#[test]
fn generate_runs_local_plugins() {
    use std::os::unix::fs::PermissionsExt;

    let temp = setup_module();
    let root = temp.path();
    // CodeGeneratorResponse { file: [{ name: "out.txt", content: "hi" }] }
    let plugin = root.join("protoc-gen-hello");
    fs::write(
        &plugin,
        "#!/bin/sh\ncat > /dev/null\nprintf '\\172\\015\\012\\007out.txt\\172\\002hi'\n",
    )
    .unwrap();
    fs::set_permissions(&plugin, fs::Permissions::from_mode(0o755)).unwrap();
    write(
        root,
        "buf.gen.yaml",
        &format!(
            "version: v1\nplugins:\n  - name: hello\n    path: {}\n    out: gen\n",
            plugin.display()
        ),
    );

    protokit(root)
        .args(["generate", "proto", "--template", "buf.gen.yaml", "--output", "out"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(root.join("out/gen/out.txt")).unwrap(), "hi");
}
