use pretty_assertions::assert_eq;
use protokit_image::{
    image_module_dependencies, BuildOutcome, Builder, Image, ImageModuleDependency, ProtocCompiler,
};
use protokit_module::Module;
use protokit_storage::{MemoryBucket, ReadBucket};
use std::sync::Arc;

fn module(dir: &str, files: &[(&str, &str)]) -> Module {
    let bucket: Arc<dyn ReadBucket> =
        Arc::new(MemoryBucket::from_files(files.iter().copied()).unwrap());
    Module::local(dir, bucket)
}

fn builder() -> Builder {
    Builder::new(Arc::new(ProtocCompiler::vendored().unwrap()))
}

#[test]
fn builds_across_modules_with_well_known_types() {
    let money = module(
        "money",
        &[(
            "acme/money/v1/money.proto",
            "syntax = \"proto3\";\npackage acme.money.v1;\nmessage Money { int64 units = 1; }\n",
        )],
    );
    let pet = module(
        "pet",
        &[(
            "acme/pet/v1/pet.proto",
            "syntax = \"proto3\";\n\
             package acme.pet.v1;\n\
             import \"acme/money/v1/money.proto\";\n\
             import \"google/protobuf/timestamp.proto\";\n\
             message Pet {\n  acme.money.v1.Money price = 1;\n  google.protobuf.Timestamp born = 2;\n}\n",
        )],
    );

    let image = builder()
        .build(&pet, &[money])
        .unwrap()
        .into_result()
        .unwrap();
    let paths: Vec<(&str, bool)> = image
        .files()
        .iter()
        .map(|f| (f.path(), f.is_import()))
        .collect();
    assert_eq!(paths.last(), Some(&("acme/pet/v1/pet.proto", false)));
    assert!(paths.contains(&("acme/money/v1/money.proto", true)));
    assert!(paths.contains(&("google/protobuf/timestamp.proto", true)));

    let decoded = Image::from_bytes(&image.to_bytes()).unwrap();
    assert_eq!(decoded.len(), image.len());
    assert_eq!(
        image_module_dependencies(&image, "pet").unwrap(),
        vec![ImageModuleDependency::Direct {
            opaque_id: "money".into()
        }]
    );
}

#[test]
fn syntax_errors_are_annotations() {
    let broken = module(
        "broken",
        &[("broken.proto", "syntax = \"proto3\";\nmessage Broken {\n  int32 id = ;\n}\n")],
    );
    let BuildOutcome::Failed(set) = builder().build(&broken, &[]).unwrap() else {
        panic!("expected annotations");
    };
    let annotation = &set.file_annotations()[0];
    assert_eq!(
        annotation.file_info().map(|info| info.path()),
        Some("broken.proto")
    );
    assert_eq!(annotation.start_line(), 3);
}

#[test]
fn scratch_directories_are_removed_after_compiling() {
    let scratch = tempfile::tempdir().unwrap();
    let compiler = ProtocCompiler::vendored()
        .unwrap()
        .with_scratch_root(scratch.path());
    let builder = Builder::new(Arc::new(compiler));

    let ok = module(
        "ok",
        &[("ok.proto", "syntax = \"proto3\";\nmessage Ok {}\n")],
    );
    assert!(builder.build(&ok, &[]).unwrap().into_result().is_ok());
    let broken = module("broken", &[("broken.proto", "syntax = \"proto3\";\nmessage {\n")]);
    assert!(builder.build(&broken, &[]).unwrap().into_result().is_err());

    let left: Vec<_> = std::fs::read_dir(scratch.path()).unwrap().collect();
    assert!(left.is_empty(), "{left:?}");
}
