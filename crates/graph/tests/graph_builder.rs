use async_trait::async_trait;
use pretty_assertions::assert_eq;
use prost_types::FileDescriptorProto;
use protokit_graph::{GraphBuilder, GraphError, GraphOutcome};
use protokit_image::{Builder, CompileOutput, Compiler, ImportResolver, PositionedError, RawFile};
use protokit_module::{
    Module, ModuleData, ModuleError, ModuleKey, ModuleKeyResolver, ModuleProvider, ModuleReader,
    ModuleRef,
};
use protokit_storage::{MemoryBucket, ReadBucket};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Compiler that only understands `import "x";` lines.
struct ImportLines;

impl ImportLines {
    fn visit(
        resolver: &dyn ImportResolver,
        path: &str,
        seen: &mut HashSet<String>,
        out: &mut CompileOutput,
    ) -> protokit_image::Result<()> {
        if !seen.insert(path.to_string()) {
            return Ok(());
        }
        let source = resolver.open(path)?.unwrap_or_default();
        let source = String::from_utf8_lossy(&source).into_owned();
        let mut dependency = Vec::new();
        for (i, line) in source.lines().enumerate() {
            let Some(rest) = line.trim().strip_prefix("import ") else {
                continue;
            };
            let import = rest.trim_end_matches(';').trim_matches('"').to_string();
            if resolver.open(&import)?.is_none() {
                out.errors.push(PositionedError {
                    path: Some(path.to_string()),
                    line: i as u32 + 1,
                    column: 1,
                    message: format!("Import \"{import}\" was not found or had errors."),
                });
                continue;
            }
            Self::visit(resolver, &import, seen, out)?;
            dependency.push(import);
        }
        let descriptor = FileDescriptorProto {
            name: Some(path.to_string()),
            dependency,
            ..Default::default()
        };
        out.files.push(RawFile {
            path: path.to_string(),
            bytes: prost::Message::encode_to_vec(&descriptor).into(),
        });
        Ok(())
    }
}

impl Compiler for ImportLines {
    fn compile(
        &self,
        paths: &[String],
        resolver: &dyn ImportResolver,
        _include_source_info: bool,
    ) -> protokit_image::Result<CompileOutput> {
        let mut out = CompileOutput::default();
        let mut seen = HashSet::new();
        for path in paths {
            Self::visit(resolver, path, &mut seen, &mut out)?;
        }
        Ok(out)
    }
}

struct Registry(Vec<ModuleData>);

#[async_trait]
impl ModuleKeyResolver for Registry {
    async fn resolve(&self, module_ref: &ModuleRef) -> protokit_module::Result<ModuleKey> {
        self.0
            .iter()
            .find(|data| {
                data.key.full_name() == module_ref.full_name()
                    && module_ref
                        .reference()
                        .map_or(true, |reference| reference == data.key.commit())
            })
            .map(|data| data.key.clone())
            .ok_or_else(|| ModuleError::ModuleNotFound(module_ref.to_string()))
    }
}

#[async_trait]
impl ModuleReader for Registry {
    async fn read(&self, key: &ModuleKey) -> protokit_module::Result<ModuleData> {
        self.0
            .iter()
            .find(|data| &data.key == key)
            .cloned()
            .ok_or_else(|| ModuleError::ModuleNotFound(key.to_string()))
    }
}

fn remote(key: &str, files: &[(&str, &str)], deps: &[&str]) -> ModuleData {
    ModuleData {
        key: key.parse().unwrap(),
        files: files
            .iter()
            .map(|(path, content)| (path.to_string(), content.as_bytes().to_vec()))
            .collect::<BTreeMap<_, _>>(),
        declared_deps: deps.iter().map(|d| d.parse().unwrap()).collect(),
    }
}

fn local(dir: &str, files: &[(&str, &str)]) -> Module {
    let bucket: Arc<dyn ReadBucket> =
        Arc::new(MemoryBucket::from_files(files.iter().copied()).unwrap());
    Module::local(dir, bucket)
}

fn deps(refs: &[&str]) -> Vec<ModuleRef> {
    refs.iter().map(|r| r.parse().unwrap()).collect()
}

fn graph_builder(registry: Vec<ModuleData>, workspace: &[Module]) -> GraphBuilder {
    let registry = Arc::new(Registry(registry));
    let provider = ModuleProvider::new(registry.clone(), registry)
        .with_local_modules(workspace.iter().cloned());
    GraphBuilder::new(
        Arc::new(Builder::new(Arc::new(ImportLines))),
        Arc::new(provider),
    )
}

fn registry() -> Vec<ModuleData> {
    vec![
        remote(
            "buf.build/acme/ext:c1",
            &[("ext/ext.proto", "import \"base/base.proto\";")],
            &["buf.build/acme/base:c9"],
        ),
        remote("buf.build/acme/ext:c2", &[("ext/ext.proto", "")], &[]),
        remote("buf.build/acme/base:c9", &[("base/base.proto", "")], &[]),
    ]
}

#[tokio::test]
async fn follows_workspace_siblings_and_fetched_modules() {
    let a = local(
        "a",
        &[(
            "a/a.proto",
            "import \"b/b.proto\";\nimport \"ext/ext.proto\";",
        )],
    )
    .with_declared_deps(deps(&["buf.build/acme/ext"]));
    let b = local("b", &[("b/b.proto", "")])
        .with_full_name(Some("buf.build/acme/b".parse().unwrap()));
    let workspace = [a, b];

    let graph = graph_builder(registry(), &workspace)
        .build(&workspace)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(
        graph.dot(),
        "digraph {\n\n  \
         \"root\" -> \"buf.build/acme/b\";\n  \
         \"root\" -> \"buf.build/acme/ext:c1\";\n  \
         \"buf.build/acme/ext:c1\" -> \"buf.build/acme/base:c9\";\n}\n"
    );
    let order: Vec<String> = graph
        .topological_sort()
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    let position = |node: &str| order.iter().position(|n| n == node).unwrap();
    assert_eq!(order.len(), 4);
    assert!(position("buf.build/acme/b") < position("root"));
    assert!(position("buf.build/acme/base:c9") < position("buf.build/acme/ext:c1"));
    assert!(position("buf.build/acme/ext:c1") < position("root"));
}

#[tokio::test]
async fn non_target_siblings_keep_their_own_edges() {
    let a = local("a", &[("a/a.proto", "import \"b/b.proto\";")]);
    let b = local("b", &[("b/b.proto", "import \"c/c.proto\";")])
        .with_full_name(Some("buf.build/acme/b".parse().unwrap()))
        .with_is_target(false);
    let c = local("c", &[("c/c.proto", "")])
        .with_full_name(Some("buf.build/acme/c".parse().unwrap()))
        .with_is_target(false);
    let workspace = [a, b, c];

    let graph = graph_builder(Vec::new(), &workspace)
        .build(&workspace)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(
        graph.dot(),
        "digraph {\n\n  \
         \"root\" -> \"buf.build/acme/b\";\n  \
         \"buf.build/acme/b\" -> \"buf.build/acme/c\";\n}\n"
    );
}

#[tokio::test]
async fn compile_errors_abandon_the_graph() {
    let a = local("a", &[("a/a.proto", "import \"missing.proto\";")]);
    let workspace = [a];
    let outcome = graph_builder(Vec::new(), &workspace)
        .build(&workspace)
        .await
        .unwrap();
    let GraphOutcome::Failed(annotations) = outcome else {
        panic!("expected annotations");
    };
    assert_eq!(
        annotations.to_string(),
        "a/a.proto:1:1:Import \"missing.proto\" was not found or had errors."
    );
}

#[tokio::test]
async fn divergent_commits_are_fatal() {
    let a = local("a", &[("a/a.proto", "")]).with_declared_deps(deps(&["buf.build/acme/ext:c1"]));
    let b = local("b", &[("b/b.proto", "")]).with_declared_deps(deps(&["buf.build/acme/ext:c2"]));
    let workspace = [a, b];
    let err = graph_builder(registry(), &workspace)
        .build(&workspace)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, GraphError::DivergentCommits { name, first, second }
            if name == "buf.build/acme/ext" && first == "c1" && second == "c2"),
        "{err}"
    );
}

#[tokio::test]
async fn module_level_cycles_name_the_chain() {
    let a = local("a", &[("a/x.proto", "import \"b/y.proto\";"), ("a/w.proto", "")]);
    let b = local("b", &[("b/y.proto", ""), ("b/z.proto", "import \"a/w.proto\";")]);
    let workspace = [a, b];
    let err = graph_builder(Vec::new(), &workspace)
        .build(&workspace)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cycle detected: root-2 -> root -> root-2");
}
