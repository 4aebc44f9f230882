use crate::closure::resolve_dependency_closure;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::types::{GraphOutcome, Node};
use protokit_analysis::FileAnnotationSet;
use protokit_image::{image_module_dependencies, BuildOutcome, Builder, ImageModuleDependency};
use protokit_module::{Module, ModuleKey, ModuleProvider, Targeting};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The part of the image builder the graph needs: compile one module
/// against a set of context modules.
pub trait ModuleImageBuilder: Send + Sync {
    fn build(&self, module: &Module, context: &[Module]) -> protokit_image::Result<BuildOutcome>;
}

impl ModuleImageBuilder for Builder {
    fn build(&self, module: &Module, context: &[Module]) -> protokit_image::Result<BuildOutcome> {
        Builder::build(self, module, context)
    }
}

/// Builds the module dependency graph by compiling every module and
/// following the modules its imports resolve to.
#[derive(Clone)]
pub struct GraphBuilder {
    image_builder: Arc<dyn ModuleImageBuilder>,
    provider: Arc<ModuleProvider>,
}

impl GraphBuilder {
    pub fn new(image_builder: Arc<dyn ModuleImageBuilder>, provider: Arc<ModuleProvider>) -> Self {
        Self {
            image_builder,
            provider,
        }
    }

    /// Graph rooted at `modules`. Compile diagnostics from any module stop
    /// the walk and are returned instead of a partial graph.
    pub async fn build(&self, modules: &[Module]) -> Result<GraphOutcome> {
        let context = resolve_dependency_closure(Arc::clone(&self.provider), modules).await?;
        let local_nodes = local_node_labels(modules);
        let mut walk = Walk {
            builder: self,
            context,
            local_nodes,
            graph: Graph::new(),
            visited: HashSet::new(),
            commits: HashMap::new(),
        };
        for module in modules {
            let node = walk.local_node(module.opaque_id())?;
            if let Some(annotations) = walk.visit(module.clone(), node).await? {
                return Ok(GraphOutcome::Failed(annotations));
            }
        }
        log::debug!(
            "dependency graph has {} nodes and {} edges",
            walk.graph.node_count(),
            walk.graph.edge_count()
        );
        Ok(GraphOutcome::Built(walk.graph))
    }
}

/// Named modules go by full name; unnamed ones get `root`, `root-2`, ... in
/// input order.
fn local_node_labels(modules: &[Module]) -> HashMap<String, Node> {
    let mut unnamed = 0;
    modules
        .iter()
        .map(|module| {
            let node = match module.full_name() {
                Some(name) => Node::local(name.to_string()),
                None => {
                    unnamed += 1;
                    if unnamed == 1 {
                        Node::local("root")
                    } else {
                        Node::local(format!("root-{unnamed}"))
                    }
                }
            };
            (module.opaque_id().to_string(), node)
        })
        .collect()
}

type VisitFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<FileAnnotationSet>>> + Send + 'a>>;

struct Walk<'a> {
    builder: &'a GraphBuilder,
    context: Vec<Module>,
    local_nodes: HashMap<String, Node>,
    graph: Graph<Node>,
    visited: HashSet<Node>,
    /// Commit seen for each remote identity.
    commits: HashMap<String, String>,
}

impl Walk<'_> {
    fn local_node(&self, opaque_id: &str) -> Result<Node> {
        self.local_nodes
            .get(opaque_id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownModule(opaque_id.to_string()))
    }

    fn record_commit(&mut self, key: &ModuleKey) -> Result<()> {
        let name = key.full_name().to_string();
        match self.commits.get(&name) {
            Some(first) if first != key.commit() => Err(GraphError::DivergentCommits {
                name,
                first: first.clone(),
                second: key.commit().to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.commits.insert(name, key.commit().to_string());
                Ok(())
            }
        }
    }

    async fn remote_module(&mut self, key: &ModuleKey) -> Result<Module> {
        if let Some(module) = self
            .context
            .iter()
            .find(|module| module.key().as_ref() == Some(key))
        {
            return Ok(module.clone());
        }
        log::debug!("{key} was not in the dependency closure, fetching");
        let module = self
            .builder
            .provider
            .get_module(&key.to_module_ref())
            .await?;
        self.context.push(module.clone());
        Ok(module)
    }

    fn visit(&mut self, module: Module, node: Node) -> VisitFuture<'_> {
        Box::pin(async move {
            if !self.visited.insert(node.clone()) {
                return Ok(None);
            }
            self.graph.add_node(node.clone());
            let whole = module
                .clone()
                .with_targeting(Targeting::all())
                .with_is_target(true);
            let image = match self.builder.image_builder.build(&whole, &self.context)? {
                BuildOutcome::Built(image) => image,
                BuildOutcome::Failed(annotations) => return Ok(Some(annotations)),
            };
            for dep in image_module_dependencies(&image, module.opaque_id())? {
                match dep {
                    ImageModuleDependency::Direct { opaque_id } => {
                        let target = self.local_node(&opaque_id)?;
                        self.graph.add_edge(node.clone(), target)?;
                    }
                    ImageModuleDependency::Indirect { key } => {
                        self.record_commit(&key)?;
                        let target = Node::remote(&key);
                        self.graph.add_edge(node.clone(), target.clone())?;
                        if self.visited.contains(&target) {
                            continue;
                        }
                        let dep_module = self.remote_module(&key).await?;
                        if let Some(annotations) = self.visit(dep_module, target).await? {
                            return Ok(Some(annotations));
                        }
                    }
                }
            }
            Ok(None)
        })
    }
}
