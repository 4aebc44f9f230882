use crate::controller::{Controller, ResolvedInput};
use crate::{print_stdout, DepGraphArgs, Outcome};
use anyhow::{bail, Result};
use protokit_graph::{GraphBuilder, GraphOutcome};
use protokit_image::Builder;
use std::sync::Arc;

pub(crate) async fn run(controller: &Controller, args: DepGraphArgs) -> Result<Outcome> {
    let modules = match controller.resolve(&args.input, &[], &[]).await? {
        ResolvedInput::Modules(modules) => modules,
        ResolvedInput::Image(_) => {
            bail!("{}: dep graph needs a directory or module input, not an image", args.input)
        }
    };
    let provider = Arc::new(controller.provider(modules.modules()));
    let builder = GraphBuilder::new(Arc::new(Builder::new(controller.compiler()?)), provider);
    match builder.build(modules.modules()).await? {
        GraphOutcome::Built(graph) => {
            print_stdout(graph.dot().trim_end())?;
            Ok(Outcome::Done)
        }
        GraphOutcome::Failed(annotations) => {
            Ok(Outcome::Annotations(annotations, args.errors.error_format))
        }
    }
}
