use crate::controller::{Controller, ResolvedInput};
use crate::{GenerateArgs, Outcome};
use anyhow::{Context, Result};
use protokit_generate::{parse_buf_gen_yaml, Generator, ProcessPluginRunner};
use protokit_image::{BuildOptions, BuildOutcome};
use protokit_storage::OsBucket;
use std::sync::Arc;

pub(crate) async fn run(controller: &Controller, args: GenerateArgs) -> Result<Outcome> {
    let template_path = args.template.display().to_string();
    let data = tokio::fs::read(&args.template)
        .await
        .with_context(|| format!("failed to read {template_path}"))?;
    let template = parse_buf_gen_yaml(&template_path, &data)?;

    let resolved = controller
        .resolve(&args.input.input, &args.input.paths, &args.input.exclude_paths)
        .await?;
    let image = match resolved {
        ResolvedInput::Modules(modules) => {
            match controller.build(&modules, BuildOptions::default()).await? {
                BuildOutcome::Built(image) => image,
                BuildOutcome::Failed(annotations) => {
                    return Ok(Outcome::Annotations(annotations, args.errors.error_format));
                }
            }
        }
        ResolvedInput::Image(image) => image,
    };

    let generated = Generator::new(Arc::new(ProcessPluginRunner))
        .generate(&image, &template)
        .await?;
    let bucket = OsBucket::create(&args.output)?;
    generated.write_to(&bucket)?;
    log::info!(
        "generated {} file(s) under {}",
        generated.len(),
        args.output.display()
    );
    Ok(Outcome::Done)
}
