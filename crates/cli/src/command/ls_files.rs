use crate::controller::{Controller, ResolvedInput};
use crate::{print_stdout, LsFilesArgs, Outcome};
use anyhow::Result;

pub(crate) async fn run(controller: &Controller, args: LsFilesArgs) -> Result<Outcome> {
    let resolved = controller
        .resolve(&args.input.input, &args.input.paths, &args.input.exclude_paths)
        .await?;
    let mut files = match resolved {
        ResolvedInput::Modules(modules) => {
            let mut files = Vec::new();
            for module in modules.target_modules() {
                files.extend(module.target_files()?.into_iter().map(|info| info.external_path));
            }
            files
        }
        ResolvedInput::Image(image) => image
            .target_files()
            .map(|file| file.external_path().to_string())
            .collect(),
    };
    files.sort();
    files.dedup();
    if !files.is_empty() {
        print_stdout(&files.join("\n"))?;
    }
    Ok(Outcome::Done)
}
