use crate::controller::{Controller, ResolvedInput};
use crate::{write_stdout, BuildArgs, Outcome};
use anyhow::{Context, Result};
use protokit_image::{BuildOptions, BuildOutcome, Image};
use protokit_storage::{OsBucket, WriteBucket};
use std::io::Write;
use std::path::Path;

pub(crate) async fn run(controller: &Controller, args: BuildArgs) -> Result<Outcome> {
    let options = BuildOptions {
        exclude_source_info: args.exclude_source_info,
        exclude_imports: args.exclude_imports,
    };
    let resolved = controller
        .resolve(&args.input.input, &args.input.paths, &args.input.exclude_paths)
        .await?;
    let image = match resolved {
        ResolvedInput::Modules(modules) => match controller.build(&modules, options).await? {
            BuildOutcome::Built(image) => image,
            BuildOutcome::Failed(annotations) => {
                return Ok(Outcome::Annotations(annotations, args.errors.error_format));
            }
        },
        ResolvedInput::Image(image) => apply_options(image, options)?,
    };
    log::info!(
        "built {} file(s), {} target(s)",
        image.len(),
        image.target_files().count()
    );

    let Some(output) = args.output else {
        return Ok(Outcome::Done);
    };
    let data = if args.as_file_descriptor_set {
        image.to_file_descriptor_set_bytes()
    } else {
        image.to_bytes()
    };
    if output == "-" {
        write_stdout(&data)?;
    } else {
        write_file(&output, &data)?;
    }
    Ok(Outcome::Done)
}

/// Options applied after the fact when the input was already an image.
fn apply_options(image: Image, options: BuildOptions) -> Result<Image> {
    let image = if options.exclude_imports {
        image.without_imports()
    } else {
        image
    };
    if options.exclude_source_info {
        return Ok(image.without_source_info()?);
    }
    Ok(image)
}

/// The file appears only once it is completely written.
fn write_file(output: &str, data: &[u8]) -> Result<()> {
    let path = Path::new(output);
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("{output}: not a file path"))?
        .to_string_lossy();
    let bucket = OsBucket::create(dir)?;
    let mut object = bucket.put(&name)?;
    object
        .write_all(data)
        .with_context(|| format!("failed to write {output}"))?;
    object.commit()?;
    log::debug!("wrote {output} ({} bytes)", data.len());
    Ok(())
}
