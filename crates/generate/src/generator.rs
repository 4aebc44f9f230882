use crate::error::Result;
use crate::output::GeneratedOutput;
use crate::request::build_requests;
use crate::runner::PluginRunner;
use crate::template::GenerateTemplate;
use protokit_image::{strip_source_retention_options, Image};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Runs every plugin of a template over an image.
#[derive(Clone)]
pub struct Generator {
    runner: Arc<dyn PluginRunner>,
}

impl Generator {
    pub fn new(runner: Arc<dyn PluginRunner>) -> Self {
        Self { runner }
    }

    /// Plugins run in template order so insertion points can target files
    /// of earlier plugins. The requests of one plugin run concurrently and
    /// their responses are applied in request order, whatever order they
    /// finish in. Nothing is written; see [`GeneratedOutput::write_to`].
    pub async fn generate(&self, image: &Image, template: &GenerateTemplate) -> Result<GeneratedOutput> {
        let image = strip_source_retention_options(image)?;
        let mut output = GeneratedOutput::new();
        for plugin in &template.plugins {
            let requests = build_requests(&image, plugin.strategy, plugin.opt.as_deref());
            log::info!(
                "running {} with {} request(s), strategy {}",
                plugin.name,
                requests.len(),
                plugin.strategy
            );
            let mut tasks = JoinSet::new();
            for (i, request) in requests.into_iter().enumerate() {
                let runner = Arc::clone(&self.runner);
                let plugin = plugin.clone();
                tasks.spawn(async move {
                    let response = runner.run(&plugin, request.encoded).await;
                    (i, response)
                });
            }
            let mut responses = Vec::with_capacity(tasks.len());
            while let Some(joined) = tasks.join_next().await {
                let (i, response) = joined?;
                responses.push((i, response?));
            }
            responses.sort_by_key(|(i, _)| *i);
            for (_, response) in responses {
                output.add_response(&plugin.name, &plugin.out, response)?;
            }
        }
        Ok(output)
    }
}
