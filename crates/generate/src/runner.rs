use crate::error::{GenerateError, Result};
use crate::template::PluginConfig;
use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use prost_types::compiler::CodeGeneratorResponse;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Executes one plugin on one encoded `CodeGeneratorRequest`.
///
/// Implementations return the response as produced; a response carrying an
/// `error` is turned into a failure by the caller.
#[async_trait]
pub trait PluginRunner: Send + Sync {
    async fn run(&self, plugin: &PluginConfig, request: Bytes) -> Result<CodeGeneratorResponse>;
}

/// Runs plugins as local processes speaking the protoc plugin protocol on
/// stdin/stdout. The child is killed if the run is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessPluginRunner;

#[async_trait]
impl PluginRunner for ProcessPluginRunner {
    async fn run(&self, plugin: &PluginConfig, request: Bytes) -> Result<CodeGeneratorResponse> {
        let Some((program, args)) = plugin.program.split_first() else {
            return Err(GenerateError::Plugin {
                plugin: plugin.name.clone(),
                message: "empty plugin command".to_string(),
            });
        };
        log::debug!("running {program} ({} request bytes)", request.len());
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| GenerateError::io(program.clone(), err))?;

        let mut stdin = child.stdin.take().ok_or_else(|| GenerateError::Plugin {
            plugin: plugin.name.clone(),
            message: "stdin was not captured".to_string(),
        })?;
        // Written concurrently so a plugin that streams output before reading
        // all of its input cannot deadlock against us.
        let writer = tokio::spawn(async move {
            let written = stdin.write_all(&request).await;
            drop(stdin);
            written
        });
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| GenerateError::io(program.clone(), err))?;
        if let Err(err) = writer.await? {
            log::debug!("{}: stdin closed early: {err}", plugin.name);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(GenerateError::PluginExit {
                plugin: plugin.name.clone(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            log::warn!("{}: {line}", plugin.name);
        }
        Ok(CodeGeneratorResponse::decode(output.stdout.as_slice())?)
    }
}
