//! `buf.gen.yaml`: which plugins to run, with which options, and where
//! their output goes.

use crate::error::{GenerateError, Result};
use protokit_storage::normalpath;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

pub const BUF_GEN_YAML: &str = "buf.gen.yaml";

/// How target files are split into plugin requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One request per directory of target files.
    #[default]
    Directory,
    /// One request with every target file.
    All,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "directory" => Ok(Self::Directory),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown strategy {other:?}, expected \"directory\" or \"all\""
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directory => "directory",
            Self::All => "all",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Label used in logs and error messages.
    pub name: String,
    /// Program and leading arguments.
    pub program: Vec<String>,
    /// Output directory, relative to the generation root.
    pub out: String,
    /// Parameter passed to the plugin, options joined with `,`.
    pub opt: Option<String>,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateTemplate {
    pub plugins: Vec<PluginConfig>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: Option<String>,
}

#[derive(Deserialize)]
struct ExternalV1 {
    #[serde(default)]
    plugins: Vec<ExternalPluginV1>,
}

#[derive(Deserialize)]
struct ExternalPluginV1 {
    plugin: Option<String>,
    name: Option<String>,
    remote: Option<String>,
    out: String,
    opt: Option<StringOrList>,
    path: Option<StringOrList>,
    strategy: Option<String>,
}

#[derive(Deserialize)]
struct ExternalV2 {
    #[serde(default)]
    plugins: Vec<ExternalPluginV2>,
}

#[derive(Deserialize)]
struct ExternalPluginV2 {
    local: Option<StringOrList>,
    remote: Option<String>,
    protoc_builtin: Option<String>,
    out: String,
    opt: Option<StringOrList>,
    strategy: Option<String>,
}

pub fn parse_buf_gen_yaml(path: &str, data: &[u8]) -> Result<GenerateTemplate> {
    let probe: VersionProbe =
        serde_yaml::from_slice(data).map_err(|err| GenerateError::config(path, err))?;
    let plugins = match probe.version.as_deref().map(str::trim) {
        Some("v1beta1") | Some("v1") => {
            let file: ExternalV1 =
                serde_yaml::from_slice(data).map_err(|err| GenerateError::config(path, err))?;
            file.plugins
                .into_iter()
                .map(|plugin| plugin_v1(path, plugin))
                .collect::<Result<Vec<_>>>()?
        }
        Some("v2") => {
            let file: ExternalV2 =
                serde_yaml::from_slice(data).map_err(|err| GenerateError::config(path, err))?;
            file.plugins
                .into_iter()
                .map(|plugin| plugin_v2(path, plugin))
                .collect::<Result<Vec<_>>>()?
        }
        None | Some("") => return Err(GenerateError::config(path, "missing version key")),
        Some(other) => {
            return Err(GenerateError::config(
                path,
                format!("unknown version {other:?}, expected one of v1beta1, v1, v2"),
            ))
        }
    };
    if plugins.is_empty() {
        return Err(GenerateError::config(path, "no plugins configured"));
    }
    Ok(GenerateTemplate { plugins })
}

fn plugin_v1(path: &str, plugin: ExternalPluginV1) -> Result<PluginConfig> {
    if plugin.remote.is_some() {
        return Err(GenerateError::config(path, "remote plugins are not supported"));
    }
    let name = match (plugin.plugin, plugin.name) {
        (Some(name), None) | (None, Some(name)) => name,
        (Some(_), Some(_)) => {
            return Err(GenerateError::config(
                path,
                "a plugin sets both \"plugin\" and \"name\"",
            ))
        }
        (None, None) => {
            return Err(GenerateError::config(
                path,
                "a plugin needs a \"plugin\" or \"name\" key",
            ))
        }
    };
    if name.contains('/') {
        return Err(GenerateError::config(
            path,
            format!("{name}: remote plugins are not supported"),
        ));
    }
    let program = match plugin.path {
        Some(program) => non_empty_program(path, &name, program.into_vec())?,
        None => vec![format!("protoc-gen-{name}")],
    };
    Ok(PluginConfig {
        out: output_dir(path, &name, &plugin.out)?,
        opt: join_opt(plugin.opt),
        strategy: strategy(path, plugin.strategy.as_deref())?,
        name,
        program,
    })
}

fn plugin_v2(path: &str, plugin: ExternalPluginV2) -> Result<PluginConfig> {
    let program = match (plugin.local, plugin.remote, plugin.protoc_builtin) {
        (Some(local), None, None) => local.into_vec(),
        (None, Some(remote), None) => {
            return Err(GenerateError::config(
                path,
                format!("{remote}: remote plugins are not supported"),
            ))
        }
        (None, None, Some(builtin)) => {
            return Err(GenerateError::config(
                path,
                format!("{builtin}: protoc built-in plugins are not supported"),
            ))
        }
        _ => {
            return Err(GenerateError::config(
                path,
                "a plugin needs exactly one of \"local\", \"remote\" or \"protoc_builtin\"",
            ))
        }
    };
    let name = program.first().cloned().unwrap_or_default();
    let program = non_empty_program(path, &name, program)?;
    Ok(PluginConfig {
        out: output_dir(path, &name, &plugin.out)?,
        opt: join_opt(plugin.opt),
        strategy: strategy(path, plugin.strategy.as_deref())?,
        name,
        program,
    })
}

fn non_empty_program(path: &str, name: &str, program: Vec<String>) -> Result<Vec<String>> {
    if program.is_empty() || program.iter().any(|arg| arg.trim().is_empty()) {
        return Err(GenerateError::config(
            path,
            format!("{name}: empty plugin command"),
        ));
    }
    Ok(program)
}

fn output_dir(path: &str, name: &str, out: &str) -> Result<String> {
    normalpath::normalize_and_validate(out)
        .map_err(|err| GenerateError::config(path, format!("{name}: out: {err}")))
}

fn join_opt(opt: Option<StringOrList>) -> Option<String> {
    let joined = opt?.into_vec().join(",");
    (!joined.is_empty()).then_some(joined)
}

fn strategy(path: &str, value: Option<&str>) -> Result<Strategy> {
    value
        .map(Strategy::from_str)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(|err| GenerateError::config(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_v1_plugins() {
        let template = parse_buf_gen_yaml(
            BUF_GEN_YAML,
            b"version: v1\nplugins:\n  - plugin: go\n    out: gen/go\n    opt:\n      - paths=source_relative\n      - foo=bar\n  - name: custom\n    out: gen/custom\n    path: [bin/custom, --flag]\n    strategy: all\n",
        )
        .unwrap();
        assert_eq!(
            template.plugins,
            vec![
                PluginConfig {
                    name: "go".into(),
                    program: vec!["protoc-gen-go".into()],
                    out: "gen/go".into(),
                    opt: Some("paths=source_relative,foo=bar".into()),
                    strategy: Strategy::Directory,
                },
                PluginConfig {
                    name: "custom".into(),
                    program: vec!["bin/custom".into(), "--flag".into()],
                    out: "gen/custom".into(),
                    opt: None,
                    strategy: Strategy::All,
                },
            ]
        );
    }

    #[test]
    fn parses_v2_local_plugins() {
        let template = parse_buf_gen_yaml(
            BUF_GEN_YAML,
            b"version: v2\nplugins:\n  - local: protoc-gen-es\n    out: ./gen/es/\n    opt: target=ts\n",
        )
        .unwrap();
        let plugin = &template.plugins[0];
        assert_eq!(plugin.name, "protoc-gen-es");
        assert_eq!(plugin.out, "gen/es");
        assert_eq!(plugin.opt.as_deref(), Some("target=ts"));
    }

    #[test]
    fn rejects_what_cannot_run_locally() {
        let remote = parse_buf_gen_yaml(
            BUF_GEN_YAML,
            b"version: v2\nplugins:\n  - remote: buf.build/protocolbuffers/go\n    out: gen\n",
        )
        .unwrap_err();
        assert!(remote.to_string().contains("remote plugins are not supported"));

        let escape =
            parse_buf_gen_yaml(BUF_GEN_YAML, b"version: v1\nplugins:\n  - plugin: go\n    out: ../gen\n")
                .unwrap_err();
        assert!(escape.to_string().contains("escapes"), "{escape}");

        let strategy = parse_buf_gen_yaml(
            BUF_GEN_YAML,
            b"version: v1\nplugins:\n  - plugin: go\n    out: gen\n    strategy: per-file\n",
        )
        .unwrap_err();
        assert!(strategy.to_string().contains("unknown strategy"));

        assert!(parse_buf_gen_yaml(BUF_GEN_YAML, b"plugins: []\n").is_err());
    }
}
