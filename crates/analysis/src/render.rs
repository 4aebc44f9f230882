use crate::annotation::FileAnnotation;
use crate::error::Result;
use crate::INPUT_PLACEHOLDER;
use serde::Serialize;
use std::io::Write;

pub(crate) fn print_text(writer: &mut dyn Write, annotations: &[FileAnnotation]) -> Result<()> {
    for annotation in annotations {
        writeln!(writer, "{annotation}")?;
    }
    Ok(())
}

/// `path(line,col) : error TYPE : message`; the column is omitted when unknown.
pub(crate) fn print_msvs(writer: &mut dyn Write, annotations: &[FileAnnotation]) -> Result<()> {
    for annotation in annotations {
        let line = annotation.start_line().max(1);
        let type_string = if annotation.type_string().is_empty() {
            "FAILURE"
        } else {
            annotation.type_string()
        };
        let message = if annotation.message().is_empty() {
            type_string
        } else {
            annotation.message()
        };
        let position = match annotation.start_column() {
            0 => format!("{line}"),
            column => format!("{line},{column}"),
        };
        writeln!(
            writer,
            "{}({}) : error {} : {}{}",
            annotation.display_path(),
            position,
            type_string,
            message,
            annotation.provenance_suffix()
        )?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ExternalFileAnnotation<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    path: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    start_line: u32,
    #[serde(skip_serializing_if = "is_zero")]
    start_column: u32,
    #[serde(skip_serializing_if = "is_zero")]
    end_line: u32,
    #[serde(skip_serializing_if = "is_zero")]
    end_column: u32,
    #[serde(rename = "type", skip_serializing_if = "str::is_empty")]
    type_string: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: &'a str,
    #[serde(rename = "plugin", skip_serializing_if = "Option::is_none")]
    plugin_name: Option<&'a str>,
    #[serde(rename = "policy", skip_serializing_if = "Option::is_none")]
    policy_name: Option<&'a str>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// JSON lines, zero and empty fields omitted.
pub(crate) fn print_json(writer: &mut dyn Write, annotations: &[FileAnnotation]) -> Result<()> {
    for annotation in annotations {
        let external = ExternalFileAnnotation {
            path: annotation
                .file_info()
                .map(|info| info.external_path())
                .unwrap_or(""),
            start_line: annotation.start_line(),
            start_column: annotation.start_column(),
            end_line: annotation.end_line(),
            end_column: annotation.end_column(),
            type_string: annotation.type_string(),
            message: annotation.message(),
            plugin_name: annotation.plugin_name(),
            policy_name: annotation.policy_name(),
        };
        serde_json::to_writer(&mut *writer, &external)?;
        writeln!(writer)?;
    }
    Ok(())
}

/// GitHub Actions workflow commands. Positions nest strictly: no column
/// without a line, no end column without an end line.
pub(crate) fn print_github_actions(
    writer: &mut dyn Write,
    annotations: &[FileAnnotation],
) -> Result<()> {
    for annotation in annotations {
        let mut line = String::from("::error file=");
        match annotation.file_info() {
            Some(info) => line.push_str(&escape_github_property(info.external_path())),
            None => line.push_str(INPUT_PLACEHOLDER),
        }
        if annotation.start_line() != 0 {
            line.push_str(&format!(",line={}", annotation.start_line()));
            if annotation.start_column() != 0 {
                line.push_str(&format!(",col={}", annotation.start_column()));
            }
            if annotation.end_line() != 0 {
                line.push_str(&format!(",endLine={}", annotation.end_line()));
                if annotation.end_column() != 0 {
                    line.push_str(&format!(",endColumn={}", annotation.end_column()));
                }
            }
        }
        line.push_str("::");
        line.push_str(&escape_github_data(annotation.message()));
        line.push_str(&escape_github_data(&annotation.provenance_suffix()));
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

fn escape_github_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_github_property(value: &str) -> String {
    escape_github_data(value)
        .replace(':', "%3A")
        .replace(',', "%2C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileInfo;
    use pretty_assertions::assert_eq;

    fn render(
        f: fn(&mut dyn Write, &[FileAnnotation]) -> Result<()>,
        annotations: &[FileAnnotation],
    ) -> String {
        let mut out = Vec::new();
        f(&mut out, annotations).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn msvs_without_column() {
        let annotation = FileAnnotation::new(
            Some(FileInfo::new("a.proto", "a.proto")),
            4,
            0,
            0,
            0,
            "COMPILE",
            "bad",
        );
        assert_eq!(
            render(print_msvs, &[annotation]),
            "a.proto(4) : error COMPILE : bad\n"
        );
    }

    #[test]
    fn msvs_with_provenance() {
        let annotation = FileAnnotation::new(
            Some(FileInfo::new("a.proto", "a.proto")),
            1,
            2,
            1,
            9,
            "RULE",
            "nope",
        )
        .with_plugin_name("plug")
        .with_policy_name("pol");
        assert_eq!(
            render(print_msvs, &[annotation]),
            "a.proto(1,2) : error RULE : nope (plug, pol)\n"
        );
    }

    #[test]
    fn json_omits_zero_fields() {
        let annotation = FileAnnotation::new(None, 0, 0, 0, 0, "COMPILE", "workspace broken");
        assert_eq!(
            render(print_json, &[annotation]),
            "{\"type\":\"COMPILE\",\"message\":\"workspace broken\"}\n"
        );
    }

    #[test]
    fn github_actions_nesting() {
        let annotation = FileAnnotation::new(
            Some(FileInfo::new("a.proto", "dir/a.proto")),
            2,
            0,
            3,
            7,
            "FOO",
            "Hello.",
        );
        assert_eq!(
            render(print_github_actions, &[annotation]),
            "::error file=dir/a.proto,line=2,endLine=3,endColumn=7::Hello.\n"
        );
    }

    #[test]
    fn github_actions_without_line_drops_columns() {
        let annotation = FileAnnotation::new(
            Some(FileInfo::new("a.proto", "a.proto")),
            0,
            5,
            0,
            6,
            "FOO",
            "multi\nline",
        );
        assert_eq!(
            render(print_github_actions, &[annotation]),
            "::error file=a.proto::multi%0Aline\n"
        );
    }
}
