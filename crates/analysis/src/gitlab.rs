use crate::annotation::FileAnnotation;
use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;

const GITLAB_SEVERITY: &str = "minor";

#[derive(Serialize)]
struct GitlabViolation<'a> {
    description: &'a str,
    check_name: &'a str,
    #[serde(skip_serializing_if = "String::is_empty")]
    fingerprint: String,
    severity: &'static str,
    location: GitlabLocation<'a>,
}

#[derive(Serialize)]
struct GitlabLocation<'a> {
    path: &'a str,
    positions: GitlabPositions,
}

#[derive(Serialize)]
struct GitlabPositions {
    begin: GitlabPosition,
    end: GitlabPosition,
}

#[derive(Serialize)]
struct GitlabPosition {
    line: u32,
    #[serde(skip_serializing_if = "is_zero")]
    column: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// GitLab Code Quality report: a JSON array of violations. Each fingerprint
/// is the SHA-256 of the violation serialized without its fingerprint.
pub(crate) fn print_gitlab_code_quality(
    writer: &mut dyn Write,
    annotations: &[FileAnnotation],
) -> Result<()> {
    let mut violations = Vec::with_capacity(annotations.len());
    for annotation in annotations {
        let mut violation = GitlabViolation {
            description: annotation.message(),
            check_name: annotation.type_string(),
            fingerprint: String::new(),
            severity: GITLAB_SEVERITY,
            location: GitlabLocation {
                path: annotation
                    .file_info()
                    .map(|info| info.external_path())
                    .unwrap_or(""),
                positions: GitlabPositions {
                    begin: GitlabPosition {
                        line: annotation.start_line().max(1),
                        column: annotation.start_column(),
                    },
                    end: GitlabPosition {
                        line: annotation.end_line().max(annotation.start_line()).max(1),
                        column: annotation.end_column(),
                    },
                },
            },
        };
        let unsigned = serde_json::to_vec(&violation)?;
        violation.fingerprint = format!("{:x}", Sha256::digest(&unsigned));
        violations.push(violation);
    }
    serde_json::to_writer(&mut *writer, &violations)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileInfo;

    fn render(annotations: &[FileAnnotation]) -> serde_json::Value {
        let mut out = Vec::new();
        print_gitlab_code_quality(&mut out, annotations).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let a = FileAnnotation::new(
            Some(FileInfo::new("a.proto", "a.proto")),
            1,
            1,
            1,
            5,
            "COMPILE",
            "first",
        );
        let b = FileAnnotation::new(
            Some(FileInfo::new("a.proto", "a.proto")),
            2,
            1,
            2,
            5,
            "COMPILE",
            "second",
        );
        let first = render(&[a.clone(), b]);
        let again = render(&[a]);
        let fp0 = first[0]["fingerprint"].as_str().unwrap().to_string();
        let fp1 = first[1]["fingerprint"].as_str().unwrap().to_string();
        assert_eq!(fp0.len(), 64);
        assert_ne!(fp0, fp1);
        assert_eq!(again[0]["fingerprint"].as_str().unwrap(), fp0);
        assert_eq!(first[0]["severity"], "minor");
        assert_eq!(first[0]["location"]["positions"]["end"]["column"], 5);
    }

    #[test]
    fn empty_report_is_an_empty_array() {
        assert_eq!(render(&[]), serde_json::json!([]));
    }
}
