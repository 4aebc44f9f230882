use crate::annotation::FileAnnotation;
use crate::error::Result;
use std::io::Write;

/// JUnit XML: one `<testsuite>` per file (named after the path without the
/// `.proto` suffix), one `<testcase>` with a `<failure>` per annotation.
pub(crate) fn print_junit(writer: &mut dyn Write, annotations: &[FileAnnotation]) -> Result<()> {
    let mut out = String::from("<testsuites>");
    for group in group_by_path(annotations) {
        let path = group[0].display_path();
        let name = path.strip_suffix(".proto").unwrap_or(path);
        out.push_str(&format!(
            "\n  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\">",
            escape(name),
            group.len(),
            group.len()
        ));
        for annotation in group {
            out.push_str(&format!(
                "\n    <testcase name=\"{}\">",
                escape(&testcase_name(annotation))
            ));
            out.push_str(&format!(
                "\n      <failure message=\"{}\" type=\"{}\"></failure>",
                escape(&annotation.to_string()),
                escape(annotation.type_string())
            ));
            out.push_str("\n    </testcase>");
        }
        out.push_str("\n  </testsuite>");
    }
    if !annotations.is_empty() {
        out.push('\n');
    }
    out.push_str("</testsuites>\n");
    writer.write_all(out.as_bytes())?;
    Ok(())
}

fn testcase_name(annotation: &FileAnnotation) -> String {
    let mut name = annotation.type_string().to_string();
    if annotation.start_column() != 0 {
        name.push_str(&format!(
            "_{}_{}",
            annotation.start_line(),
            annotation.start_column()
        ));
    } else if annotation.start_line() != 0 {
        name.push_str(&format!("_{}", annotation.start_line()));
    }
    name
}

/// Groups preserve the order in which each path is first seen.
fn group_by_path(annotations: &[FileAnnotation]) -> Vec<Vec<&FileAnnotation>> {
    let mut groups: Vec<Vec<&FileAnnotation>> = Vec::new();
    for annotation in annotations {
        match groups
            .iter_mut()
            .find(|group| group[0].display_path() == annotation.display_path())
        {
            Some(group) => group.push(annotation),
            None => groups.push(vec![annotation]),
        }
    }
    groups
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    out
}
