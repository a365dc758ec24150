use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use valor_domain::ReportSnapshot;

lazy_static! {
    static ref IMAGE_REF: Regex = Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap();
}

/// A markdown image reference found in a result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub alt: String,
    pub path: String,
}

impl ImageRef {
    /// External references are served as-is and never fetched or cached.
    pub fn is_external(&self) -> bool {
        self.path.starts_with("http://") || self.path.starts_with("https://")
    }
}

/// Scans markdown content for image references, in document order.
pub fn image_references(content: &str) -> Vec<ImageRef> {
    IMAGE_REF
        .captures_iter(content)
        .map(|captures| ImageRef {
            alt: captures[1].to_string(),
            path: captures[2].to_string(),
        })
        .collect()
}

/// Rewrites image reference paths according to `mapping`; references without
/// a mapping entry are left untouched.
pub fn rewrite_image_references(content: &str, mapping: &HashMap<String, String>) -> String {
    IMAGE_REF
        .replace_all(content, |captures: &regex::Captures<'_>| {
            let alt = &captures[1];
            let path = &captures[2];
            match mapping.get(path) {
                Some(rewritten) => format!("![{alt}]({rewritten})"),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Renders the final validation report as a markdown document: artifact
/// inventory followed by one section per test. The external converter turns
/// these bytes into the delivery format.
pub fn render_report_markdown(snapshot: &ReportSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# Model Validation Report\n\n");
    out.push_str(&format!("- Validation: {}\n", snapshot.validation_id));
    out.push_str(&format!(
        "- Generated: {}\n\n",
        snapshot.generated_at.to_rfc3339()
    ));

    out.push_str("## Artifacts\n\n");
    if snapshot.artifacts.is_empty() {
        out.push_str("No artifacts uploaded.\n");
    }
    for (kind, artifact) in snapshot.artifacts.iter() {
        out.push_str(&format!("- {}: {}\n", kind, artifact.file_name));
    }
    out.push('\n');

    for test in &snapshot.tests {
        out.push_str(&format!("## {}\n\n", test.title));
        out.push_str(&format!("Status: {}\n\n", test.status));
        out.push_str(&format!("{}\n\n", test.description));

        if let Some(code) = &test.code {
            out.push_str("### Test code\n\n");
            out.push_str(&format!("```python\n{code}\n```\n\n"));
        }

        for result in &test.results {
            out.push_str(&format!("### {}\n\n", result.filename));
            out.push_str(&result.content);
            out.push_str("\n\n");
        }

        if let Some(error) = &test.error {
            out.push_str(&format!("### Last error\n\n{error}\n\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use valor_domain::{ArtifactSet, ResultFile, TestSession, ValidationSession};

    use super::*;

    #[test]
    fn test_image_references_found_in_order() {
        let fixture = "intro ![roc](roc.png) mid ![ext](https://x.io/a.png) end";

        let actual = image_references(fixture);

        assert_eq!(actual.len(), 2);
        assert_eq!(actual[0].path, "roc.png");
        assert!(!actual[0].is_external());
        assert!(actual[1].is_external());
    }

    #[test]
    fn test_rewrite_replaces_only_mapped_paths() {
        let fixture = "![roc](roc.png) and ![psi](psi.png)";
        let mapping: HashMap<String, String> = [(
            "roc.png".to_string(),
            "/test-images/v1/test_1/roc.png".to_string(),
        )]
        .into();

        let actual = rewrite_image_references(fixture, &mapping);

        assert_eq!(
            actual,
            "![roc](/test-images/v1/test_1/roc.png) and ![psi](psi.png)"
        );
    }

    #[test]
    fn test_report_includes_each_test_section() {
        let mut validation = ValidationSession::new(ArtifactSet::new());
        let mut test = TestSession::new("Backtest", "Compare predictions");
        test.record_success(
            "print('ok')",
            vec![ResultFile::new("report.md", "# Backtest\nAUC=0.82")],
        );
        validation.add_test(test);

        let snapshot = ReportSnapshot::from(&validation);
        let actual = render_report_markdown(&snapshot);

        assert!(actual.contains("# Model Validation Report"));
        assert!(actual.contains("## Backtest"));
        assert!(actual.contains("```python\nprint('ok')\n```"));
        assert!(actual.contains("AUC=0.82"));
    }
}
