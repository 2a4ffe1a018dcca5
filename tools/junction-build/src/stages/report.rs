//! HTML report of data import issues

use anyhow::Context;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::issues::{Issue, IssueKind};

pub struct IssueReporter {
    report_dir: PathBuf,
}

impl IssueReporter {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<h1>{}</h1>\n{}</body>\n</html>\n",
        encode_text(title),
        encode_text(title),
        body
    )
}

fn index_page(groups: &[(IssueKind, Vec<&Issue>)]) -> String {
    let mut body = String::new();
    if groups.is_empty() {
        body.push_str("<p>No data import issues.</p>\n");
    } else {
        body.push_str("<table>\n<tr><th>Issue</th><th>Severity</th><th>Count</th></tr>\n");
        for (kind, issues) in groups {
            let _ = writeln!(
                body,
                "<tr><td><a href=\"{href}\">{name}</a></td><td>{:?}</td><td>{}</td></tr>",
                kind.default_severity(),
                issues.len(),
                href = encode_double_quoted_attribute(&format!("{}.html", kind.name())),
                name = encode_text(kind.name())
            );
        }
        body.push_str("</table>\n");
    }
    page("Data import issues", &body)
}

fn kind_page(kind: IssueKind, issues: &[&Issue]) -> String {
    let mut body = String::from("<p><a href=\"index.html\">Back</a></p>\n<ul>\n");
    for issue in issues {
        let _ = writeln!(body, "<li>{}</li>", encode_text(&issue.message));
    }
    body.push_str("</ul>\n");
    page(kind.name(), &body)
}

/// The directory itself if present, otherwise its closest existing ancestor
fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

impl GraphBuilderStage for IssueReporter {
    fn kind(&self) -> StageKind {
        StageKind::IssueReport
    }

    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), String> {
        if self.report_dir.exists() {
            if !self.report_dir.is_dir() {
                return Err(format!("{} is not a directory", self.report_dir.display()));
            }
            return Ok(());
        }
        let ancestor = existing_ancestor(&self.report_dir)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let metadata = fs::metadata(ancestor).map_err(|e| format!("cannot inspect {}: {e}", ancestor.display()))?;
        if !metadata.is_dir() || metadata.permissions().readonly() {
            return Err(format!(
                "{} cannot be created under {}",
                self.report_dir.display(),
                ancestor.display()
            ));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        fs::create_dir_all(&self.report_dir)
            .with_context(|| format!("Failed to create report directory {}", self.report_dir.display()))?;

        let groups: Vec<(IssueKind, Vec<&Issue>)> = ctx.issues.by_kind().into_iter().collect();
        let index = self.report_dir.join("index.html");
        fs::write(&index, index_page(&groups)).with_context(|| format!("Failed to write {}", index.display()))?;
        for (kind, issues) in &groups {
            let path = self.report_dir.join(format!("{}.html", kind.name()));
            fs::write(&path, kind_page(*kind, issues)).with_context(|| format!("Failed to write {}", path.display()))?;
        }

        info!(
            dir = %self.report_dir.display(),
            pages = groups.len() + 1,
            issues = ctx.issues.len(),
            "Wrote data import report"
        );
        Ok(())
    }
}
