use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::domain::{CleanedResult, RunSummary};
use crate::error::DerepError;
use crate::store::Workspace;

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactPaths {
    pub cleaned_table: Utf8PathBuf,
    pub cluster_report: Utf8PathBuf,
    pub representatives: Utf8PathBuf,
}

/// Persists the three run artifacts. Each write is atomic: content goes to a
/// temp file next to the destination and is renamed into place, so an
/// interrupted run never leaves a partial artifact.
pub struct ReportWriter<'a> {
    workspace: &'a Workspace,
}

impl<'a> ReportWriter<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    pub fn write_all(
        &self,
        result: &CleanedResult,
        header: Option<&str>,
    ) -> Result<ArtifactPaths, DerepError> {
        let paths = ArtifactPaths {
            cleaned_table: self.workspace.cleaned_table_path(),
            cluster_report: self.workspace.cluster_report_path(),
            representatives: self.workspace.representatives_path(),
        };

        write_artifact(&paths.cleaned_table, render_cleaned_table(result, header))?;
        write_artifact(&paths.cluster_report, render_cluster_report(result))?;
        write_artifact(&paths.representatives, render_representatives(result))?;

        info!(
            cleaned_table = %paths.cleaned_table,
            cluster_report = %paths.cluster_report,
            representatives = %paths.representatives,
            "artifacts written"
        );
        Ok(paths)
    }
}

fn write_artifact(path: &Utf8Path, content: String) -> Result<(), DerepError> {
    Workspace::write_bytes_atomic(path, content.as_bytes()).map_err(|err| DerepError::Write {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    })
}

/// Same schema as the input: the original raw lines of the retained hits,
/// in their original relative order.
fn render_cleaned_table(result: &CleanedResult, header: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        out.push_str(header);
        out.push('\n');
    }
    for kept in &result.retained {
        out.push_str(&kept.hit.raw);
        out.push('\n');
    }
    out
}

fn render_cluster_report(result: &CleanedResult) -> String {
    let mut out = String::from("cluster\trepresentative\tmembers\n");
    for cluster in &result.clusters {
        let members = cluster
            .members
            .iter()
            .map(|member| member.as_str())
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!(
            "{}\t{}\t{}\n",
            cluster.id, cluster.representative, members
        ));
    }
    out
}

/// One accession per line, newline-terminated, no trailing whitespace.
fn render_representatives(result: &CleanedResult) -> String {
    let mut out = String::new();
    for representative in &result.representatives {
        out.push_str(representative.as_str());
        out.push('\n');
    }
    out
}

pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
    let json = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    let mut stdout = io::stdout();
    stdout.write_all(json.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}
