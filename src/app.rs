use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::info;

use crate::acquire::{AcquireOptions, AcquisitionManager};
use crate::cluster::ClusteringEngine;
use crate::domain::CleanedResult;
use crate::error::DerepError;
use crate::ncbi::GenomeSource;
use crate::reconcile::{ReconcileInput, reconcile};
use crate::report::{ArtifactPaths, ReportWriter};
use crate::resolver::{AccessionRule, resolve};
use crate::store::Workspace;
use crate::table::TableParser;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub identity_cutoff: f64,
    pub batch_size: usize,
    /// Re-fetch genomes even when cached.
    pub force: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub result: CleanedResult,
    pub artifacts: ArtifactPaths,
}

/// The full dereplication pipeline, wired strictly forward: parse, resolve,
/// acquire, cluster, reconcile, write. Stages exchange only the data model
/// types; output row order depends only on input order.
pub struct Pipeline<S: GenomeSource, E: ClusteringEngine> {
    workspace: Workspace,
    source: S,
    engine: E,
    rule: AccessionRule,
}

impl<S: GenomeSource, E: ClusteringEngine> Pipeline<S, E> {
    pub fn new(workspace: Workspace, source: S, engine: E, rule: AccessionRule) -> Self {
        Self {
            workspace,
            source,
            engine,
            rule,
        }
    }

    pub fn run(&self, input: &Path, options: &RunOptions) -> Result<RunOutcome, DerepError> {
        if !(options.identity_cutoff > 0.0 && options.identity_cutoff <= 100.0) {
            return Err(DerepError::InvalidCutoff(options.identity_cutoff));
        }
        self.workspace.ensure_roots()?;

        info!(input = %input.display(), "parsing hit table");
        let parser = TableParser::new();
        let table = parser.parse_file(input)?;
        info!(
            hits = table.hits.len(),
            malformed = table.malformed.len(),
            "parsed hit table"
        );

        let resolved = resolve(&table.hits, &self.rule);

        let manager = AcquisitionManager::new(&self.source, &self.workspace);
        let acquisition = manager.acquire_all(
            &resolved.accessions,
            &AcquireOptions {
                batch_size: options.batch_size,
                force: options.force,
                cancel: options.cancel.clone(),
            },
        )?;
        let acquired = acquisition.acquired();

        info!(genomes = acquired.len(), "clustering acquired genomes");
        let clusters = self.engine.cluster(
            &acquired,
            options.identity_cutoff,
            &self.workspace.clustering_dir(),
        )?;

        let result = reconcile(ReconcileInput {
            hits: &table.hits,
            resolved: &resolved,
            clusters: &clusters,
            unevaluated: &acquisition.unevaluated(),
            total_rows: table.total_rows,
            malformed_rows: table.malformed.len(),
            failed_accessions: acquisition.failed().len(),
        })?;

        let writer = ReportWriter::new(&self.workspace);
        let artifacts = writer.write_all(&result, table.header.as_deref())?;

        Ok(RunOutcome { result, artifacts })
    }
}
