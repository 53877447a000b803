use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{Accession, AcquiredGenome, AcquisitionStatus, FailureCause};
use crate::error::DerepError;
use crate::fs_util;
use crate::ncbi::GenomeSource;
use crate::store::{Workspace, atomic_rename_dir};

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    pub batch_size: usize,
    /// Ignore cached genomes and re-fetch.
    pub force: bool,
    /// Checked between batches; an in-flight batch always drains.
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessionRecord {
    pub accession: Accession,
    pub status: AcquisitionStatus,
}

/// Outcome of the acquisition stage. Every accession handed in appears here
/// exactly once, whatever happened to it.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    pub records: Vec<AccessionRecord>,
}

impl AcquisitionReport {
    pub fn acquired(&self) -> Vec<AcquiredGenome> {
        self.records
            .iter()
            .filter_map(|record| match &record.status {
                AcquisitionStatus::Acquired { sequence_path } => Some(AcquiredGenome {
                    accession: record.accession.clone(),
                    sequence_path: sequence_path.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<&AccessionRecord> {
        self.records
            .iter()
            .filter(|record| matches!(record.status, AcquisitionStatus::Failed { .. }))
            .collect()
    }

    /// Accessions the pipeline could not evaluate, for fail-open reconciliation.
    pub fn unevaluated(&self) -> HashSet<Accession> {
        self.records
            .iter()
            .filter(|record| !matches!(record.status, AcquisitionStatus::Acquired { .. }))
            .map(|record| record.accession.clone())
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct AcquisitionMetadata {
    accession: String,
    source: String,
    downloaded_at: String,
    sequence_path: String,
}

/// Acquires genome sequence bundles, one canonical directory per accession,
/// with a shared cache in front of the network.
pub struct AcquisitionManager<'a, S: GenomeSource> {
    source: &'a S,
    workspace: &'a Workspace,
}

impl<'a, S: GenomeSource> AcquisitionManager<'a, S> {
    pub fn new(source: &'a S, workspace: &'a Workspace) -> Self {
        Self { source, workspace }
    }

    /// Processes accessions in bounded batches; members of a batch fetch in
    /// parallel. A failed accession never aborts its batch or the run.
    pub fn acquire_all(
        &self,
        accessions: &[Accession],
        options: &AcquireOptions,
    ) -> Result<AcquisitionReport, DerepError> {
        if options.batch_size == 0 {
            return Err(DerepError::InvalidBatchSize);
        }
        self.workspace.ensure_roots()?;
        let genomes_root = self.workspace.work_root().join("genomes");
        fs::create_dir_all(genomes_root.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;

        let mut records: Vec<AccessionRecord> = accessions
            .iter()
            .map(|accession| AccessionRecord {
                accession: accession.clone(),
                status: AcquisitionStatus::Pending,
            })
            .collect();

        for (batch_index, batch) in accessions.chunks(options.batch_size).enumerate() {
            if let Some(cancel) = &options.cancel {
                if cancel.load(Ordering::SeqCst) {
                    warn!(batch = batch_index, "acquisition cancelled between batches");
                    break;
                }
            }
            info!(batch = batch_index, size = batch.len(), "acquiring batch");
            let statuses: Vec<AcquisitionStatus> = batch
                .par_iter()
                .map(|accession| self.acquire_one(accession, options.force))
                .collect();
            for (offset, status) in statuses.into_iter().enumerate() {
                records[batch_index * options.batch_size + offset].status = status;
            }
        }

        let acquired = records
            .iter()
            .filter(|record| matches!(record.status, AcquisitionStatus::Acquired { .. }))
            .count();
        info!(
            acquired,
            failed = records.len() - acquired,
            "acquisition drained"
        );
        Ok(AcquisitionReport { records })
    }

    fn acquire_one(&self, accession: &Accession, force: bool) -> AcquisitionStatus {
        match self.try_acquire(accession, force) {
            Ok(sequence_path) => AcquisitionStatus::Acquired { sequence_path },
            Err(err) => {
                let cause = failure_cause(&err);
                warn!(accession = %accession, %cause, "acquisition failed: {err}");
                AcquisitionStatus::Failed {
                    cause,
                    message: err.to_string(),
                }
            }
        }
    }

    fn try_acquire(&self, accession: &Accession, force: bool) -> Result<Utf8PathBuf, DerepError> {
        let work_dir = self.workspace.genome_work_dir(accession);
        let cache_dir = self.workspace.genome_cache_dir(accession);

        if !force {
            // A materialized directory always holds a FASTA; anything else
            // is a stale partial attempt.
            if let Some(path) = materialized_fasta(&work_dir) {
                return Ok(path);
            }
            if materialized_fasta(&cache_dir).is_some() {
                info!(accession = %accession, "using cached genome");
                Workspace::copy_dir_atomic(&cache_dir, &work_dir)?;
                return materialized_fasta(&work_dir).ok_or_else(|| {
                    DerepError::Filesystem(format!("cache copy lost FASTA for {accession}"))
                });
            }
        }

        if work_dir.as_std_path().exists() {
            fs::remove_dir_all(work_dir.as_std_path())
                .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        }

        let genomes_root = self.workspace.work_root().join("genomes");
        let temp_dir = tempfile::Builder::new()
            .prefix("derephit-acq")
            .tempdir_in(genomes_root.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        let bundle_path = temp_dir.path().join("bundle");

        let download = self.source.fetch(accession, &bundle_path)?;
        if !bundle_path.exists() {
            return Err(DerepError::Unpack(format!(
                "download produced no bundle for {accession}"
            )));
        }

        let extract_dir = temp_dir.path().join("extract");
        fs::create_dir_all(&extract_dir).map_err(|err| DerepError::Filesystem(err.to_string()))?;
        if download.is_zip {
            fs_util::validate_zip(&bundle_path)?;
            fs_util::extract_zip(&bundle_path, &extract_dir)?;
        } else if download.is_gzip {
            fs_util::gunzip_file(
                &bundle_path,
                &extract_dir.join(format!("{accession}.fna")),
            )?;
        } else {
            // Uncompressed bundles are taken to be the FASTA itself.
            fs::rename(&bundle_path, extract_dir.join(format!("{accession}.fna")))
                .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        }
        if fs_util::find_first_fasta(&extract_dir).is_none() {
            return Err(DerepError::Unpack(format!(
                "bundle for {accession} contains no FASTA sequence"
            )));
        }

        if let Some(parent) = work_dir.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        }
        atomic_rename_dir(&extract_dir, work_dir.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;

        let sequence_path = materialized_fasta(&work_dir).ok_or_else(|| {
            DerepError::Filesystem(format!("materialized directory lost FASTA for {accession}"))
        })?;

        let metadata = AcquisitionMetadata {
            accession: accession.to_string(),
            source: "ncbi".to_string(),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            sequence_path: sequence_path.to_string(),
        };
        let metadata_bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        Workspace::write_bytes_atomic(&work_dir.join("acquisition.json"), &metadata_bytes)?;

        Workspace::copy_dir_atomic(&work_dir, &cache_dir)?;

        Ok(sequence_path)
    }
}

fn materialized_fasta(dir: &camino::Utf8Path) -> Option<Utf8PathBuf> {
    if !dir.as_std_path().is_dir() {
        return None;
    }
    fs_util::find_first_fasta(dir.as_std_path())
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn failure_cause(err: &DerepError) -> FailureCause {
    match err {
        DerepError::NcbiStatus { status: 404, .. } => FailureCause::NotFound,
        DerepError::Unpack(_) => FailureCause::Unpack,
        _ => FailureCause::Network,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_causes_map_by_error_class() {
        let not_found = DerepError::NcbiStatus {
            status: 404,
            message: "no such accession".to_string(),
        };
        assert_eq!(failure_cause(&not_found), FailureCause::NotFound);

        let server = DerepError::NcbiStatus {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(failure_cause(&server), FailureCause::Network);

        let unpack = DerepError::Unpack("truncated zip".to_string());
        assert_eq!(failure_cause(&unpack), FailureCause::Unpack);
    }
}
