use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::DerepError;

/// A genome assembly accession as issued by NCBI, e.g. `GCF_000005845.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = DerepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = normalized.starts_with("GCF_") || normalized.starts_with("GCA_");
        let parts = normalized.split('.').collect::<Vec<_>>();
        let has_numeric = parts
            .first()
            .map(|prefix| prefix.trim_start_matches("GCF_").trim_start_matches("GCA_"))
            .map(|rest| rest.chars().all(|ch| ch.is_ascii_digit()) && !rest.is_empty())
            .unwrap_or(false);
        if !is_valid || !has_numeric {
            return Err(DerepError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One row of the upstream search-result table. The raw line is kept so the
/// cleaned table can reproduce passthrough columns verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub row: usize,
    pub organism: String,
    pub scaffold: String,
    pub start: u64,
    pub end: u64,
    pub score: f64,
    pub extra: Vec<String>,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCause {
    Network,
    NotFound,
    Unpack,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Network => write!(f, "network"),
            FailureCause::NotFound => write!(f, "not-found"),
            FailureCause::Unpack => write!(f, "unpack"),
        }
    }
}

/// Per-accession acquisition state. Mutated only by the acquisition manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AcquisitionStatus {
    Pending,
    Acquired { sequence_path: Utf8PathBuf },
    Failed { cause: FailureCause, message: String },
}

/// A genome that made it through acquisition, ready for clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredGenome {
    pub accession: Accession,
    pub sequence_path: Utf8PathBuf,
}

/// A similarity cluster. The representative is always one of the members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: usize,
    pub representative: Accession,
    pub members: Vec<Accession>,
}

impl Cluster {
    pub fn contains_representative(&self) -> bool {
        self.members.contains(&self.representative)
    }

    /// Members absorbed by the representative, i.e. everything else.
    pub fn absorbed(&self) -> impl Iterator<Item = &Accession> {
        self.members
            .iter()
            .filter(move |member| **member != self.representative)
    }
}

/// Why a retained hit is in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Accession is a cluster representative.
    Representative,
    /// Accession could not be resolved or evaluated; retained fail-open.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetainedHit {
    pub hit: Hit,
    pub accession: Option<Accession>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub parsed_hits: usize,
    pub malformed_rows: usize,
    pub distinct_accessions: usize,
    pub duplicate_accessions: usize,
    pub unresolvable_hits: usize,
    pub acquired_accessions: usize,
    pub failed_accessions: usize,
    pub clusters: usize,
    pub retained_hits: usize,
    pub dropped_hits: usize,
    pub unverified_hits: usize,
}

/// The final artifact of a run: an order-preserving subset of the input
/// hits plus the clustering that justifies it.
#[derive(Debug, Clone, Serialize)]
pub struct CleanedResult {
    pub retained: Vec<RetainedHit>,
    pub clusters: Vec<Cluster>,
    pub representatives: Vec<Accession>,
    pub summary: RunSummary,
}
