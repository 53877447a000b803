use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::domain::{Accession, CleanedResult, Cluster, Hit, RetainedHit, RunSummary, Verdict};
use crate::error::DerepError;
use crate::resolver::ResolvedHits;

pub struct ReconcileInput<'a> {
    pub hits: &'a [Hit],
    pub resolved: &'a ResolvedHits,
    pub clusters: &'a [Cluster],
    /// Accessions acquisition could not deliver; their hits fail open.
    pub unevaluated: &'a HashSet<Accession>,
    pub total_rows: usize,
    pub malformed_rows: usize,
    pub failed_accessions: usize,
}

/// Maps cluster representatives back onto the original hit list. A hit
/// survives iff its accession is itself a representative, or the pipeline
/// never got to evaluate it. Relative input order is preserved; this is a
/// filter, not a resort.
pub fn reconcile(input: ReconcileInput<'_>) -> Result<CleanedResult, DerepError> {
    let representative_of = representative_lookup(input.clusters)?;

    let mut retained = Vec::new();
    let mut dropped = 0usize;
    let mut unverified = 0usize;

    for (hit, accession) in input.hits.iter().zip(&input.resolved.by_hit) {
        match accession {
            None => {
                unverified += 1;
                retained.push(RetainedHit {
                    hit: hit.clone(),
                    accession: None,
                    verdict: Verdict::Unverified,
                });
            }
            Some(accession) if input.unevaluated.contains(accession) => {
                unverified += 1;
                retained.push(RetainedHit {
                    hit: hit.clone(),
                    accession: Some(accession.clone()),
                    verdict: Verdict::Unverified,
                });
            }
            Some(accession) => match representative_of.get(accession) {
                Some(representative) if representative == accession => {
                    retained.push(RetainedHit {
                        hit: hit.clone(),
                        accession: Some(accession.clone()),
                        verdict: Verdict::Representative,
                    });
                }
                Some(_) => dropped += 1,
                // Acquired but absent from the clustering: fail open rather
                // than silently destroy data the engine never saw.
                None => {
                    unverified += 1;
                    retained.push(RetainedHit {
                        hit: hit.clone(),
                        accession: Some(accession.clone()),
                        verdict: Verdict::Unverified,
                    });
                }
            },
        }
    }

    let representatives: Vec<Accession> = input
        .clusters
        .iter()
        .map(|cluster| cluster.representative.clone())
        .collect();

    let summary = RunSummary {
        total_rows: input.total_rows,
        parsed_hits: input.hits.len(),
        malformed_rows: input.malformed_rows,
        distinct_accessions: input.resolved.accessions.len(),
        duplicate_accessions: input.resolved.duplicates,
        unresolvable_hits: input.resolved.unresolvable.len(),
        acquired_accessions: input
            .resolved
            .accessions
            .iter()
            .filter(|accession| !input.unevaluated.contains(accession))
            .count(),
        failed_accessions: input.failed_accessions,
        clusters: input.clusters.len(),
        retained_hits: retained.len(),
        dropped_hits: dropped,
        unverified_hits: unverified,
    };

    info!(
        retained = summary.retained_hits,
        dropped = summary.dropped_hits,
        unverified = summary.unverified_hits,
        "reconciled hits"
    );

    Ok(CleanedResult {
        retained,
        clusters: input.clusters.to_vec(),
        representatives,
        summary,
    })
}

/// Builds the accession -> representative map, rejecting cluster sets that
/// violate the partition invariant: duplicate members across clusters, or a
/// representative outside its own cluster.
fn representative_lookup(
    clusters: &[Cluster],
) -> Result<HashMap<Accession, Accession>, DerepError> {
    let mut lookup = HashMap::new();
    for cluster in clusters {
        if !cluster.contains_representative() {
            return Err(DerepError::ClusteringFailed(format!(
                "representative {} is not a member of cluster {}",
                cluster.representative, cluster.id
            )));
        }
        for member in &cluster.members {
            if lookup
                .insert(member.clone(), cluster.representative.clone())
                .is_some()
            {
                return Err(DerepError::ClusteringFailed(format!(
                    "{member} appears in more than one cluster"
                )));
            }
        }
    }
    Ok(lookup)
}
