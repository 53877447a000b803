use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, info};

use crate::domain::{Accession, Hit};
use crate::error::DerepError;

/// Accession prefix + nine digits + assembly version.
pub const DEFAULT_ACCESSION_PATTERN: &str = r"GC[AF]_[0-9]{9}\.[0-9]+";

/// The rule that derives a genome accession from a hit's subject identifier.
/// The exact convention is tool-specific, so the pattern is configuration
/// rather than a hard-coded format.
#[derive(Debug, Clone)]
pub struct AccessionRule {
    pattern: Regex,
}

impl AccessionRule {
    pub fn new(pattern: &str) -> Result<Self, DerepError> {
        let pattern = Regex::new(pattern)
            .map_err(|err| DerepError::InvalidAccessionPattern(err.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn extract(&self, subject: &str) -> Option<Accession> {
        let matched = self.pattern.find(subject)?;
        matched.as_str().parse().ok()
    }
}

impl Default for AccessionRule {
    fn default() -> Self {
        // The default pattern is a valid regex.
        Self::new(DEFAULT_ACCESSION_PATTERN).unwrap()
    }
}

/// Outcome of accession resolution over the parsed hit table.
#[derive(Debug, Clone)]
pub struct ResolvedHits {
    /// Distinct accessions in first-seen order.
    pub accessions: Vec<Accession>,
    /// Index-aligned with the hit slice passed to `resolve`.
    pub by_hit: Vec<Option<Accession>>,
    /// Row indices of hits whose subject did not match the rule.
    pub unresolvable: Vec<usize>,
    /// How many hits re-referenced an already-seen accession.
    pub duplicates: usize,
}

pub fn resolve(hits: &[Hit], rule: &AccessionRule) -> ResolvedHits {
    let mut accessions = Vec::new();
    let mut seen = HashMap::new();
    let mut by_hit = Vec::with_capacity(hits.len());
    let mut unresolvable = Vec::new();
    let mut duplicates = 0usize;

    for hit in hits {
        match rule.extract(&hit.scaffold) {
            Some(accession) => {
                if seen.insert(accession.clone(), hit.row).is_some() {
                    duplicates += 1;
                } else {
                    accessions.push(accession.clone());
                }
                by_hit.push(Some(accession));
            }
            None => {
                debug!(row = hit.row, subject = %hit.scaffold, "no accession in subject identifier");
                unresolvable.push(hit.row);
                by_hit.push(None);
            }
        }
    }

    info!(
        distinct = accessions.len(),
        duplicates,
        unresolvable = unresolvable.len(),
        "resolved accessions"
    );

    ResolvedHits {
        accessions,
        by_hit,
        unresolvable,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(row: usize, scaffold: &str) -> Hit {
        Hit {
            row,
            organism: "org".to_string(),
            scaffold: scaffold.to_string(),
            start: 1,
            end: 2,
            score: 1.0,
            extra: Vec::new(),
            raw: String::new(),
        }
    }

    #[test]
    fn extracts_accession_embedded_in_subject() {
        let rule = AccessionRule::default();
        let acc = rule.extract("GCF_000005845.2_ASM584v2_scaffold_1").unwrap();
        assert_eq!(acc.as_str(), "GCF_000005845.2");
        assert!(rule.extract("NC_000913.3").is_none());
    }

    #[test]
    fn dedupes_repeated_accessions_in_first_seen_order() {
        let rule = AccessionRule::default();
        let hits = vec![
            hit(0, "GCF_000000001.1_a"),
            hit(1, "GCF_000000001.1_b"),
            hit(2, "GCA_000000002.1_c"),
        ];
        let resolved = resolve(&hits, &rule);
        assert_eq!(resolved.accessions.len(), 2);
        assert_eq!(resolved.accessions[0].as_str(), "GCF_000000001.1");
        assert_eq!(resolved.accessions[1].as_str(), "GCA_000000002.1");
        assert_eq!(resolved.duplicates, 1);
        assert!(resolved.unresolvable.is_empty());
    }

    #[test]
    fn unresolvable_hits_are_reported_not_dropped() {
        let rule = AccessionRule::default();
        let hits = vec![hit(0, "GCF_000000001.1_a"), hit(1, "scaffold_77")];
        let resolved = resolve(&hits, &rule);
        assert_eq!(resolved.unresolvable, vec![1]);
        assert_eq!(resolved.by_hit[1], None);
        assert_eq!(resolved.by_hit.len(), 2);
    }

    #[test]
    fn custom_rule_pattern() {
        let rule = AccessionRule::new(r"GC[AF]_[0-9]+\.[0-9]+").unwrap();
        assert!(rule.extract("GCA_123.4").is_some());

        let err = AccessionRule::new("(").unwrap_err();
        assert!(matches!(err, DerepError::InvalidAccessionPattern(_)));
    }
}
