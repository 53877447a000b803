use std::collections::HashSet;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use derephit::app::{Pipeline, RunOptions};
use derephit::cluster::{ClusteringEngine, build_clusters};
use derephit::domain::{Accession, AcquiredGenome, Cluster, Verdict};
use derephit::error::DerepError;
use derephit::ncbi::{DownloadInfo, GenomeSource};
use derephit::resolver::AccessionRule;
use derephit::store::Workspace;

/// Serves plain FASTA bundles from memory; listed accessions fail with 404.
#[derive(Default)]
struct MockSource {
    fail: HashSet<String>,
}

impl MockSource {
    fn failing(accessions: &[&str]) -> Self {
        Self {
            fail: accessions.iter().map(|acc| acc.to_string()).collect(),
        }
    }
}

impl GenomeSource for MockSource {
    fn fetch(&self, accession: &Accession, destination: &Path) -> Result<DownloadInfo, DerepError> {
        if self.fail.contains(accession.as_str()) {
            return Err(DerepError::NcbiStatus {
                status: 404,
                message: format!("no assembly for {accession}"),
            });
        }
        fs::write(destination, format!(">{accession} contig1\nACGTACGT\n"))
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        Ok(DownloadInfo {
            is_zip: false,
            is_gzip: false,
        })
    }
}

/// Returns a fixed clustering, restricted to whatever was acquired.
struct StaticEngine {
    memberships: Vec<(&'static str, &'static str)>,
}

impl ClusteringEngine for StaticEngine {
    fn cluster(
        &self,
        genomes: &[AcquiredGenome],
        _identity_cutoff: f64,
        _run_dir: &Utf8Path,
    ) -> Result<Vec<Cluster>, DerepError> {
        for genome in genomes {
            assert!(genome.sequence_path.as_std_path().is_file());
        }
        let acquired: Vec<Accession> = genomes
            .iter()
            .map(|genome| genome.accession.clone())
            .collect();
        let memberships: Vec<(Accession, Accession)> = self
            .memberships
            .iter()
            .map(|(member, rep)| (member.parse().unwrap(), rep.parse().unwrap()))
            .filter(|(member, _)| acquired.contains(member))
            .collect();
        let mut representatives: Vec<Accession> = Vec::new();
        for (_, rep) in &memberships {
            if !representatives.contains(rep) {
                representatives.push(rep.clone());
            }
        }
        build_clusters(&representatives, &memberships, &acquired)
    }
}

fn workspace_in(temp: &Path) -> Workspace {
    Workspace::with_roots(
        Utf8PathBuf::from_path_buf(temp.join("work")).unwrap(),
        Utf8PathBuf::from_path_buf(temp.join("cache")).unwrap(),
        Utf8PathBuf::from_path_buf(temp.join("out")).unwrap(),
    )
}

fn options() -> RunOptions {
    RunOptions {
        identity_cutoff: 99.0,
        batch_size: 2,
        force: false,
        cancel: None,
    }
}

const SCENARIO_TABLE: &str = "\
Organism,Scaffold,Start,End,Score,Query1
Strain A1,GCF_000000001.1_scaffold_1,100,900,1.0,2
Strain A2,GCF_000000001.1_scaffold_2,200,800,0.9,1
Strain B,GCF_000000002.1_scaffold_1,50,700,0.8,1
Strain C1,GCF_000000003.1_scaffold_1,10,500,0.7,2
Strain C2,GCF_000000003.1_scaffold_2,20,600,0.6,1
";

fn write_scenario_table(temp: &Path) -> std::path::PathBuf {
    let input = temp.join("binary.csv");
    fs::write(&input, SCENARIO_TABLE).unwrap();
    input
}

#[test]
fn scenario_keeps_representative_hits_in_input_order() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_scenario_table(temp.path());
    let pipeline = Pipeline::new(
        workspace_in(temp.path()),
        MockSource::default(),
        StaticEngine {
            memberships: vec![
                ("GCF_000000001.1", "GCF_000000001.1"),
                ("GCF_000000002.1", "GCF_000000001.1"),
                ("GCF_000000003.1", "GCF_000000003.1"),
            ],
        },
        AccessionRule::default(),
    );

    let outcome = pipeline.run(&input, &options()).unwrap();
    let result = &outcome.result;

    let rows: Vec<usize> = result.retained.iter().map(|kept| kept.hit.row).collect();
    assert_eq!(rows, vec![0, 1, 3, 4]);
    assert_eq!(result.summary.dropped_hits, 1);
    assert_eq!(result.summary.unverified_hits, 0);
    assert_eq!(result.clusters.len(), 2);

    // G1 absorbed G2; G3 stands alone.
    let absorbed: Vec<&Accession> = result.clusters[0].absorbed().collect();
    assert_eq!(absorbed.len(), 1);
    assert_eq!(absorbed[0].as_str(), "GCF_000000002.1");

    let cleaned = fs::read_to_string(outcome.artifacts.cleaned_table.as_std_path()).unwrap();
    assert!(cleaned.starts_with("Organism,Scaffold,Start,End,Score,Query1\n"));
    assert!(cleaned.contains("Strain A1"));
    assert!(cleaned.contains("Strain C2"));
    assert!(!cleaned.contains("Strain B"));

    let representatives =
        fs::read_to_string(outcome.artifacts.representatives.as_std_path()).unwrap();
    assert_eq!(representatives, "GCF_000000001.1\nGCF_000000003.1\n");
}

#[test]
fn failed_acquisition_is_isolated_and_fails_open() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("binary.csv");
    fs::write(
        &input,
        "Strain A,GCF_000000001.1_s,1,9,1.0,1\n\
         Strain B,GCF_000000002.1_s,1,9,1.0,1\n\
         Strain C,GCF_000000003.1_s,1,9,1.0,1\n",
    )
    .unwrap();

    let pipeline = Pipeline::new(
        workspace_in(temp.path()),
        MockSource::failing(&["GCF_000000002.1"]),
        StaticEngine {
            memberships: vec![
                ("GCF_000000001.1", "GCF_000000001.1"),
                ("GCF_000000003.1", "GCF_000000003.1"),
            ],
        },
        AccessionRule::default(),
    );

    let outcome = pipeline.run(&input, &options()).unwrap();
    let result = &outcome.result;

    // The run completes; exactly B's hit is retained as unverified.
    assert_eq!(result.summary.failed_accessions, 1);
    assert_eq!(result.summary.unverified_hits, 1);
    assert_eq!(result.retained.len(), 3);
    let unverified: Vec<usize> = result
        .retained
        .iter()
        .filter(|kept| kept.verdict == Verdict::Unverified)
        .map(|kept| kept.hit.row)
        .collect();
    assert_eq!(unverified, vec![1]);
}

#[test]
fn rerun_produces_byte_identical_artifacts() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_scenario_table(temp.path());
    let make_pipeline = || {
        Pipeline::new(
            workspace_in(temp.path()),
            MockSource::default(),
            StaticEngine {
                memberships: vec![
                    ("GCF_000000001.1", "GCF_000000001.1"),
                    ("GCF_000000002.1", "GCF_000000001.1"),
                    ("GCF_000000003.1", "GCF_000000003.1"),
                ],
            },
            AccessionRule::default(),
        )
    };

    let first = make_pipeline().run(&input, &options()).unwrap();
    let first_table = fs::read(first.artifacts.cleaned_table.as_std_path()).unwrap();
    let first_clusters = fs::read(first.artifacts.cluster_report.as_std_path()).unwrap();
    let first_reps = fs::read(first.artifacts.representatives.as_std_path()).unwrap();

    // Second run hits the genome cache instead of the network.
    let second = make_pipeline().run(&input, &options()).unwrap();
    assert_eq!(
        fs::read(second.artifacts.cleaned_table.as_std_path()).unwrap(),
        first_table
    );
    assert_eq!(
        fs::read(second.artifacts.cluster_report.as_std_path()).unwrap(),
        first_clusters
    );
    assert_eq!(
        fs::read(second.artifacts.representatives.as_std_path()).unwrap(),
        first_reps
    );
}

#[test]
fn malformed_rows_are_counted_but_do_not_abort() {
    let temp = tempfile::tempdir().unwrap();
    let input = temp.path().join("binary.csv");
    fs::write(
        &input,
        "Strain A,GCF_000000001.1_s,1,9,1.0,1\n\
         bad,row\n\
         Strain C,GCF_000000003.1_s,1,9,1.0,1\n",
    )
    .unwrap();

    let pipeline = Pipeline::new(
        workspace_in(temp.path()),
        MockSource::default(),
        StaticEngine {
            memberships: vec![
                ("GCF_000000001.1", "GCF_000000001.1"),
                ("GCF_000000003.1", "GCF_000000003.1"),
            ],
        },
        AccessionRule::default(),
    );

    let outcome = pipeline.run(&input, &options()).unwrap();
    assert_eq!(outcome.result.summary.total_rows, 3);
    assert_eq!(outcome.result.summary.malformed_rows, 1);
    assert_eq!(outcome.result.summary.parsed_hits, 2);
    assert_eq!(outcome.result.summary.retained_hits, 2);
}

#[test]
fn out_of_range_cutoff_is_rejected_before_any_work() {
    let temp = tempfile::tempdir().unwrap();
    let input = write_scenario_table(temp.path());
    let pipeline = Pipeline::new(
        workspace_in(temp.path()),
        MockSource::default(),
        StaticEngine {
            memberships: Vec::new(),
        },
        AccessionRule::default(),
    );

    let err = pipeline
        .run(
            &input,
            &RunOptions {
                identity_cutoff: 0.0,
                batch_size: 2,
                force: false,
                cancel: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, DerepError::InvalidCutoff(_)));
}
