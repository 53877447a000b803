use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8Path;
use tracing::info;

use crate::domain::{Accession, AcquiredGenome, Cluster};
use crate::error::DerepError;
use crate::fs_util;

/// The similarity-clustering engine: partition the acquired genomes at an
/// identity cutoff and name one representative per cluster. Deterministic
/// for identical inputs, so callers never retry.
pub trait ClusteringEngine: Send + Sync {
    fn cluster(
        &self,
        genomes: &[AcquiredGenome],
        identity_cutoff: f64,
        run_dir: &Utf8Path,
    ) -> Result<Vec<Cluster>, DerepError>;
}

const REPRESENTATIVES_DIR: &str = "Dereplicated_Representative_Genomes";
const CLUSTERING_TABLE: &str = "skDER_Clustering.txt";

/// Invokes the external `skder` dereplication tool.
#[derive(Clone)]
pub struct SkderEngine {
    skder: Option<PathBuf>,
}

impl SkderEngine {
    pub fn new() -> Self {
        Self {
            skder: find_in_path("skder"),
        }
    }

    pub fn with_executable(path: PathBuf) -> Self {
        Self { skder: Some(path) }
    }

    pub fn is_available(&self) -> bool {
        self.skder.is_some()
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<(), DerepError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| DerepError::ClusteringFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", program.display())
        } else {
            stderr
        };
        Err(DerepError::ClusteringFailed(message))
    }
}

impl Default for SkderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusteringEngine for SkderEngine {
    fn cluster(
        &self,
        genomes: &[AcquiredGenome],
        identity_cutoff: f64,
        run_dir: &Utf8Path,
    ) -> Result<Vec<Cluster>, DerepError> {
        if genomes.is_empty() {
            return Ok(Vec::new());
        }
        let skder = self
            .skder
            .as_ref()
            .ok_or_else(|| DerepError::MissingTool("skder".to_string()))?;

        // A leftover run dir from a previous invocation would confuse the
        // output parsing below.
        if run_dir.as_std_path().exists() {
            fs::remove_dir_all(run_dir.as_std_path())
                .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        }
        fs::create_dir_all(run_dir.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;

        let mut args = vec!["-g".to_string()];
        args.extend(genomes.iter().map(|genome| genome.sequence_path.to_string()));
        args.push("-o".to_string());
        args.push(run_dir.to_string());
        args.push("-i".to_string());
        args.push(identity_cutoff.to_string());

        info!(genomes = genomes.len(), identity_cutoff, "invoking skder");
        self.run_cmd(skder, &args)?;

        let representatives = list_representatives(run_dir)?;
        let memberships = read_memberships(run_dir)?;
        let acquired: Vec<Accession> = genomes
            .iter()
            .map(|genome| genome.accession.clone())
            .collect();
        build_clusters(&representatives, &memberships, &acquired)
    }
}

fn list_representatives(run_dir: &Utf8Path) -> Result<Vec<Accession>, DerepError> {
    let dir = run_dir.join(REPRESENTATIVES_DIR);
    if !dir.as_std_path().is_dir() {
        return Err(DerepError::ClusteringFailed(format!(
            "missing representative genome directory {dir}"
        )));
    }
    let mut representatives = Vec::new();
    for path in fs_util::find_fasta_files(dir.as_std_path()) {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        match accession_from_genome_name(name) {
            Some(accession) => representatives.push(accession),
            None => {
                return Err(DerepError::ClusteringFailed(format!(
                    "unrecognized representative genome file name: {name}"
                )));
            }
        }
    }
    Ok(representatives)
}

fn read_memberships(run_dir: &Utf8Path) -> Result<Vec<(Accession, Accession)>, DerepError> {
    let table = run_dir.join(CLUSTERING_TABLE);
    if !table.as_std_path().is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(table.as_std_path())
        .map_err(|err| DerepError::Filesystem(err.to_string()))?;
    Ok(parse_clustering_table(&content))
}

/// Each data line is `<member genome>\t<representative genome>`; both sides
/// are genome file paths or names. Lines that carry no accession (the
/// header) are skipped.
pub fn parse_clustering_table(content: &str) -> Vec<(Accession, Accession)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let mut fields = line.split('\t');
        let (Some(member), Some(representative)) = (fields.next(), fields.next()) else {
            continue;
        };
        let member = accession_from_genome_name(basename(member));
        let representative = accession_from_genome_name(basename(representative));
        if let (Some(member), Some(representative)) = (member, representative) {
            pairs.push((member, representative));
        }
    }
    pairs
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Genome files are named `<accession>_<assembly name>…`, so the accession
/// is the join of the first two `_`-separated fields.
pub fn accession_from_genome_name(name: &str) -> Option<Accession> {
    let parts: Vec<&str> = name.splitn(3, '_').collect();
    if parts.len() < 2 {
        return None;
    }
    format!("{}_{}", parts[0], parts[1]).parse().ok()
}

/// Assembles `Cluster` values from engine output, enforcing the partition
/// invariant: every acquired accession lands in exactly one cluster and
/// every representative is a member of its own cluster. Cluster and member
/// order follow acquisition input order, so output is stable across runs.
pub fn build_clusters(
    representatives: &[Accession],
    memberships: &[(Accession, Accession)],
    acquired: &[Accession],
) -> Result<Vec<Cluster>, DerepError> {
    if representatives.is_empty() {
        if acquired.is_empty() {
            return Ok(Vec::new());
        }
        return Err(DerepError::ClusteringFailed(
            "engine reported zero representatives for non-empty input".to_string(),
        ));
    }

    let representative_set: HashSet<&Accession> = representatives.iter().collect();

    let mut member_to_rep: HashMap<Accession, Accession> = HashMap::new();
    for (member, representative) in memberships {
        if !representative_set.contains(representative) {
            return Err(DerepError::ClusteringFailed(format!(
                "clustering table names unknown representative {representative}"
            )));
        }
        if let Some(previous) = member_to_rep.get(member) {
            if previous != representative {
                return Err(DerepError::ClusteringFailed(format!(
                    "{member} is assigned to two clusters"
                )));
            }
            continue;
        }
        member_to_rep.insert(member.clone(), representative.clone());
    }

    // Cluster order follows the first acquired member of each representative.
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut cluster_index: HashMap<Accession, usize> = HashMap::new();
    for accession in acquired {
        let representative = match member_to_rep.get(accession) {
            Some(representative) => representative.clone(),
            None if representative_set.contains(accession) => accession.clone(),
            None => {
                return Err(DerepError::ClusteringFailed(format!(
                    "{accession} is missing from clustering output"
                )));
            }
        };
        let index = match cluster_index.get(&representative) {
            Some(index) => *index,
            None => {
                let index = clusters.len();
                clusters.push(Cluster {
                    id: index + 1,
                    representative: representative.clone(),
                    members: Vec::new(),
                });
                cluster_index.insert(representative, index);
                index
            }
        };
        if !clusters[index].members.contains(accession) {
            clusters[index].members.push(accession.clone());
        }
    }

    for cluster in &clusters {
        if !cluster.contains_representative() {
            return Err(DerepError::ClusteringFailed(format!(
                "representative {} is not a member of its own cluster",
                cluster.representative
            )));
        }
    }

    Ok(clusters)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
