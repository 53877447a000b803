use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::domain::Accession;
use crate::error::DerepError;

/// Filesystem layout for one pipeline run: a working root for per-accession
/// scratch space and clustering output, a shared cache of downloaded
/// genomes, and the final artifact directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    work_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
    output_root: Utf8PathBuf,
}

impl Workspace {
    pub fn new(work_root: Utf8PathBuf, output_root: Utf8PathBuf) -> Result<Self, DerepError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("derephit")).ok()
            })
            .ok_or_else(|| {
                DerepError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self {
            work_root,
            cache_root,
            output_root,
        })
    }

    pub fn with_roots(
        work_root: Utf8PathBuf,
        cache_root: Utf8PathBuf,
        output_root: Utf8PathBuf,
    ) -> Self {
        Self {
            work_root,
            cache_root,
            output_root,
        }
    }

    pub fn work_root(&self) -> &Utf8Path {
        &self.work_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    /// Scratch directory exclusive to one accession's acquisition task.
    pub fn genome_work_dir(&self, accession: &Accession) -> Utf8PathBuf {
        self.work_root.join("genomes").join(accession.as_str())
    }

    pub fn genome_cache_dir(&self, accession: &Accession) -> Utf8PathBuf {
        self.cache_root.join("genomes").join(accession.as_str())
    }

    pub fn clustering_dir(&self) -> Utf8PathBuf {
        self.work_root.join("clustering")
    }

    pub fn cleaned_table_path(&self) -> Utf8PathBuf {
        self.output_root.join("cleaned_hits.csv")
    }

    pub fn cluster_report_path(&self) -> Utf8PathBuf {
        self.output_root.join("clusters.tsv")
    }

    pub fn representatives_path(&self) -> Utf8PathBuf {
        self.output_root.join("representatives.txt")
    }

    pub fn ensure_roots(&self) -> Result<(), DerepError> {
        for root in [&self.work_root, &self.cache_root, &self.output_root] {
            fs::create_dir_all(root.as_std_path())
                .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), DerepError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<(), DerepError> {
        fs::create_dir_all(dest.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        for entry in walk_dir(source.as_std_path())? {
            let relative = entry.strip_prefix(source.as_std_path()).unwrap();
            let target = dest.as_std_path().join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| DerepError::Filesystem(err.to_string()))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| DerepError::Filesystem(err.to_string()))?;
                }
                fs::copy(entry, &target).map_err(|err| DerepError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), DerepError> {
        let parent = dest
            .parent()
            .ok_or_else(|| DerepError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        let temp_dir = Builder::new()
            .prefix("derephit-copy")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        let temp_path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .map_err(|_| DerepError::Filesystem("invalid temp dir".to_string()))?;
        Self::copy_dir_recursive(source, &temp_path)?;
        atomic_rename_dir(temp_path.as_std_path(), dest.as_std_path())
            .map_err(|err| DerepError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, DerepError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| DerepError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| DerepError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}
