use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::DerepError;

const FASTA_EXTENSIONS: [&str; 3] = ["fna", "fa", "fasta"];

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), DerepError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| DerepError::Unpack(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| DerepError::Unpack(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DerepError::Unpack(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(DerepError::Unpack(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| DerepError::Unpack(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| DerepError::Unpack(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| DerepError::Unpack(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| DerepError::Unpack(err.to_string()))?;
    }
    Ok(())
}

pub fn validate_zip(zip_path: &Path) -> Result<(), DerepError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| DerepError::Unpack(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| DerepError::Unpack(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DerepError::Unpack(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| DerepError::Unpack(err.to_string()))?;
    }
    Ok(())
}

/// Decompress a gzip-compressed file to `destination`.
pub fn gunzip_file(gz_path: &Path, destination: &Path) -> Result<(), DerepError> {
    let file = fs::File::open(gz_path)
        .map_err(|err| DerepError::Unpack(format!("open gzip {}: {err}", gz_path.display())))?;
    let mut decoder = GzDecoder::new(file);
    let mut outfile =
        fs::File::create(destination).map_err(|err| DerepError::Unpack(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile).map_err(|err| DerepError::Unpack(err.to_string()))?;
    Ok(())
}

pub fn find_first_fasta(root: &Path) -> Option<PathBuf> {
    let mut found = find_fasta_files(root);
    found.sort();
    found.into_iter().next()
}

pub fn find_fasta_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        if let Ok(entries) = fs::read_dir(&path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path
                    .extension()
                    .and_then(|value| value.to_str())
                    .map(|value| {
                        FASTA_EXTENSIONS
                            .iter()
                            .any(|ext| value.eq_ignore_ascii_case(ext))
                    })
                    .unwrap_or(false)
                {
                    out.push(path);
                }
            }
        }
    }
    out
}
