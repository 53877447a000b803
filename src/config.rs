use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::DerepError;
use crate::resolver::{AccessionRule, DEFAULT_ACCESSION_PATTERN};

/// Default percent-identity cutoff for dereplication.
pub const DEFAULT_IDENTITY_CUTOFF: f64 = 99.0;
/// Default number of accessions acquired per batch.
pub const DEFAULT_BATCH_SIZE: usize = 300;
pub const DEFAULT_CONFIG_FILE: &str = "derephit.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub identity_cutoff: Option<f64>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub accession_pattern: Option<String>,
}

/// Command-line values that win over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub identity_cutoff: Option<f64>,
    pub batch_size: Option<usize>,
    pub work_dir: Option<String>,
    pub output_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub accession_pattern: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub identity_cutoff: f64,
    pub batch_size: usize,
    pub work_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub cache_dir: Option<Utf8PathBuf>,
    pub accession_pattern: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence: CLI override, then config file, then built-in default.
    /// An explicitly named config file must exist; the default one is
    /// optional.
    pub fn resolve(path: Option<&str>, overrides: Overrides) -> Result<Settings, DerepError> {
        let config = match path {
            Some(path) => Self::read_file(&PathBuf::from(path))?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::read_file(&default)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        Self::merge(config, overrides)
    }

    fn read_file(path: &PathBuf) -> Result<ConfigFile, DerepError> {
        let content =
            fs::read_to_string(path).map_err(|_| DerepError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| DerepError::ConfigParse(err.to_string()))
    }

    pub fn merge(config: ConfigFile, overrides: Overrides) -> Result<Settings, DerepError> {
        let identity_cutoff = overrides
            .identity_cutoff
            .or(config.identity_cutoff)
            .unwrap_or(DEFAULT_IDENTITY_CUTOFF);
        if !(identity_cutoff > 0.0 && identity_cutoff <= 100.0) {
            return Err(DerepError::InvalidCutoff(identity_cutoff));
        }

        let batch_size = overrides
            .batch_size
            .or(config.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(DerepError::InvalidBatchSize);
        }

        let accession_pattern = overrides
            .accession_pattern
            .or(config.accession_pattern)
            .unwrap_or_else(|| DEFAULT_ACCESSION_PATTERN.to_string());
        // Fail now rather than after parsing a large table.
        AccessionRule::new(&accession_pattern)?;

        let work_dir = overrides
            .work_dir
            .or(config.work_dir)
            .unwrap_or_else(|| ".derephit".to_string());
        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(|| "derephit_output".to_string());
        let cache_dir = overrides.cache_dir.or(config.cache_dir);

        Ok(Settings {
            identity_cutoff,
            batch_size,
            work_dir: Utf8PathBuf::from(work_dir),
            output_dir: Utf8PathBuf::from(output_dir),
            cache_dir: cache_dir.map(Utf8PathBuf::from),
            accession_pattern,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = ConfigLoader::merge(ConfigFile::default(), Overrides::default()).unwrap();
        assert_eq!(settings.identity_cutoff, DEFAULT_IDENTITY_CUTOFF);
        assert_eq!(settings.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(settings.accession_pattern, DEFAULT_ACCESSION_PATTERN);
        assert_eq!(settings.work_dir, Utf8PathBuf::from(".derephit"));
    }

    #[test]
    fn overrides_win_over_config_file() {
        let config = ConfigFile {
            identity_cutoff: Some(95.0),
            batch_size: Some(50),
            ..ConfigFile::default()
        };
        let overrides = Overrides {
            identity_cutoff: Some(90.0),
            ..Overrides::default()
        };
        let settings = ConfigLoader::merge(config, overrides).unwrap();
        assert_eq!(settings.identity_cutoff, 90.0);
        assert_eq!(settings.batch_size, 50);
    }

    #[test]
    fn out_of_range_cutoff_is_rejected() {
        let overrides = Overrides {
            identity_cutoff: Some(0.0),
            ..Overrides::default()
        };
        let err = ConfigLoader::merge(ConfigFile::default(), overrides).unwrap_err();
        assert_matches!(err, DerepError::InvalidCutoff(_));

        let overrides = Overrides {
            identity_cutoff: Some(100.5),
            ..Overrides::default()
        };
        let err = ConfigLoader::merge(ConfigFile::default(), overrides).unwrap_err();
        assert_matches!(err, DerepError::InvalidCutoff(_));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let overrides = Overrides {
            batch_size: Some(0),
            ..Overrides::default()
        };
        let err = ConfigLoader::merge(ConfigFile::default(), overrides).unwrap_err();
        assert_matches!(err, DerepError::InvalidBatchSize);
    }
}
