use crate::error::{Result, StoreError};
use eegp_lib::{features::VarianceEstimator, preprocessing::IcaConfig};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// File name looked up in the workspace root.
pub const CONFIG_FILE: &str = "eegp.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory, relative to the workspace root, holding record tables.
    pub csv_dir: PathBuf,
    /// Scratch directory for rendered images.
    pub tmp_dir: PathBuf,
    /// JSON snapshot of the repository; in-memory only when unset.
    pub snapshot: Option<PathBuf>,
    pub render: RenderConfig,
    pub ica: IcaConfig,
    pub features: FeatureConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            csv_dir: PathBuf::from("csvs"),
            tmp_dir: PathBuf::from("tmp"),
            snapshot: Some(PathBuf::from("eegp.json")),
            render: RenderConfig::default(),
            ica: IcaConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub epochs_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: eegp_lib::plot::figures::WIDTH,
            height: eegp_lib::plot::figures::HEIGHT,
            epochs_height: eegp_lib::plot::figures::EPOCHS_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub variance: VarianceEstimator,
}

impl StoreConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| StoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load_from_root(root: &Path) -> Result<Self> {
        Self::load(&root.join(CONFIG_FILE))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config {
            path: PathBuf::from(CONFIG_FILE),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::load_from_root(dir.path()).unwrap();
        assert_eq!(config.csv_dir, PathBuf::from("csvs"));
        assert_eq!(config.ica.seed, 97);
        assert_eq!(config.features.variance, VarianceEstimator::Population);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "csv_dir = \"data\"\n[features]\nvariance = \"final-deviation\"\n[ica]\nmax_iter = 50\n",
        )
        .unwrap();
        let config = StoreConfig::load_from_root(dir.path()).unwrap();
        assert_eq!(config.csv_dir, PathBuf::from("data"));
        assert_eq!(config.features.variance, VarianceEstimator::FinalDeviation);
        assert_eq!(config.ica.max_iter, 50);
        assert_eq!(config.ica.seed, 97);
        assert_eq!(config.render.width, 1150);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "csv_dir = [").unwrap();
        let err = StoreConfig::load_from_root(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = StoreConfig::default().to_toml().unwrap();
        let back: StoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.tmp_dir, PathBuf::from("tmp"));
    }
}
