use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::db::{DatabaseSelection, DbTarget};
use crate::error::{ConfigError, EtlError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "pudl.toml";

/// Runtime settings. Read from `pudl.toml` when present, then overridden by
/// `PUDL_*` environment variables (a `.env` file is honoured).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the published partitions: `<data_root>/<source>/<year>/<table>.csv`.
    pub data_root: PathBuf,
    /// Directory holding disposable test databases.
    pub test_dir: PathBuf,
    pub live: LiveSettings,
    pub databases: DatabaseSelection,
    /// Keep the scratch EIA staging databases after an integrated load.
    pub retain_staging: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    pub ferc1_db: Option<PathBuf>,
    pub pudl_db: Option<PathBuf>,
    pub eia923_db: Option<PathBuf>,
    pub eia860_db: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            test_dir: env::temp_dir().join("pudl_etl_test"),
            live: LiveSettings::default(),
            databases: DatabaseSelection::default(),
            retain_staging: false,
        }
    }
}

impl Settings {
    /// Load `pudl.toml` from the working directory (if any) plus environment
    /// overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let path = path.as_ref();
        let mut settings = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                EtlError::from(ConfigError::InvalidSetting(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                )))
            })?;
            toml::from_str::<Settings>(&content)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Settings::default()
        };
        settings.apply_env(|key| env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `PUDL_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("PUDL_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PUDL_TEST_DIR") {
            self.test_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PUDL_LIVE_FERC1_DB") {
            self.live.ferc1_db = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PUDL_LIVE_PUDL_DB") {
            self.live.pudl_db = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PUDL_LIVE_FERC1") {
            self.databases.ferc1 = DbTarget::from_live_flag(parse_flag("PUDL_LIVE_FERC1", &v)?);
        }
        if let Some(v) = lookup("PUDL_LIVE_PUDL") {
            self.databases.pudl = DbTarget::from_live_flag(parse_flag("PUDL_LIVE_PUDL", &v)?);
        }
        if let Some(v) = lookup("PUDL_RETAIN_STAGING") {
            self.retain_staging = parse_flag("PUDL_RETAIN_STAGING", &v)?;
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidSetting(format!("{key} must be a boolean, got `{other}`")).into()),
    }
}
