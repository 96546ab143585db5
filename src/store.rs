use crate::config::Config;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Persists the bridge configuration in the host-provided data directory.
pub struct ConfigStore {
    data_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    /// Read the configuration, or `None` if none has been written yet.
    /// The result is not validated.
    pub fn load(&self) -> Result<Option<Config>, ConfigError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let config = serde_json::from_str(&content)?;
        Ok(Some(config))
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| io_error(&self.data_dir, e))?;
        let path = self.path();
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, content).map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}
