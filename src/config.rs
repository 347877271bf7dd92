use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{clog_debug, Error, Result};

/// Default number of concurrently running workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub command: Option<String>,
    pub max_workers: Option<usize>,
    pub runs_dir: Option<String>,
}

impl Config {
    pub fn crew_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".crew"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::crew_dir()?.join("crew.toml"))
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }

    pub fn effective_max_workers(&self) -> usize {
        match self.max_workers {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_WORKERS,
        }
    }

    /// Directory under which run trees are created, when overridden.
    /// The default lives inside the target repository (`<repo>/.crew/runs`).
    pub fn runs_dir_override(&self) -> Option<PathBuf> {
        self.runs_dir.as_deref().map(expand_tilde)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        clog_debug!(
            "Config loaded: command={:?}, max_workers={:?}, runs_dir={:?}",
            config.command,
            config.max_workers,
            config.runs_dir
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let crew_dir = Self::crew_dir()?;
        clog_debug!("Config::save crew_dir={}", crew_dir.display());
        if !crew_dir.exists() {
            fs::create_dir_all(&crew_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
