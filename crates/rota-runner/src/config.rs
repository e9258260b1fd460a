use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use rota_core::ForecastWindow;

use crate::engine::DEFAULT_LEASE_TTL_SECS;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Tilde-expanded; relative paths are taken from the project root.
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: ".rota/rota.db".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub lease_ttl_secs: i64,
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { lease_ttl_secs: DEFAULT_LEASE_TTL_SECS, worker_id: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub days: u32,
    #[serde(default)]
    pub max_runs: Option<usize>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { days: ForecastWindow::DEFAULT_DAYS, max_runs: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Append committed runs as JSON lines here in addition to the log.
    #[serde(default)]
    pub jsonl_path: Option<String>,
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse rota.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".rota").join("rota.toml")
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        resolve_path(root, &self.storage.db_path)
    }

    pub fn jsonl_path(&self, root: &Path) -> Option<PathBuf> {
        self.handoff.jsonl_path.as_deref().map(|p| resolve_path(root, p))
    }

    pub fn worker_id(&self) -> String {
        self.engine
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", std::process::id()))
    }
}

fn resolve_path(root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = toml::from_str("[engine]\nlease_ttl_secs = 30\n").unwrap();
        assert_eq!(cfg.engine.lease_ttl_secs, 30);
        assert_eq!(cfg.storage.db_path, ".rota/rota.db");
        assert_eq!(cfg.forecast.days, 7);
        assert!(cfg.handoff.jsonl_path.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let mut cfg = Config::default();
        cfg.forecast.max_runs = Some(3);
        cfg.engine.worker_id = Some("box-1".into());
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
        assert_eq!(cfg.worker_id(), "box-1");
    }

    #[test]
    fn relative_db_path_is_under_root() {
        let root = Path::new("/srv/house");
        let cfg = Config::default();
        assert_eq!(cfg.db_path(root), PathBuf::from("/srv/house/.rota/rota.db"));

        let mut abs = Config::default();
        abs.storage.db_path = "/var/lib/rota.db".into();
        assert_eq!(abs.db_path(root), PathBuf::from("/var/lib/rota.db"));
    }
}
