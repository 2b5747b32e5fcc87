//! Configuration – reads/writes `~/.triad/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use triad_kernel::DEFAULT_ERROR_INDICATORS;
use triad_memory::BootConfig;
use triad_runtime::SchedulerConfig;

/// Persisted user configuration stored in `~/.triad/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file holding run history. Empty keeps history in memory.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Case-insensitive substrings that mark a node payload as failed.
    #[serde(default = "default_error_indicators")]
    pub error_indicators: Vec<String>,

    /// Boot scoring weights and limits.
    #[serde(default)]
    pub boot: BootConfig,
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_db_path() -> String {
    PathBuf::from(home_dir())
        .join(".triad")
        .join("runs.db")
        .to_string_lossy()
        .into_owned()
}

fn default_error_indicators() -> Vec<String> {
    DEFAULT_ERROR_INDICATORS.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            error_indicators: default_error_indicators(),
            boot: BootConfig::default(),
        }
    }
}

impl Config {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            boot: self.boot.clone(),
            error_indicators: self.error_indicators.clone(),
            persistence_path: (!self.db_path.trim().is_empty()).then(|| self.db_path.clone()),
        }
    }
}

/// Return the path to `~/.triad/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".triad").join("config.toml")
}

/// Load the config from disk and apply `TRIAD_*` overrides. Returns `None`
/// if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    cfg.boot
        .validate()
        .map_err(|e| format!("Invalid boot settings after env overrides: {}", e))?;
    Ok(Some(cfg))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    cfg.boot
        .validate()
        .map_err(|e| format!("Invalid boot settings in {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `TRIAD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TRIAD_DB_PATH` | `db_path` |
/// | `TRIAD_BOOT_THRESHOLD` | `boot.threshold` |
/// | `TRIAD_BOOT_TOP_K` | `boot.top_k` |
///
/// Unparseable numbers and a zero `top_k` are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TRIAD_DB_PATH") {
        cfg.db_path = v;
    }
    if let Ok(v) = std::env::var("TRIAD_BOOT_THRESHOLD") {
        match v.trim().parse::<f64>() {
            Ok(t) if t.is_finite() => cfg.boot.threshold = t,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("TRIAD_BOOT_TOP_K") {
        match v.trim().parse::<usize>() {
            Ok(k) if k > 0 => cfg.boot.top_k = k,
            _ => {}
        }
    }
}

/// Save the config to disk, creating `~/.triad/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
