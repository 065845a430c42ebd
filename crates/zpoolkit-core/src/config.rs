use crate::error::{ZpoolError, ZpoolResult};
use log::LevelFilter;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How to reach the `zpool` binary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ZpoolCfg {
    /// Explicit binary path; discovered from the usual sbin locations when unset.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ZpoolCfg {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Knobs for discovering importable pools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImportCfg {
    /// Also run `zpool import -D` so destroyed pools are listed.
    #[serde(default = "default_true")]
    pub include_destroyed: bool,

    /// Map raw device tokens to device node paths.
    #[serde(default = "default_true")]
    pub resolve_devices: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ImportCfg {
    fn default() -> Self {
        Self {
            include_destroyed: true,
            resolve_devices: true,
        }
    }
}

/// Output shape of log lines on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// `timestamp level target - message`.
    Plain,
}

impl FromStr for LogFormat {
    type Err = ZpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" | "text" => Ok(LogFormat::Plain),
            other => Err(ZpoolError::InvalidConfig(format!(
                "unknown log format `{}` (expected json or plain)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogCfg {
    /// Level for zpoolkit's own targets; other crates stay at `warn`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ZpoolkitConfig {
    #[serde(default)]
    pub zpool: ZpoolCfg,

    #[serde(default)]
    pub import: ImportCfg,

    #[serde(default)]
    pub log: LogCfg,

    #[serde(skip)]
    pub path: PathBuf,
}

impl ZpoolkitConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ZpoolResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut cfg = if is_toml {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        cfg.path = path.to_path_buf();

        if let Some(issue) = cfg.validate().into_iter().next() {
            return Err(ZpoolError::InvalidConfig(issue));
        }

        Ok(cfg)
    }

    /// Load `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> ZpoolResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("config {} not found; using defaults", path.display());
            Ok(Self {
                path: path.to_path_buf(),
                ..Self::default()
            })
        }
    }

    /// Collect every problem with the loaded settings.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.zpool.timeout_secs == 0 {
            issues.push("zpool.timeout_secs must be greater than zero".to_string());
        }
        if let Some(path) = &self.zpool.path {
            if path.trim().is_empty() {
                issues.push("zpool.path must not be empty when set".to_string());
            }
        }
        if self.log.level.parse::<LevelFilter>().is_err() {
            issues.push(format!("log.level `{}` is not a log level", self.log.level));
        }
        issues
    }

    pub fn zpool_timeout(&self) -> Duration {
        Duration::from_secs(self.zpool.timeout_secs)
    }

    pub fn zpool_binary_path(&self) -> Option<PathBuf> {
        self.zpool.path.as_ref().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_toml_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zpoolkit.toml");
        fs::write(&path, "[zpool]\npath = \"/usr/sbin/zpool\"\n").unwrap();

        let cfg = ZpoolkitConfig::load(&path).unwrap();
        assert_eq!(cfg.zpool_binary_path(), Some(PathBuf::from("/usr/sbin/zpool")));
        assert_eq!(cfg.zpool_timeout(), Duration::from_secs(30));
        assert!(cfg.import.include_destroyed);
        assert!(cfg.import.resolve_devices);
        assert_eq!(cfg.path, path);
    }

    #[test]
    fn load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zpoolkit.yaml");
        fs::write(
            &path,
            "zpool:\n  timeout_secs: 5\nimport:\n  include_destroyed: false\n",
        )
        .unwrap();

        let cfg = ZpoolkitConfig::load(&path).unwrap();
        assert_eq!(cfg.zpool_timeout(), Duration::from_secs(5));
        assert!(!cfg.import.include_destroyed);
        assert!(cfg.zpool_binary_path().is_none());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zpoolkit.toml");
        fs::write(&path, "[zpool]\ntimeout_secs = 0\n").unwrap();

        let err = ZpoolkitConfig::load(&path).unwrap_err();
        assert!(matches!(err, ZpoolError::InvalidConfig(_)));
    }

    #[test]
    fn log_section_parses_and_validates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zpoolkit.toml");
        fs::write(&path, "[log]\nlevel = \"debug\"\nformat = \"plain\"\n").unwrap();
        let cfg = ZpoolkitConfig::load(&path).unwrap();
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.log.format, LogFormat::Plain);

        fs::write(&path, "[log]\nlevel = \"chatty\"\n").unwrap();
        let err = ZpoolkitConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("chatty"), "{}", err);
    }

    #[test]
    fn log_format_from_env_string() {
        assert_eq!(" Plain ".parse::<LogFormat>().unwrap(), LogFormat::Plain);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let cfg = ZpoolkitConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.zpool_timeout(), Duration::from_secs(30));
    }
}
