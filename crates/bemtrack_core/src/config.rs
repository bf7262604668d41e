//! Runtime configuration.
//!
//! Resolution: explicit path (`--config`), then `BEMTRACK_CONFIG`, then
//! `./bemtrack.toml`, then built-in defaults. `BEMTRACK_*` environment
//! overrides apply last.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "BEMTRACK_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "bemtrack.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BemtrackConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub loans: LoanSettings,
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoanSettings {
    /// Days added to the loan date when no due date is given.
    pub default_duration_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReminderConfig {
    pub window_days: u32,
    pub sender: String,
}

impl Default for BemtrackConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("bemtrack.sqlite3"),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: PathBuf::from("logs"),
            loans: LoanSettings::default(),
            reminders: ReminderConfig::default(),
        }
    }
}

impl Default for LoanSettings {
    fn default() -> Self {
        Self {
            default_duration_days: 7,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            window_days: 2,
            sender: "Asset desk".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

impl BemtrackConfig {
    /// Parses one TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves configuration from the process environment.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve_with(explicit, Path::new("."), |key| std::env::var(key).ok())
    }

    /// [`BemtrackConfig::resolve`] with an injectable working directory and
    /// environment lookup.
    pub fn resolve_with(
        explicit: Option<&Path>,
        working_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let from_env = env(CONFIG_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let candidate = explicit.map(Path::to_path_buf).or(from_env);

        let config = match candidate {
            // An explicitly named file must exist.
            Some(path) => Self::load(&path)?,
            None => {
                let local = working_dir.join(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load(&local)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config.with_env_overrides(env))
    }

    /// Applies `BEMTRACK_DATABASE`, `BEMTRACK_LOG_LEVEL` and
    /// `BEMTRACK_LOG_DIR`. Blank values are ignored.
    pub fn with_env_overrides(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = non_blank("BEMTRACK_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(level) = non_blank("BEMTRACK_LOG_LEVEL") {
            self.log_level = level.trim().to_string();
        }
        if let Some(dir) = non_blank("BEMTRACK_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::BemtrackConfig;

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let config: BemtrackConfig = toml::from_str(
            r#"
database_path = "/var/lib/bemtrack/db.sqlite3"

[reminders]
window_days = 5
"#,
        )
        .unwrap();
        assert_eq!(config.database_path.to_str(), Some("/var/lib/bemtrack/db.sqlite3"));
        assert_eq!(config.loans.default_duration_days, 7);
        assert_eq!(config.reminders.window_days, 5);
        assert_eq!(config.reminders.sender, "Asset desk");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed = toml::from_str::<BemtrackConfig>("databse_path = \"x\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn env_overrides_skip_blank_values() {
        let config = BemtrackConfig::default().with_env_overrides(|key| match key {
            "BEMTRACK_LOG_LEVEL" => Some("warn".to_string()),
            "BEMTRACK_DATABASE" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.database_path.to_str(), Some("bemtrack.sqlite3"));
    }
}
