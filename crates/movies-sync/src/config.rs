use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub sqlite_path: PathBuf,
    pub database_url: String,
    pub target_schema: String,
    pub reports_dir: PathBuf,
    pub write_report: bool,
}

/// Optional keys accepted in a YAML config file; present keys win over env.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    pub sqlite_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub target_schema: Option<String>,
    pub reports_dir: Option<PathBuf>,
    pub write_report: Option<bool>,
}

fn truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

impl MigrationConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            sqlite_path: var("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("db.sqlite")),
            database_url: var("DATABASE_URL").unwrap_or_else(|| {
                "postgres://postgres@127.0.0.1:5432/django_movies".to_string()
            }),
            target_schema: var("TARGET_SCHEMA")
                .unwrap_or_else(|| movies_storage::DEFAULT_SCHEMA.to_string()),
            reports_dir: var("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            write_report: var("MOVIES_WRITE_REPORT")
                .map(|v| truthy(&v))
                .unwrap_or(true),
        }
    }

    pub fn with_overlay(mut self, overlay: ConfigOverlay) -> Self {
        if let Some(v) = overlay.sqlite_path {
            self.sqlite_path = v;
        }
        if let Some(v) = overlay.database_url {
            self.database_url = v;
        }
        if let Some(v) = overlay.target_schema {
            self.target_schema = v;
        }
        if let Some(v) = overlay.reports_dir {
            self.reports_dir = v;
        }
        if let Some(v) = overlay.write_report {
            self.write_report = v;
        }
        self
    }

    /// Environment config with the YAML file at `path` laid over it.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let overlay: ConfigOverlay =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::from_env().with_overlay(overlay))
    }

    /// Database URL safe for logs and reports.
    pub fn redacted_database_url(&self) -> String {
        match Url::parse(&self.database_url) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable database url>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = MigrationConfig::from_vars(vars(&[]));
        assert_eq!(config.sqlite_path, PathBuf::from("db.sqlite"));
        assert_eq!(config.target_schema, "content");
        assert!(config.write_report);
    }

    #[test]
    fn env_values_override_defaults() {
        let config = MigrationConfig::from_vars(vars(&[
            ("SQLITE_PATH", "/data/legacy.sqlite"),
            ("TARGET_SCHEMA", "staging"),
            ("MOVIES_WRITE_REPORT", "0"),
        ]));
        assert_eq!(config.sqlite_path, PathBuf::from("/data/legacy.sqlite"));
        assert_eq!(config.target_schema, "staging");
        assert!(!config.write_report);
    }

    #[test]
    fn yaml_overlay_wins_over_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_schema: archive\nwrite_report: false").unwrap();
        let overlay: ConfigOverlay =
            serde_yaml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        let config = MigrationConfig::from_vars(vars(&[("TARGET_SCHEMA", "staging")]))
            .with_overlay(overlay);
        assert_eq!(config.target_schema, "archive");
        assert!(!config.write_report);

        let loaded = MigrationConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(loaded.target_schema, "archive");
    }

    #[test]
    fn unknown_yaml_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_shema: typo").unwrap();
        let err = MigrationConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn password_is_redacted() {
        let config = MigrationConfig::from_vars(vars(&[(
            "DATABASE_URL",
            "postgres://app:s3cret@db:5432/movies",
        )]));
        let redacted = config.redacted_database_url();
        assert!(!redacted.contains("s3cret"));
        assert!(redacted.contains("app:***@db:5432"));
    }
}
