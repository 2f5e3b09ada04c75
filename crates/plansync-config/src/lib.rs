use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use plansync_core::{InvalidLinkPolicy, MigrationOptions};

pub const ENV_PLANSYNC_CONFIG: &str = "PLANSYNC_CONFIG";

const DEFAULT_PREFIX_PROJECT_TO_NODES: bool = false;
const DEFAULT_REMOVE_INVALID_LINKS: bool = false;
const DEFAULT_VALIDATE_REWRITTEN_QUERIES: bool = false;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlansyncConfig {
    #[serde(default)]
    pub migration: MigrationToml,
}

impl Default for PlansyncConfig {
    fn default() -> Self {
        Self {
            migration: MigrationToml::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationToml {
    /// Only migrate subtrees whose root carries this tag; unset migrates
    /// everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_elements_with_tag: Option<String>,
    #[serde(default = "default_prefix_project_to_nodes")]
    pub prefix_project_to_nodes: bool,
    #[serde(default = "default_remove_invalid_links")]
    pub remove_invalid_links: bool,
    #[serde(default = "default_validate_rewritten_queries")]
    pub validate_rewritten_queries: bool,
}

impl Default for MigrationToml {
    fn default() -> Self {
        Self {
            only_elements_with_tag: None,
            prefix_project_to_nodes: DEFAULT_PREFIX_PROJECT_TO_NODES,
            remove_invalid_links: DEFAULT_REMOVE_INVALID_LINKS,
            validate_rewritten_queries: DEFAULT_VALIDATE_REWRITTEN_QUERIES,
        }
    }
}

fn default_prefix_project_to_nodes() -> bool {
    DEFAULT_PREFIX_PROJECT_TO_NODES
}

fn default_remove_invalid_links() -> bool {
    DEFAULT_REMOVE_INVALID_LINKS
}

fn default_validate_rewritten_queries() -> bool {
    DEFAULT_VALIDATE_REWRITTEN_QUERIES
}

impl PlansyncConfig {
    /// The engine-facing view of this configuration.
    pub fn migration_options(&self) -> MigrationOptions {
        MigrationOptions {
            required_tag: self.migration.only_elements_with_tag.clone(),
            prefix_project_to_nodes: self.migration.prefix_project_to_nodes,
            invalid_link_policy: if self.migration.remove_invalid_links {
                InvalidLinkPolicy::Remove
            } else {
                InvalidLinkPolicy::Warn
            },
            validate_rewritten_queries: self.migration.validate_rewritten_queries,
        }
    }
}

pub fn load_from_env() -> Result<PlansyncConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PlansyncConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("plansync").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_PLANSYNC_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(PathBuf::from(raw))
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(err) => Err(ConfigError::configuration(format!(
            "Unable to read {ENV_PLANSYNC_CONFIG}: {err}"
        ))),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn load_or_create_config(path: &Path) -> Result<PlansyncConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let default_config = PlansyncConfig::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    ConfigError::configuration(format!(
                        "Unable to create config directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
            let rendered = toml::to_string_pretty(&default_config).map_err(|err| {
                ConfigError::configuration(format!("Unable to render default config: {err}"))
            })?;
            std::fs::write(path, rendered).map_err(|err| {
                ConfigError::configuration(format!(
                    "Unable to write default config {}: {err}",
                    path.display()
                ))
            })?;
            return Ok(default_config);
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Unable to read config {}: {err}",
                path.display()
            )));
        }
    };

    toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!("Unable to parse config {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{load_from_path, MigrationToml, PlansyncConfig};
    use plansync_core::InvalidLinkPolicy;

    static TEST_PATH_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_config_path(tag: &str) -> PathBuf {
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let counter = TEST_PATH_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "plansync-{tag}-{}-{now_nanos}-{counter}",
            std::process::id(),
        ))
    }

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config: PlansyncConfig = toml::from_str("").expect("parse empty config");
        assert_eq!(config.migration, MigrationToml::default());
        assert!(config.migration.only_elements_with_tag.is_none());
        assert!(!config.migration.prefix_project_to_nodes);
    }

    #[test]
    fn parses_migration_section() {
        let config: PlansyncConfig = toml::from_str(
            r#"
[migration]
only_elements_with_tag = "migrate"
prefix_project_to_nodes = true
remove_invalid_links = true
validate_rewritten_queries = true
"#,
        )
        .expect("parse config");
        assert_eq!(
            config.migration.only_elements_with_tag.as_deref(),
            Some("migrate")
        );
        assert!(config.migration.prefix_project_to_nodes);
        assert!(config.migration.remove_invalid_links);
        assert!(config.migration.validate_rewritten_queries);
    }

    #[test]
    fn migration_options_map_link_policy() {
        let mut config = PlansyncConfig::default();
        assert_eq!(
            config.migration_options().invalid_link_policy,
            InvalidLinkPolicy::Warn
        );
        config.migration.remove_invalid_links = true;
        assert_eq!(
            config.migration_options().invalid_link_policy,
            InvalidLinkPolicy::Remove
        );
    }

    #[test]
    fn load_creates_default_config_when_missing() {
        let dir = unique_config_path("missing");
        let path = dir.join("config.toml");
        let config = load_from_path(&path).expect("load creates defaults");
        assert_eq!(config, PlansyncConfig::default());
        assert!(path.exists(), "default config should be written to disk");
        let reloaded = load_from_path(&path).expect("reload written defaults");
        assert_eq!(reloaded, config);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_rejects_malformed_config() {
        let dir = unique_config_path("malformed");
        std::fs::create_dir_all(&dir).expect("create test dir");
        let path = dir.join("config.toml");
        std::fs::write(&path, "migration = 7").expect("write malformed config");
        let error = load_from_path(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("Unable to parse config"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
