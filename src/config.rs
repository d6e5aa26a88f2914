//! Engine configuration: TOML file, then environment overrides, then validation

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::levels::PermissionLevel;
use crate::model::SpaceDefaults;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub tree: TreeConfig,
    pub defaults: DefaultsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub map_size_mb: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: usize,
}

/// Fallback for spaces with no defaults registered in the directory
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DefaultsConfig {
    /// `"none"` disables the space grant
    #[serde(deserialize_with = "level_or_none")]
    pub page_permission_level: Option<PermissionLevel>,
    pub public_pages: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn parse_default_level(s: &str) -> crate::error::Result<Option<PermissionLevel>> {
    match s {
        "none" | "" => Ok(None),
        other => other.parse().map(Some),
    }
}

fn level_or_none<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<PermissionLevel>, D::Error> {
    let s = String::deserialize(d)?;
    parse_default_level(&s).map_err(serde::de::Error::custom)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./canopy-data"),
            map_size_mb: 1024,
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_depth: crate::db::DEFAULT_MAX_DEPTH }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            page_permission_level: Some(PermissionLevel::FullAccess),
            public_pages: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            Self::from_toml(&contents)?
        } else {
            EngineConfig::default()
        };

        config.apply_overrides(|k| std::env::var(k).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str::<EngineConfig>(contents).map_err(|e| ConfigError::ParseToml(e.to_string()))
    }

    /// Apply `CANOPY_*` overrides read through `get`; unparsable values are ignored
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("CANOPY_STORAGE_PATH") {
            self.storage.path = PathBuf::from(v);
        }
        if let Some(n) = get("CANOPY_STORAGE_MAP_SIZE_MB").and_then(|v| v.parse().ok()) {
            self.storage.map_size_mb = n;
        }
        if let Some(n) = get("CANOPY_TREE_MAX_DEPTH").and_then(|v| v.parse().ok()) {
            self.tree.max_depth = n;
        }
        if let Some(level) = get("CANOPY_DEFAULT_PAGE_PERMISSION_LEVEL").and_then(|v| parse_default_level(&v).ok()) {
            self.defaults.page_permission_level = level;
        }
        if let Some(b) = get("CANOPY_DEFAULT_PUBLIC_PAGES").and_then(|v| v.parse().ok()) {
            self.defaults.public_pages = b;
        }
        if let Some(v) = get("CANOPY_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = get("CANOPY_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.map_size_mb == 0 {
            return Err(ConfigError::Validation(
                "storage.map_size_mb must be non-zero".to_string(),
            ));
        }
        if self.tree.max_depth == 0 {
            return Err(ConfigError::Validation(
                "tree.max_depth must be non-zero".to_string(),
            ));
        }
        if self.defaults.page_permission_level == Some(PermissionLevel::Custom) {
            return Err(ConfigError::Validation(
                "defaults.page_permission_level cannot be custom".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn map_size_bytes(&self) -> usize {
        self.storage.map_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn space_defaults(&self) -> SpaceDefaults {
        SpaceDefaults {
            default_level: self.defaults.page_permission_level,
            public_pages: self.defaults.public_pages,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn default_config_has_sensible_values() {
        let config = EngineConfig::default();

        assert_eq!(config.storage.path, PathBuf::from("./canopy-data"));
        assert_eq!(config.storage.map_size_mb, 1024);
        assert_eq!(config.tree.max_depth, 256);
        assert_eq!(config.defaults.page_permission_level, Some(PermissionLevel::FullAccess));
        assert!(!config.defaults.public_pages);
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canopy.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[storage]
path = "/var/lib/canopy"

[tree]
max_depth = 32

[defaults]
page_permission_level = "view"
public_pages = true

[log]
format = "pretty"
level = "debug"
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(path.as_path())).unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/var/lib/canopy"));
        assert_eq!(config.storage.map_size_mb, 1024);
        assert_eq!(config.tree.max_depth, 32);
        assert_eq!(config.defaults.page_permission_level, Some(PermissionLevel::View));
        assert!(config.defaults.public_pages);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn overrides_win_over_toml() {
        let mut config = EngineConfig::from_toml("[tree]\nmax_depth = 32\n").unwrap();
        config.apply_overrides(env(&[
            ("CANOPY_TREE_MAX_DEPTH", "8"),
            ("CANOPY_STORAGE_MAP_SIZE_MB", "64"),
            ("CANOPY_DEFAULT_PAGE_PERMISSION_LEVEL", "none"),
            ("CANOPY_DEFAULT_PUBLIC_PAGES", "true"),
            ("CANOPY_LOG_FORMAT", "pretty"),
        ]));
        assert_eq!(config.tree.max_depth, 8);
        assert_eq!(config.map_size_bytes(), 64 * 1024 * 1024);
        assert_eq!(config.space_defaults(), SpaceDefaults { default_level: None, public_pages: true });
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn unparsable_overrides_are_ignored() {
        let mut config = EngineConfig::default();
        config.apply_overrides(env(&[
            ("CANOPY_TREE_MAX_DEPTH", "deep"),
            ("CANOPY_DEFAULT_PAGE_PERMISSION_LEVEL", "owner"),
            ("CANOPY_LOG_FORMAT", "xml"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn none_disables_the_default_space_grant() {
        let config = EngineConfig::from_toml("[defaults]\npage_permission_level = \"none\"\n").unwrap();
        assert_eq!(config.defaults.page_permission_level, None);
        assert!(EngineConfig::from_toml("[defaults]\npage_permission_level = \"owner\"\n").is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/canopy.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(_, _)));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = EngineConfig::from_toml("[tree\nmax_depth = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml(_)));
    }

    #[test]
    fn validation_rejects_zero_and_custom() {
        let mut config = EngineConfig::default();
        config.tree.max_depth = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = EngineConfig::default();
        config.storage.map_size_mb = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.defaults.page_permission_level = Some(PermissionLevel::Custom);
        assert!(config.validate().is_err());
    }
}
