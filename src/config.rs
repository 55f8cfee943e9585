use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::sandbox::{DEFAULT_BODY_PLACEHOLDER_TAG, DEFAULT_HEAD_PLACEHOLDER_TAG};

pub const CONFIG_ENV_VAR: &str = "DOM_SANDBOX_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read sandbox config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid URL for app '{name}': {source}")]
    InvalidAppUrl {
        name: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Deserialize)]
struct RawAppConfig {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSandboxConfig {
    head_placeholder_tag: String,
    body_placeholder_tag: String,
    apps: Vec<RawAppConfig>,
}

impl Default for RawSandboxConfig {
    fn default() -> Self {
        Self {
            head_placeholder_tag: DEFAULT_HEAD_PLACEHOLDER_TAG.to_string(),
            body_placeholder_tag: DEFAULT_BODY_PLACEHOLDER_TAG.to_string(),
            apps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub name: String,
    pub url: Url,
}

/// Host-side sandbox settings.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub head_placeholder_tag: String,
    pub body_placeholder_tag: String,
    pub apps: Vec<AppConfig>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            head_placeholder_tag: DEFAULT_HEAD_PLACEHOLDER_TAG.to_string(),
            body_placeholder_tag: DEFAULT_BODY_PLACEHOLDER_TAG.to_string(),
            apps: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Reads the YAML file at `config_path`; no path or a missing file yields the defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let raw = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)?
            }
            _ => RawSandboxConfig::default(),
        };

        let apps = raw
            .apps
            .into_iter()
            .map(|app| match Url::parse(&app.url) {
                Ok(url) => Ok(AppConfig {
                    name: app.name,
                    url,
                }),
                Err(source) => Err(ConfigError::InvalidAppUrl {
                    name: app.name,
                    source,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            head_placeholder_tag: raw.head_placeholder_tag,
            body_placeholder_tag: raw.body_placeholder_tag,
            apps,
        })
    }

    /// Like [`SandboxConfig::load`], taking the path from `DOM_SANDBOX_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
    }

    pub fn app(&self, name: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_default() {
        let config = SandboxConfig::load(None).unwrap();
        assert_eq!(config.body_placeholder_tag, "micro-app-body");
        assert_eq!(config.head_placeholder_tag, "micro-app-head");
        assert!(config.apps.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config =
            SandboxConfig::load(Some(PathBuf::from("/definitely/not/here.yaml"))).unwrap();
        assert!(config.apps.is_empty());
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "body_placeholder_tag: sub-body\napps:\n  - name: child\n    url: https://host/app/"
        )
        .unwrap();

        let config = SandboxConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.body_placeholder_tag, "sub-body");
        assert_eq!(config.head_placeholder_tag, "micro-app-head");
        assert_eq!(
            config.app("child").map(|app| app.url.as_str()),
            Some("https://host/app/")
        );
    }

    #[test]
    fn rejects_relative_app_url() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "apps:\n  - name: child\n    url: app/").unwrap();

        let err = SandboxConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAppUrl { ref name, .. } if name == "child"));
    }
}
