use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use calgrid_core::remote::{DEFAULT_CONTAINER, DEFAULT_FETCH_LIMIT};
use calgrid_core::service::{MessageMode, ServiceOptions};

/// Optional `config.toml` in the platform config directory.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Base URL of a `calgrid serve` instance, e.g. `http://192.168.1.20:8080`
    pub remote_url: Option<String>,
    pub api_key: Option<String>,
    pub container: Option<String>,
    pub message_mode: Option<MessageMode>,
    pub fetch_limit: Option<usize>,
}

impl FileConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid config.toml")
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("In {}", path.display()))
    }
}

pub struct Config {
    pub db_path: PathBuf,
    pub remote_db_path: PathBuf,
    pub data_dir: PathBuf,
    pub file: FileConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "calgrid").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let file = FileConfig::load(&proj_dirs.config_dir().join("config.toml"))?;

        Ok(Config {
            db_path: data_dir.join("calgrid.db"),
            remote_db_path: data_dir.join("remote.db"),
            data_dir,
            file,
        })
    }

    /// Service options with CLI overrides applied over the config file.
    pub fn service_options(&self, message_mode: Option<MessageMode>) -> ServiceOptions {
        ServiceOptions {
            container: self
                .file
                .container
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            message_mode: message_mode
                .or(self.file.message_mode)
                .unwrap_or_default(),
            fetch_limit: self.file.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
        }
    }

    /// Remote URL and key, CLI/env values first.
    pub fn remote_endpoint(
        &self,
        url: Option<String>,
        api_key: Option<String>,
    ) -> Option<(String, Option<String>)> {
        let url = url.or_else(|| self.file.remote_url.clone())?;
        Some((url, api_key.or_else(|| self.file.api_key.clone())))
    }

    /// Load the server's API key from disk, or generate a new one.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Set it on clients with CALGRID_API_KEY or api_key in config.toml");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(file: FileConfig) -> Config {
        Config {
            db_path: PathBuf::from("calgrid.db"),
            remote_db_path: PathBuf::from("remote.db"),
            data_dir: PathBuf::from("."),
            file,
        }
    }

    #[test]
    fn test_parse_full_file() {
        let file = FileConfig::parse(
            r#"
            remote_url = "http://127.0.0.1:8080"
            api_key = "secret"
            container = "test.container"
            message_mode = "overlay"
            fetch_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(file.remote_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(file.message_mode, Some(MessageMode::Overlay));
        assert_eq!(file.fetch_limit, Some(50));
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
        assert!(FileConfig::parse("remote = 1").is_err());
        assert!(FileConfig::parse("message_mode = \"both\"").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(file, FileConfig::default());
    }

    #[test]
    fn test_service_options_precedence() {
        let cfg = config(FileConfig {
            message_mode: Some(MessageMode::Overlay),
            ..FileConfig::default()
        });
        assert_eq!(cfg.service_options(None).message_mode, MessageMode::Overlay);
        assert_eq!(
            cfg.service_options(Some(MessageMode::Seeded)).message_mode,
            MessageMode::Seeded
        );
        assert_eq!(cfg.service_options(None).container, DEFAULT_CONTAINER);
        assert_eq!(cfg.service_options(None).fetch_limit, 100);
    }

    #[test]
    fn test_remote_endpoint_precedence() {
        let cfg = config(FileConfig {
            remote_url: Some("http://file".into()),
            api_key: Some("file-key".into()),
            ..FileConfig::default()
        });
        assert_eq!(
            cfg.remote_endpoint(None, None),
            Some(("http://file".to_string(), Some("file-key".to_string())))
        );
        assert_eq!(
            cfg.remote_endpoint(Some("http://flag".into()), Some("flag-key".into())),
            Some(("http://flag".to_string(), Some("flag-key".to_string())))
        );
        assert_eq!(config(FileConfig::default()).remote_endpoint(None, None), None);
    }

    #[test]
    fn test_api_key_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            data_dir: dir.path().to_path_buf(),
            ..config(FileConfig::default())
        };
        let key = cfg.load_or_create_api_key().unwrap();
        assert_eq!(key.len(), 64);
        assert_eq!(cfg.load_or_create_api_key().unwrap(), key);
    }
}
