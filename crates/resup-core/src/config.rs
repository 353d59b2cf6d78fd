use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::control::ItemOptions;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/resup/config.toml`.
///
/// Every field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// HTTP method used to create an upload session.
    pub method: String,
    /// Upload endpoint. May be relative, in which case `base_url` is required.
    pub url: String,
    /// Origin that relative endpoints are resolved against.
    pub base_url: Option<String>,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Bearer token sent as `Authorization`.
    pub token: Option<String>,
    /// Chunk size in bytes; 0 sends the whole file in one request.
    pub chunk_size: u64,
    /// Send the token to session URIs on a different origin than `url`.
    pub with_credentials: bool,
    /// Maximum number of files uploading at once.
    pub concurrency: usize,
    /// Start uploading as soon as files are submitted.
    pub auto_upload: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
    /// Connect timeout per request, in seconds.
    pub connect_timeout_secs: u64,
    /// Hard timeout per request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            method: "POST".to_string(),
            url: "/upload/".to_string(),
            base_url: None,
            headers: BTreeMap::new(),
            token: None,
            chunk_size: 0,
            with_credentials: false,
            concurrency: 2,
            auto_upload: true,
            retry: None,
            connect_timeout_secs: 30,
            request_timeout_secs: 3600,
        }
    }
}

impl UploaderConfig {
    /// Per-file options every new transfer starts from.
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            method: self.method.clone(),
            url: self.url.clone(),
            base_url: self.base_url.clone(),
            headers: self.headers.clone(),
            token: self.token.clone(),
            chunk_size: self.chunk_size,
            with_credentials: self.with_credentials,
            metadata: BTreeMap::new(),
        }
    }

    /// Concurrency bound, never below one.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Effective options of one transfer: the shared config merged with any
/// per-item overrides from an `upload` command.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub method: String,
    pub url: String,
    pub base_url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub token: Option<String>,
    pub chunk_size: u64,
    pub with_credentials: bool,
    /// Extra fields sent in the session-creation body.
    pub metadata: BTreeMap<String, String>,
}

impl UploadOptions {
    /// Merge per-item overrides. Scalars replace, maps extend.
    pub fn merge(&mut self, item: &ItemOptions) {
        if let Some(url) = &item.url {
            self.url = url.clone();
        }
        if let Some(method) = &item.method {
            self.method = method.clone();
        }
        if let Some(token) = &item.token {
            self.token = Some(token.clone());
        }
        if let Some(headers) = &item.headers {
            self.headers
                .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(metadata) = &item.metadata {
            self.metadata
                .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("resup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UploaderConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UploaderConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UploaderConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = UploaderConfig::default();
        assert_eq!(cfg.method, "POST");
        assert_eq!(cfg.url, "/upload/");
        assert_eq!(cfg.chunk_size, 0);
        assert!(!cfg.with_credentials);
        assert_eq!(cfg.concurrency, 2);
        assert!(cfg.auto_upload);
        assert!(cfg.token.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = UploaderConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: UploaderConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.method, cfg.method);
        assert_eq!(parsed.url, cfg.url);
        assert_eq!(parsed.concurrency, cfg.concurrency);
        assert_eq!(parsed.auto_upload, cfg.auto_upload);
    }

    #[test]
    fn config_toml_partial_file_keeps_defaults() {
        let toml = r#"
            url = "https://files.example.com/upload/"
            chunk_size = 1048576
            concurrency = 4

            [headers]
            X-Client = "resup"
        "#;
        let cfg: UploaderConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.url, "https://files.example.com/upload/");
        assert_eq!(cfg.chunk_size, 1_048_576);
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.method, "POST");
        assert!(cfg.auto_upload);
        assert_eq!(cfg.headers.get("X-Client").map(String::as_str), Some("resup"));
        assert!(cfg.retry.is_none());
    }

    #[test]
    fn config_toml_retry_section() {
        let toml = r#"
            token = "secret"

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: UploaderConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.token.as_deref(), Some("secret"));
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert!((retry.base_delay_secs - 0.5).abs() < 1e-9);
        assert_eq!(retry.max_delay_secs, 15);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let cfg = UploaderConfig {
            concurrency: 0,
            ..UploaderConfig::default()
        };
        assert_eq!(cfg.concurrency(), 1);
    }

    #[test]
    fn merge_replaces_scalars_and_extends_maps() {
        let mut cfg = UploaderConfig::default();
        cfg.headers.insert("X-A".into(), "1".into());
        let mut opts = cfg.upload_options();
        let item = ItemOptions {
            url: Some("https://other.example.com/up".into()),
            token: Some("t2".into()),
            headers: Some(BTreeMap::from([("X-B".to_string(), "2".to_string())])),
            metadata: Some(BTreeMap::from([("album".to_string(), "x".to_string())])),
            ..ItemOptions::default()
        };
        opts.merge(&item);
        assert_eq!(opts.url, "https://other.example.com/up");
        assert_eq!(opts.method, "POST");
        assert_eq!(opts.token.as_deref(), Some("t2"));
        assert_eq!(opts.headers.len(), 2);
        assert_eq!(opts.metadata.get("album").map(String::as_str), Some("x"));
    }
}
