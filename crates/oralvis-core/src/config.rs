//! Client configuration.
//!
//! Settings come from the process environment (optionally seeded from a
//! `.env` file by the binary). The API base URL is mandatory: without it the
//! client refuses to start instead of sending requests to an undefined host.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// Application name used for the data directory
pub const APP_NAME: &str = "oralvis";

/// Environment variable holding the backend base URL
pub const API_URL_VAR: &str = "ORALVIS_API_URL";

const TIMEOUT_VAR: &str = "ORALVIS_REQUEST_TIMEOUT_SECS";
const TOKEN_STORE_VAR: &str = "ORALVIS_TOKEN_STORE";
const DATA_DIR_VAR: &str = "ORALVIS_DATA_DIR";

/// HTTP request timeout in seconds.
/// Scan uploads can be large, so this is generous.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ORALVIS_API_URL is not defined")]
    MissingApiUrl,

    #[error("Invalid API URL {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("Invalid request timeout {0:?}")]
    InvalidTimeout(String),

    #[error("Unknown token store {0:?} (expected \"file\" or \"keyring\")")]
    UnknownTokenStore(String),

    #[error("Could not find a data directory")]
    NoDataDir,
}

/// Where the credential is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenStoreKind {
    #[default]
    File,
    Keyring,
}

impl TokenStoreKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim() {
            "file" => Ok(TokenStoreKind::File),
            "keyring" => Ok(TokenStoreKind::Keyring),
            other => Err(ConfigError::UnknownTokenStore(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    api_base_url: Url,
    pub request_timeout: Duration,
    pub token_store: TokenStoreKind,
    pub data_dir: PathBuf,
}

impl Config {
    /// Build a config for the given API base URL with default settings.
    /// Falls back to a relative data directory when the platform has none.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_api_url(api_url)?,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            token_store: TokenStoreKind::default(),
            data_dir: default_data_dir().unwrap_or_else(|_| PathBuf::from(APP_NAME)),
        })
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup(API_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;
        let api_base_url = parse_api_url(&api_url)?;

        let request_timeout = match lookup(TIMEOUT_VAR) {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let token_store = match lookup(TOKEN_STORE_VAR) {
            Some(raw) => TokenStoreKind::parse(&raw)?,
            None => TokenStoreKind::default(),
        };

        let data_dir = match lookup(DATA_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        Ok(Self {
            api_base_url,
            request_timeout,
            token_store,
            data_dir,
        })
    }

    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    /// Absolute URL for an API path such as `/api/scans`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Absolute URL for one resource under `collection`, e.g. `/api/scans/{id}`.
    /// The id is percent-encoded as a single path segment. Ids that cannot
    /// stand as a segment (`""`, `.`, `..`) give `None`.
    pub fn resource_endpoint(&self, collection: &str, id: &str) -> Option<Url> {
        if matches!(id, "" | "." | "..") {
            return None;
        }
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(collection.split('/').filter(|s| !s.is_empty()))
            .push(id);
        Some(url)
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(dir.join(APP_NAME))
}

/// Accepts bare hosts (`api.example.com`) by assuming https.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let formatted = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    Url::parse(&formatted).map_err(|e| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
