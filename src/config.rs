use crate::constants::*;
use crate::errors::{AppError, AppResult};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Run settings with all values filled in (no Options).
///
/// This struct holds the non-secret defaults and can be deserialized by the TOML
/// loader. Missing keys fall back to [`Settings::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory under which the dated report directory is created
    pub output_root: PathBuf,
    /// Value sent in the `X-Requested-With` header on every API call
    pub requested_with: String,
    /// Number of concurrent report downloads (1 keeps downloads sequential)
    pub concurrent_downloads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            requested_with: DEFAULT_REQUESTED_WITH.to_string(),
            concurrent_downloads: 1,
        }
    }
}

impl Settings {
    /// Loads and validates settings from a TOML file.
    ///
    /// Rejects unknown keys so typos are not silently ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the TOML is malformed, unknown keys are present,
    /// or `concurrent_downloads` is zero. Returns `IoError` if the file cannot be read.
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.concurrent_downloads == 0 {
            return Err(AppError::InvalidInput(
                "Concurrent downloads must be greater than 0".into(),
            ));
        }
        if self.requested_with.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "requested_with must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration resolved once at startup and passed by reference to the
/// session and the downloader.
#[derive(Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    /// API base URL, always ending in `/`
    pub base_api_url: String,
    /// Asset API base URL; read for completeness, no endpoint uses it yet
    pub base_asset_url: Option<String>,
    pub settings: Settings,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_api_url", &self.base_api_url)
            .field("base_asset_url", &self.base_asset_url)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Config {
    /// Reads credentials and URLs from the process environment.
    pub fn from_env(settings: Settings) -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), settings)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// `QUALYS_USER`, `QUALYS_PASS` and `BASE_API_URL` are required and must be
    /// non-empty. `BASE_API_URL` must be an absolute URL; a trailing `/` is
    /// appended when missing so endpoint paths can be concatenated onto it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a missing or empty required variable and
    /// `UrlError` if `BASE_API_URL` does not parse.
    pub fn from_lookup<F>(lookup: F, settings: Settings) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> AppResult<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(AppError::InvalidInput(format!("{key} is not set"))),
            }
        };

        let username = required(ENV_USER)?;
        let password = required(ENV_PASS)?;
        let mut base_api_url = required(ENV_BASE_API_URL)?.trim().to_string();
        Url::parse(&base_api_url)?;
        if !base_api_url.ends_with('/') {
            base_api_url.push('/');
        }
        let base_asset_url = lookup(ENV_BASE_ASSET_URL).filter(|v| !v.trim().is_empty());

        settings.validate()?;

        Ok(Self {
            username,
            password,
            base_api_url,
            base_asset_url,
            settings,
        })
    }

    pub fn session_url(&self) -> String {
        format!("{}{SESSION_PATH}", self.base_api_url)
    }

    pub fn report_list_url(&self) -> String {
        format!("{}{REPORT_LIST_PATH}", self.base_api_url)
    }

    /// Download URL for a report: the fetch endpoint with the id appended verbatim.
    pub fn report_download_url(&self, report_id: &str) -> String {
        format!("{}{REPORT_FETCH_PATH}{report_id}", self.base_api_url)
    }
}
