//! Runtime configuration.
//!
//! Everything has a usable default; `PFR_*` environment variables override
//! them and the [`FetcherBuilder`](crate::FetcherBuilder) or CLI flags override
//! those in turn.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::challenges::detectors::{ChallengeSignatures, SignatureError};

/// Prefix for every environment variable the crate reads.
pub const ENV_PREFIX: &str = "PFR";

pub const DEFAULT_COOKIE_FILE: &str = "configs/cf_cookies.json";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_CLEARANCE_COOKIE: &str = "cf_clearance";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("browser fallback is enabled but PFR_BROWSER_PROFILE is not set")]
    ProfileUnset,
    #[error("browser profile directory {0} does not exist")]
    MissingProfile(PathBuf),
    #[error("browser profile {0} is not a directory")]
    ProfileNotDirectory(PathBuf),
    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Browser escalation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub enabled: bool,
    /// Persistent Chrome profile. Must already exist.
    pub profile_dir: Option<PathBuf>,
    pub headed: bool,
    pub timeout_secs: f64,
    /// Chrome binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    pub clearance_cookie: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            profile_dir: None,
            headed: false,
            timeout_secs: 45.0,
            executable: None,
            clearance_cookie: DEFAULT_CLEARANCE_COOKIE.to_string(),
        }
    }
}

impl BrowserSettings {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    /// Resolve and check the profile directory.
    pub fn validated_profile(&self) -> Result<PathBuf, ConfigError> {
        let path = self.profile_dir.clone().ok_or(ConfigError::ProfileUnset)?;
        if !path.exists() {
            return Err(ConfigError::MissingProfile(path));
        }
        if !path.is_dir() {
            return Err(ConfigError::ProfileNotDirectory(path));
        }
        Ok(path)
    }
}

/// Fetch layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub request_delay_secs: f64,
    pub request_jitter_secs: f64,
    pub request_timeout_secs: f64,
    pub cookie_file: PathBuf,
    pub data_dir: PathBuf,
    /// Extra challenge markers appended to the built-in set.
    pub challenge_markers: Vec<String>,
    pub max_escalations: usize,
    pub browser: BrowserSettings,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_delay_secs: 3.0,
            request_jitter_secs: 0.0,
            request_timeout_secs: 10.0,
            cookie_file: PathBuf::from(DEFAULT_COOKIE_FILE),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            challenge_markers: Vec::new(),
            max_escalations: 1,
            browser: BrowserSettings::default(),
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_vars(std::env::vars())
    }

    /// Defaults overridden by any `PFR_*` settings found in `vars`.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let key = key.as_ref();
            let Some(setting) = key
                .strip_prefix(ENV_PREFIX)
                .and_then(|rest| rest.strip_prefix('_'))
            else {
                continue;
            };
            let value = value.as_ref().trim();

            match setting {
                "REQUEST_DELAY_SECS" => config.request_delay_secs = parse_secs(key, value)?,
                "REQUEST_JITTER_SECS" => config.request_jitter_secs = parse_secs(key, value)?,
                "REQUEST_TIMEOUT_SECS" => config.request_timeout_secs = parse_secs(key, value)?,
                "COOKIE_FILE" => config.cookie_file = PathBuf::from(value),
                "DATA_DIR" => config.data_dir = PathBuf::from(value),
                "CHALLENGE_MARKERS" => {
                    config.challenge_markers = value
                        .split(';')
                        .map(str::trim)
                        .filter(|marker| !marker.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "BROWSER_PROFILE" if !value.is_empty() => {
                    config.browser.profile_dir = Some(PathBuf::from(value));
                }
                "BROWSER_ENABLED" => config.browser.enabled = parse_bool(key, value)?,
                "BROWSER_HEADED" => config.browser.headed = parse_bool(key, value)?,
                "BROWSER_TIMEOUT_SECS" => config.browser.timeout_secs = parse_secs(key, value)?,
                "BROWSER_EXECUTABLE" if !value.is_empty() => {
                    config.browser.executable = Some(PathBuf::from(value));
                }
                _ => {}
            }
        }

        Ok(config)
    }

    pub fn request_delay(&self) -> Duration {
        secs(self.request_delay_secs)
    }

    pub fn request_jitter(&self) -> Duration {
        secs(self.request_jitter_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }

    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }

    /// Built-in challenge signatures plus the configured markers.
    pub fn signatures(&self) -> Result<ChallengeSignatures, ConfigError> {
        Ok(ChallengeSignatures::builtin().extended(&self.challenge_markers)?)
    }
}

/// Local directory layout for scraper output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl DataPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Raw HTML snapshots.
    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Parsed CSV output.
    pub fn processed(&self) -> PathBuf {
        self.root.join("processed")
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn parse_secs(key: &str, value: &str) -> Result<f64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let parsed: f64 = value.parse().map_err(|_| invalid("expected a number of seconds"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(invalid("must be a finite, non-negative number"));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FetchConfig::default();
        assert_eq!(config.request_delay(), Duration::from_secs(3));
        assert_eq!(config.request_jitter(), Duration::ZERO);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.browser.timeout(), Duration::from_secs(45));
        assert_eq!(config.cookie_file, PathBuf::from("configs/cf_cookies.json"));
        assert_eq!(config.max_escalations, 1);
        assert_eq!(config.data_paths().processed(), PathBuf::from("data/processed"));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = FetchConfig::from_env_vars([
            ("PFR_REQUEST_DELAY_SECS", "0"),
            ("PFR_REQUEST_JITTER_SECS", "1.5"),
            ("PFR_COOKIE_FILE", "/tmp/cookies.json"),
            ("PFR_BROWSER_PROFILE", "/tmp/profile"),
            ("PFR_BROWSER_HEADED", "yes"),
            ("PFR_BROWSER_ENABLED", "false"),
            ("PFR_CHALLENGE_MARKERS", "verify you are human; ;access denied"),
            ("PFR_HTTP_HEADER_ACCEPT", "ignored-here"),
            ("HOME", "/root"),
        ])
        .unwrap();

        assert_eq!(config.request_delay(), Duration::ZERO);
        assert_eq!(config.request_jitter(), Duration::from_millis(1500));
        assert_eq!(config.cookie_file, PathBuf::from("/tmp/cookies.json"));
        assert_eq!(config.browser.profile_dir, Some(PathBuf::from("/tmp/profile")));
        assert!(config.browser.headed);
        assert!(!config.browser.enabled);
        assert_eq!(config.challenge_markers, vec!["verify you are human", "access denied"]);
        assert_eq!(
            config.signatures().unwrap().len(),
            ChallengeSignatures::builtin().len() + 2
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = FetchConfig::from_env_vars([("PFR_REQUEST_DELAY_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PFR_REQUEST_DELAY_SECS"));
        assert!(FetchConfig::from_env_vars([("PFR_REQUEST_TIMEOUT_SECS", "-1")]).is_err());
        assert!(FetchConfig::from_env_vars([("PFR_BROWSER_HEADED", "maybe")]).is_err());
    }

    #[test]
    fn invalid_marker_is_a_config_error() {
        let config = FetchConfig {
            challenge_markers: vec!["(broken".to_string()],
            ..FetchConfig::default()
        };
        assert!(matches!(config.signatures(), Err(ConfigError::InvalidSignature(_))));
    }

    #[test]
    fn profile_validation() {
        let mut browser = BrowserSettings::default();
        assert!(matches!(browser.validated_profile(), Err(ConfigError::ProfileUnset)));

        let dir = tempfile::tempdir().unwrap();
        browser.profile_dir = Some(dir.path().join("missing"));
        assert!(matches!(browser.validated_profile(), Err(ConfigError::MissingProfile(_))));

        let file = dir.path().join("file");
        std::fs::write(&file, "").unwrap();
        browser.profile_dir = Some(file);
        assert!(matches!(browser.validated_profile(), Err(ConfigError::ProfileNotDirectory(_))));

        browser.profile_dir = Some(dir.path().to_path_buf());
        assert_eq!(browser.validated_profile().unwrap(), dir.path());
    }
}
