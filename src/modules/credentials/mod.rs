//! Identity management: headers and cookies presented to the site.
//!
//! Three layers are merged, lowest precedence first: built-in defaults,
//! environment overrides and the persisted cookie file. Harvested tokens are
//! merged into the in-memory set and written back to the file.

pub mod env;
mod file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

pub use env::{EscapeError, credentials_from_env, escape_header_name, unescape_header_name};
pub use file::{CookieSnapshot, PersistenceWarning, parse_snapshot, read_snapshot, write_snapshot};

/// Desktop Chrome identity used when nothing else is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Header and cookie mapping. Header names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Browser-like headers every session starts from.
    pub fn defaults() -> Self {
        let mut set = Self::new();
        set.insert_header("user-agent", DEFAULT_USER_AGENT);
        set.insert_header("accept", DEFAULT_ACCEPT);
        set.insert_header("accept-language", DEFAULT_ACCEPT_LANGUAGE);
        set
    }

    pub fn from_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in cookies {
            set.insert_cookie(name, value);
        }
        set
    }

    /// Returns the previous value, if any.
    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into())
    }

    /// Returns the previous value, if any.
    pub fn insert_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.cookies.insert(name.into(), value.into())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.cookies.is_empty()
    }

    /// Copy every entry of `other` into `self`; `other` wins on identical names.
    pub fn overlay(&mut self, other: &CredentialSet) {
        for (name, value) in &other.headers {
            self.headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &other.cookies {
            self.cookies.insert(name.clone(), value.clone());
        }
    }

    pub fn merged(&self, other: &CredentialSet) -> CredentialSet {
        let mut out = self.clone();
        out.overlay(other);
        out
    }

    /// True when every entry of `other` is already present with the same value.
    pub fn contains_all(&self, other: &CredentialSet) -> bool {
        other
            .headers
            .iter()
            .all(|(name, value)| self.headers.get(name) == Some(value))
            && other
                .cookies
                .iter()
                .all(|(name, value)| self.cookies.get(name) == Some(value))
    }

    fn from_snapshot(snapshot: CookieSnapshot) -> Self {
        let mut set = Self::from_cookies(snapshot.cookies);
        for (name, value) in snapshot.headers {
            set.insert_header(name, value);
        }
        set
    }
}

/// Owner of the persisted cookie file and the live credential set.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    defaults: CredentialSet,
    env: CredentialSet,
    layers: RwLock<Layers>,
}

/// Mutable part of the store.
#[derive(Debug, Default)]
struct Layers {
    /// Last successful read of the cookie file.
    file: CredentialSet,
    /// Merged entries that have not reached the file yet.
    unsaved: CredentialSet,
}

impl CredentialStore {
    /// Build a store and perform the initial [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>, defaults: CredentialSet, env: CredentialSet) -> Self {
        let store = Self {
            path: path.into(),
            defaults,
            env,
            layers: RwLock::new(Layers::default()),
        };
        store.load();
        store
    }

    /// Store backed by the process environment using `prefix` (e.g. `PFR`).
    pub fn from_env(path: impl Into<PathBuf>, prefix: &str) -> Self {
        Self::new(
            path,
            CredentialSet::defaults(),
            credentials_from_env(prefix, std::env::vars()),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the cookie file and return the live set: defaults, then
    /// environment, then the file, then merged entries not yet persisted.
    ///
    /// Called before every session build so cookies written by another
    /// process are picked up. An unreadable or corrupt file keeps the last
    /// good read (empty on the first load).
    pub fn load(&self) -> CredentialSet {
        match read_snapshot(&self.path) {
            Ok(snapshot) => {
                let file = snapshot.map(CredentialSet::from_snapshot).unwrap_or_default();
                let mut layers = self.write_layers();
                if layers.file != file {
                    log::debug!(
                        "loaded {} cookies from {}",
                        file.cookies().len(),
                        self.path.display()
                    );
                    layers.file = file;
                }
                self.compose(&layers)
            }
            Err(warning) => {
                log::warn!("{warning}; keeping previously loaded cookies");
                self.snapshot()
            }
        }
    }

    /// Live set without touching the disk.
    pub fn snapshot(&self) -> CredentialSet {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        self.compose(&layers)
    }

    /// Union `fresh` into the live set and return the result.
    pub fn merge(&self, fresh: &CredentialSet) -> CredentialSet {
        let mut layers = self.write_layers();
        layers.unsaved.overlay(fresh);
        self.compose(&layers)
    }

    /// Merge `fresh` into the cookie file on disk.
    ///
    /// Existing file entries not present in `fresh` are kept. Environment
    /// overrides and defaults are never written. On failure the entries stay
    /// in memory for the rest of the run.
    pub fn persist(&self, fresh: &CredentialSet) -> Result<(), PersistenceWarning> {
        let mut snapshot = match read_snapshot(&self.path) {
            Ok(existing) => existing.unwrap_or_default(),
            Err(warning) => {
                log::warn!("{warning}; replacing it");
                CookieSnapshot::default()
            }
        };

        for (name, value) in fresh.cookies() {
            snapshot.cookies.insert(name.clone(), value.clone());
        }
        for (name, value) in fresh.headers() {
            snapshot.headers.insert(name.clone(), value.clone());
        }
        snapshot.captured_at = Some(chrono::Utc::now());
        snapshot.source = Some("browser".to_string());

        write_snapshot(&self.path, &snapshot)?;
        log::info!(
            "persisted {} cookies to {}",
            snapshot.cookies.len(),
            self.path.display()
        );

        let mut layers = self.write_layers();
        layers.file = CredentialSet::from_snapshot(snapshot);
        let unsaved = &mut layers.unsaved;
        unsaved
            .cookies
            .retain(|name, value| fresh.cookies.get(name) != Some(value));
        unsaved
            .headers
            .retain(|name, value| fresh.headers.get(name) != Some(value));
        Ok(())
    }

    fn write_layers(&self) -> RwLockWriteGuard<'_, Layers> {
        self.layers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn compose(&self, layers: &Layers) -> CredentialSet {
        let mut set = self.defaults.merged(&self.env);
        set.overlay(&layers.file);
        set.overlay(&layers.unsaved);
        set
    }
}
