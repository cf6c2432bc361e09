//! On-disk cookie jar.
//!
//! The canonical layout is
//! `{"captured_at": "<rfc3339>", "source": "browser", "cookies": {..}, "headers": {..}}`
//! where everything but `cookies` is optional. The
//! reader also accepts what older tooling left behind: a bare
//! `{"name": "value"}` map, a browser cookie export (`[{"name", "value",
//! "domain", ...}]`) and that export wrapped as `{"cookies": [...]}`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Non-fatal problem with the cookie file. The in-memory session keeps working.
#[derive(Debug, Error)]
pub enum PersistenceWarning {
    #[error("cookie file {path} could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cookie file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cookie file {path} could not be written: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PersistenceWarning {
    pub fn path(&self) -> &Path {
        match self {
            PersistenceWarning::Read { path, .. }
            | PersistenceWarning::Corrupt { path, .. }
            | PersistenceWarning::Write { path, .. } => path,
        }
    }
}

/// Persisted cookie mapping plus capture metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSnapshot {
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub cookies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl CookieSnapshot {
    pub fn capture(cookies: BTreeMap<String, String>) -> Self {
        Self {
            captured_at: Some(Utc::now()),
            cookies,
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieFile {
    Snapshot(CookieSnapshot),
    Wrapped { cookies: Vec<Value> },
    Exported(Vec<Value>),
    Flat(BTreeMap<String, String>),
}

fn exported_pair(entry: &Value) -> Option<(String, String)> {
    let name = entry.get("name")?.as_str()?;
    let value = entry.get("value")?.as_str()?;
    (!name.is_empty()).then(|| (name.to_string(), value.to_string()))
}

fn from_export(entries: &[Value]) -> BTreeMap<String, String> {
    entries.iter().filter_map(exported_pair).collect()
}

/// Parse any supported cookie file layout.
pub fn parse_snapshot(contents: &str) -> Result<CookieSnapshot, serde_json::Error> {
    let snapshot = match serde_json::from_str::<CookieFile>(contents)? {
        CookieFile::Snapshot(snapshot) => snapshot,
        CookieFile::Wrapped { cookies } | CookieFile::Exported(cookies) => CookieSnapshot {
            cookies: from_export(&cookies),
            ..CookieSnapshot::default()
        },
        CookieFile::Flat(cookies) => CookieSnapshot {
            cookies,
            ..CookieSnapshot::default()
        },
    };
    Ok(snapshot)
}

/// Read the snapshot at `path`. A missing file is `Ok(None)`.
pub fn read_snapshot(path: &Path) -> Result<Option<CookieSnapshot>, PersistenceWarning> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceWarning::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    parse_snapshot(&contents)
        .map(Some)
        .map_err(|source| PersistenceWarning::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Replace the file at `path` atomically: write a sibling temp file, then rename over.
pub fn write_snapshot(path: &Path, snapshot: &CookieSnapshot) -> Result<(), PersistenceWarning> {
    let write_err = |source: io::Error| PersistenceWarning::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    serde_json::to_writer_pretty(&mut tmp, snapshot).map_err(|err| write_err(err.into()))?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|err| write_err(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_canonical_snapshot() {
        let snapshot = parse_snapshot(
            r#"{"captured_at": "2025-09-01T12:00:00Z", "cookies": {"cf_clearance": "abc"}}"#,
        )
        .unwrap();
        assert!(snapshot.captured_at.is_some());
        assert_eq!(snapshot.cookies["cf_clearance"], "abc");
    }

    #[test]
    fn reads_flat_map() {
        let snapshot = parse_snapshot(r#"{"cf_clearance": "old"}"#).unwrap();
        assert_eq!(snapshot.captured_at, None);
        assert_eq!(snapshot.cookies.len(), 1);
        assert_eq!(snapshot.cookies["cf_clearance"], "old");
    }

    #[test]
    fn reads_browser_export_and_skips_junk_entries() {
        let exported = r#"[
            {"name": "cf_clearance", "value": "tok", "domain": ".pro-football-reference.com", "path": "/"},
            {"name": "__cf_bm", "value": "bm", "domain": ".pro-football-reference.com"},
            {"value": "nameless"},
            "not-an-object"
        ]"#;
        let snapshot = parse_snapshot(exported).unwrap();
        assert_eq!(snapshot.cookies.len(), 2);
        assert_eq!(snapshot.cookies["__cf_bm"], "bm");

        let wrapped = format!(r#"{{"cookies": {exported}}}"#);
        assert_eq!(parse_snapshot(&wrapped).unwrap().cookies, snapshot.cookies);
    }

    #[test]
    fn corrupt_file_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        fs::write(&path, "{ not json").unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(matches!(err, PersistenceWarning::Corrupt { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snapshot(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn write_creates_parent_directories_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("cf_cookies.json");
        let snapshot = CookieSnapshot::capture(BTreeMap::from([
            ("cf_clearance".to_string(), "new".to_string()),
        ]));

        write_snapshot(&path, &snapshot).unwrap();

        let loaded = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file should have been renamed away");
    }
}
