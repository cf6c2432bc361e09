//! Environment-sourced identity overrides.
//!
//! `<PREFIX>_HTTP_HEADER_<NAME>` sets a header, `<PREFIX>_HTTP_COOKIE_<NAME>`
//! sets a cookie. Environment variable names cannot carry hyphens, so header
//! names spell them as a double underscore (`USER__AGENT` -> `USER-AGENT`).
//! Cookie names are taken verbatim because real cookies such as `__cf_bm`
//! start with underscores.

use http::HeaderName;
use thiserror::Error;

use super::CredentialSet;

const HEADER_SEGMENT: &str = "_HTTP_HEADER_";
const COOKIE_SEGMENT: &str = "_HTTP_COOKIE_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscapeError {
    #[error("empty name")]
    Empty,
    #[error("`{0}` contains an ambiguous underscore sequence")]
    Ambiguous(String),
    #[error("`{0}` is not a valid header name")]
    InvalidHeader(String),
    #[error("`{0}` is not a valid cookie name")]
    InvalidCookie(String),
}

/// Encode a header name for use inside an environment variable name.
///
/// Names where an underscore touches another underscore or a hyphen have no
/// unambiguous encoding and are rejected.
pub fn escape_header_name(name: &str) -> Result<String, EscapeError> {
    if name.is_empty() {
        return Err(EscapeError::Empty);
    }
    if name.contains("__") || name.contains("_-") || name.contains("-_") {
        return Err(EscapeError::Ambiguous(name.to_string()));
    }
    Ok(name.replace('-', "__"))
}

/// Reverse [`escape_header_name`].
///
/// An underscore run of even length `2k` becomes `k` hyphens, a lone underscore
/// stays, and odd runs of three or more are rejected.
pub fn unescape_header_name(raw: &str) -> Result<String, EscapeError> {
    if raw.is_empty() {
        return Err(EscapeError::Empty);
    }

    let mut out = String::with_capacity(raw.len());
    let mut run = 0usize;

    let flush = |out: &mut String, run: usize| -> Result<(), EscapeError> {
        match run {
            0 => {}
            1 => out.push('_'),
            n if n % 2 == 0 => out.extend(std::iter::repeat_n('-', n / 2)),
            _ => return Err(EscapeError::Ambiguous(raw.to_string())),
        }
        Ok(())
    };

    for ch in raw.chars() {
        if ch == '_' {
            run += 1;
            continue;
        }
        flush(&mut out, run)?;
        run = 0;
        out.push(ch);
    }
    flush(&mut out, run)?;

    Ok(out)
}

fn validate_cookie_name(name: &str) -> Result<(), EscapeError> {
    if name.is_empty() {
        return Err(EscapeError::Empty);
    }
    let invalid = name
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control() || matches!(ch, '=' | ';' | ','));
    if invalid {
        return Err(EscapeError::InvalidCookie(name.to_string()));
    }
    Ok(())
}

fn header_from_env(raw: &str) -> Result<String, EscapeError> {
    let name = unescape_header_name(raw)?;
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| EscapeError::InvalidHeader(name.clone()))?;
    Ok(name)
}

/// Collect overrides from `(key, value)` pairs such as `std::env::vars()`.
///
/// Keys that carry the prefix but cannot be decoded are skipped with a warning.
/// When two keys decode to the same name, the one seen last wins.
pub fn credentials_from_env<I, K, V>(prefix: &str, vars: I) -> CredentialSet
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let header_prefix = format!("{prefix}{HEADER_SEGMENT}");
    let cookie_prefix = format!("{prefix}{COOKIE_SEGMENT}");
    let mut set = CredentialSet::new();

    for (key, value) in vars {
        let key = key.as_ref();
        if let Some(raw) = key.strip_prefix(&header_prefix) {
            match header_from_env(raw) {
                Ok(name) => {
                    set.insert_header(name, value);
                }
                Err(err) => log::warn!("ignoring environment variable {key}: {err}"),
            }
        } else if let Some(raw) = key.strip_prefix(&cookie_prefix) {
            match validate_cookie_name(raw) {
                Ok(()) => {
                    set.insert_cookie(raw, value);
                }
                Err(err) => log::warn!("ignoring environment variable {key}: {err}"),
            }
        }
    }

    set
}
