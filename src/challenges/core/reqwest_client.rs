//! Reqwest-backed HTTP sessions.
//!
//! [`SessionFactory`] turns a [`CredentialSet`] into an [`HttpSession`]: a
//! `reqwest::Client` with the identity headers installed as defaults and a
//! private cookie jar. Cookies are seeded per origin on first contact, including
//! every origin reached through a redirect.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use thiserror::Error;
use url::Url;

use super::FetchResponse;
use crate::modules::credentials::CredentialSet;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Network-level failure: DNS, connect, TLS, timeout or a truncated body.
#[derive(Debug, Error)]
#[error("request to {url} failed: {source}")]
pub struct TransportError {
    pub url: Url,
    #[source]
    pub source: reqwest::Error,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

/// Builds independent sessions from credential snapshots. Never touches the network.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    timeout: Duration,
}

impl Default for SessionFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SessionFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn build(&self, identity: &CredentialSet) -> Result<HttpSession, SessionError> {
        let headers = convert_headers(identity)?;
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()
            .map_err(SessionError::Client)?;

        Ok(HttpSession {
            client,
            jar,
            cookies: identity
                .cookies()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            seeded: Mutex::new(HashSet::new()),
        })
    }
}

/// One client plus its cookie jar.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    cookies: Vec<(String, String)>,
    seeded: Mutex<HashSet<String>>,
}

impl HttpSession {
    /// GET `url`, following redirects, and capture the final response.
    ///
    /// Every hop's origin is seeded before it is contacted. After
    /// `MAX_REDIRECTS` hops the last redirect response is returned as is.
    pub async fn get(&self, url: &Url) -> Result<FetchResponse, TransportError> {
        let transport = |source: reqwest::Error| TransportError {
            url: url.clone(),
            source,
        };

        let mut current = url.clone();
        let mut hops = 0;
        let response = loop {
            self.seed_origin(&current);
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(transport)?;

            match redirect_target(&response) {
                Some(next) if hops < MAX_REDIRECTS => {
                    log::debug!("{current} redirected to {next}");
                    hops += 1;
                    current = next;
                }
                _ => break response,
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?;

        Ok(FetchResponse::new(final_url, status, headers, body))
    }

    /// `Cookie` header the session would send to `url`.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.seed_origin(url);
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    fn seed_origin(&self, url: &Url) {
        if self.cookies.is_empty() {
            return;
        }
        let origin = url.origin().ascii_serialization();
        let Ok(mut seeded) = self.seeded.lock() else {
            return;
        };
        if !seeded.insert(origin) {
            return;
        }

        for (name, value) in &self.cookies {
            self.jar
                .add_cookie_str(&format!("{name}={value}; Path=/"), url);
        }
        log::debug!("seeded {} cookies for {}", self.cookies.len(), url.origin().ascii_serialization());
    }
}

fn redirect_target(response: &reqwest::Response) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    response.url().join(location).ok()
}

fn convert_headers(identity: &CredentialSet) -> Result<HeaderMap, SessionError> {
    let mut map = HeaderMap::new();
    for (name, value) in identity.headers() {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            SessionError::InvalidHeader {
                name: name.clone(),
                reason: err.to_string(),
            }
        })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|err| SessionError::InvalidHeader {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
