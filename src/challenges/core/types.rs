//! Core data structures shared across the detector, the session layer and the orchestrator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use url::Url;

/// Minimal representation of an HTTP response captured by an [`HttpSession`](super::HttpSession).
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(url: Url, status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers,
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Classification of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    /// Anti-bot interstitial or 403; the signal to escalate.
    Challenged,
    /// Any other status or a transport failure; never escalated.
    HardError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Challenged => "challenged",
            Outcome::HardError => "hard_error",
        }
    }
}

/// Transient record of one outbound request. Only used for the retry decision and events.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub url: Url,
    pub outcome: Outcome,
    pub http_status: Option<u16>,
    /// 1 for the first request, 2 for the retry after an escalation, and so on.
    pub attempt: u32,
    /// Escalation tier whose cookies this request carried.
    pub tier: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FetchAttempt {
    pub fn new(url: Url, outcome: Outcome, http_status: Option<u16>, attempt: u32) -> Self {
        Self {
            url,
            outcome,
            http_status,
            attempt,
            tier: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }
}

/// Successfully retrieved page handed back to scrapers.
#[derive(Debug, Clone)]
pub struct Document {
    /// URL the caller asked for.
    pub url: Url,
    /// URL after redirects.
    pub final_url: Url,
    pub status: u16,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    pub fn from_response(requested: Url, response: &FetchResponse) -> Self {
        Self {
            url: requested,
            final_url: response.url.clone(),
            status: response.status,
            html: response.text(),
            fetched_at: Utc::now(),
        }
    }
}
