//! Escalation tiers.
//!
//! When a plain HTTP request is challenged, the fetcher hands the URL to the
//! next [`TrustHarvester`] in its list. A tier returns fresh cookies that the
//! retried request presents to the site.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::modules::credentials::CredentialSet;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("harvest timed out after {0:?}")]
    Timeout(Duration),
    #[error("no `{cookie}` cookie issued for {host}")]
    NoClearance { cookie: String, host: String },
    #[error("harvest returned no cookies")]
    Empty,
    #[error("harvest returned only cookies the session already had")]
    Unchanged,
}

/// A way of obtaining fresh trust tokens for a challenged URL.
#[async_trait]
pub trait TrustHarvester: Send + Sync {
    /// Short label used in logs and events.
    fn name(&self) -> &str;

    /// Solve whatever stands in front of `url` and return the cookies issued.
    ///
    /// `identity` is the set the challenged request was made with; tiers that
    /// drive a browser should present the same User-Agent.
    async fn harvest(&self, url: &Url, identity: &CredentialSet) -> Result<CredentialSet, HarvestError>;
}
