//! Resilient page fetching.
//!
//! Wires together the credential store, session factory, rate limiter,
//! challenge detector and escalation tiers behind a single
//! [`Fetcher::fetch`] call. A challenged URL is escalated at most
//! `max_escalations` times; every other failure is terminal for that URL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use url::Url;

use crate::challenges::core::{
	Document, FetchAttempt, HttpSession, Outcome, SessionError, SessionFactory, TransportError,
};
use crate::challenges::detectors::{ChallengeDetector, ChallengeSignatures};
use crate::challenges::escalation::{HarvestError, TrustHarvester};
use crate::config::{ConfigError, ENV_PREFIX, FetchConfig};
use crate::external_deps::browser::BrowserFallback;
use crate::modules::credentials::{CredentialSet, CredentialStore};
use crate::modules::events::{
	EscalationEvent, EventDispatcher, EventHandler, FailureEvent, FetchEvent, PersistenceEvent,
};
use crate::modules::rate_limit::RateLimiter;

/// Result alias for a single URL.
pub type FetchResult<T> = Result<T, FetchError>;

/// Why a challenged URL could not be cleared.
#[derive(Debug, Error)]
pub enum ChallengeFailure {
	#[error("no escalation tier is configured")]
	NoEscalation,
	#[error("{tier} tier failed: {source}")]
	Harvest {
		tier: String,
		#[source]
		source: HarvestError,
	},
	#[error("still challenged (status {status}) after {attempts} attempts")]
	StillChallenged { status: u16, attempts: u32 },
}

/// Terminal failure for one URL.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("invalid url `{url}`: {source}")]
	InvalidUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},
	#[error(transparent)]
	Transport(#[from] TransportError),
	#[error("{url} returned status {status}")]
	HardStatus { url: Url, status: u16 },
	#[error("{url} is blocked by an anti-bot challenge: {reason}")]
	Challenge { url: Url, reason: ChallengeFailure },
	#[error("could not build a session for {url}: {source}")]
	Session {
		url: Url,
		#[source]
		source: SessionError,
	},
}

impl FetchError {
	pub fn url(&self) -> &str {
		match self {
			FetchError::InvalidUrl { url, .. } => url,
			FetchError::Transport(err) => err.url.as_str(),
			FetchError::HardStatus { url, .. }
			| FetchError::Challenge { url, .. }
			| FetchError::Session { url, .. } => url.as_str(),
		}
	}

	/// Short tag for summaries.
	pub fn kind(&self) -> &'static str {
		match self {
			FetchError::InvalidUrl { .. } => "invalid_url",
			FetchError::Transport(_) => "transport",
			FetchError::HardStatus { .. } => "hard_status",
			FetchError::Challenge { .. } => "challenge",
			FetchError::Session { .. } => "session",
		}
	}
}

/// A URL that failed during a batch.
#[derive(Debug)]
pub struct FetchFailure {
	pub url: String,
	pub error: FetchError,
}

/// Outcome of [`Fetcher::fetch_all`].
#[derive(Debug, Default)]
pub struct BatchReport {
	pub documents: Vec<Document>,
	pub failures: Vec<FetchFailure>,
}

impl BatchReport {
	pub fn attempted(&self) -> usize {
		self.documents.len() + self.failures.len()
	}

	/// True when at least one URL was attempted and none succeeded.
	pub fn all_failed(&self) -> bool {
		self.documents.is_empty() && !self.failures.is_empty()
	}
}

/// Fluent builder for [`Fetcher`].
pub struct FetcherBuilder {
	config: FetchConfig,
	credentials: Option<CredentialStore>,
	rate_limiter: Option<Arc<RateLimiter>>,
	signatures: Option<ChallengeSignatures>,
	harvesters: Vec<Arc<dyn TrustHarvester>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl FetcherBuilder {
	pub fn new() -> Self {
		Self::from_config(FetchConfig::default())
	}

	pub fn from_config(config: FetchConfig) -> Self {
		Self {
			config,
			credentials: None,
			rate_limiter: None,
			signatures: None,
			harvesters: Vec::new(),
			handlers: Vec::new(),
		}
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.config.request_delay_secs = delay.as_secs_f64();
		self
	}

	pub fn with_jitter(mut self, jitter: Duration) -> Self {
		self.config.request_jitter_secs = jitter.as_secs_f64();
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout_secs = timeout.as_secs_f64();
		self
	}

	pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.config.cookie_file = path.into();
		self
	}

	pub fn with_max_escalations(mut self, max: usize) -> Self {
		self.config.max_escalations = max;
		self
	}

	/// Skip the default browser tier.
	pub fn without_browser(mut self) -> Self {
		self.config.browser.enabled = false;
		self
	}

	/// Use this store instead of one built from the cookie file and the process environment.
	pub fn with_credential_store(mut self, store: CredentialStore) -> Self {
		self.credentials = Some(store);
		self
	}

	/// Share a limiter with other fetchers or inspect it from tests.
	pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
		self.rate_limiter = Some(limiter);
		self
	}

	pub fn with_signatures(mut self, signatures: ChallengeSignatures) -> Self {
		self.signatures = Some(signatures);
		self
	}

	/// Append an escalation tier. Explicit tiers replace the default browser tier.
	pub fn with_harvester(mut self, harvester: Arc<dyn TrustHarvester>) -> Self {
		self.harvesters.push(harvester);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn build(self) -> Result<Fetcher, ConfigError> {
		let config = self.config;

		let signatures = match self.signatures {
			Some(signatures) => signatures,
			None => config.signatures()?,
		};

		let harvesters = if !self.harvesters.is_empty() {
			self.harvesters
		} else if config.browser.enabled {
			let browser: Arc<dyn TrustHarvester> = Arc::new(BrowserFallback::new(&config.browser)?);
			vec![browser]
		} else {
			Vec::new()
		};

		let credentials = self
			.credentials
			.unwrap_or_else(|| CredentialStore::from_env(&config.cookie_file, ENV_PREFIX));

		let rate_limiter = self.rate_limiter.unwrap_or_else(|| {
			Arc::new(RateLimiter::new(config.request_delay()).with_jitter(config.request_jitter()))
		});

		let mut events = EventDispatcher::with_logging();
		for handler in self.handlers {
			events.register_handler(handler);
		}

		log::debug!(
			"fetcher ready: delay {:.1}s, {} signatures, tiers [{}]",
			rate_limiter.min_delay().as_secs_f64(),
			signatures.len(),
			harvesters
				.iter()
				.map(|tier| tier.name())
				.collect::<Vec<_>>()
				.join(", ")
		);

		Ok(Fetcher {
			sessions: SessionFactory::new(config.request_timeout()),
			detector: ChallengeDetector::with_signatures(signatures),
			credentials: Arc::new(credentials),
			rate_limiter,
			harvesters,
			events: Arc::new(events),
			config,
		})
	}
}

impl Default for FetcherBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Fetches pages through the challenge-aware state machine.
pub struct Fetcher {
	config: FetchConfig,
	credentials: Arc<CredentialStore>,
	sessions: SessionFactory,
	detector: ChallengeDetector,
	rate_limiter: Arc<RateLimiter>,
	harvesters: Vec<Arc<dyn TrustHarvester>>,
	events: Arc<EventDispatcher>,
}

impl Fetcher {
	/// Configuration from the environment, browser tier included.
	pub fn from_env() -> Result<Self, ConfigError> {
		FetcherBuilder::from_config(FetchConfig::from_env()?).build()
	}

	pub fn builder() -> FetcherBuilder {
		FetcherBuilder::new()
	}

	pub fn config(&self) -> &FetchConfig {
		&self.config
	}

	pub fn credentials(&self) -> &CredentialStore {
		&self.credentials
	}

	pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
		&self.rate_limiter
	}

	pub fn detector(&self) -> &ChallengeDetector {
		&self.detector
	}

	pub fn tier_names(&self) -> Vec<&str> {
		self.harvesters.iter().map(|tier| tier.name()).collect()
	}

	/// Fetch `url` and return the page once it is free of challenges.
	pub async fn fetch(&self, url: &str) -> FetchResult<Document> {
		let parsed = match Url::parse(url) {
			Ok(parsed) => parsed,
			Err(source) => {
				let err = FetchError::InvalidUrl {
					url: url.to_string(),
					source,
				};
				self.report_failure(&err);
				return Err(err);
			}
		};
		self.fetch_url(&parsed).await
	}

	pub async fn fetch_url(&self, url: &Url) -> FetchResult<Document> {
		let result = self.run(url).await;
		if let Err(err) = &result {
			self.report_failure(err);
		}
		result
	}

	/// Fetch every URL in order. Failures are collected, never propagated.
	pub async fn fetch_all<I, S>(&self, urls: I) -> BatchReport
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut report = BatchReport::default();
		for url in urls {
			let url = url.as_ref();
			match self.fetch(url).await {
				Ok(document) => report.documents.push(document),
				Err(error) => report.failures.push(FetchFailure {
					url: url.to_string(),
					error,
				}),
			}
		}
		report
	}

	/// Run the first escalation tier against `url` without a prior request
	/// and merge the result into the credential store.
	pub async fn refresh_credentials(&self, url: &Url) -> Result<CredentialSet, ChallengeFailure> {
		let tier = self
			.harvesters
			.first()
			.ok_or(ChallengeFailure::NoEscalation)?;
		let identity = self.credentials.load();
		self.escalate(tier.as_ref(), url, &identity).await
	}

	async fn run(&self, url: &Url) -> FetchResult<Document> {
		let mut tiers = self.harvesters.iter().take(self.config.max_escalations);
		let mut attempt = 0u32;
		let mut cleared_by: Option<&str> = None;

		loop {
			attempt += 1;
			self.rate_limiter.wait().await;

			let identity = self.credentials.load();
			let session = self.session(url, &identity)?;

			let response = match session.get(url).await {
				Ok(response) => response,
				Err(err) => {
					self.emit_attempt(url, Outcome::HardError, None, attempt, cleared_by);
					return Err(err.into());
				}
			};

			let outcome = self.detector.classify(&response);
			self.emit_attempt(url, outcome, Some(response.status), attempt, cleared_by);

			match outcome {
				Outcome::Success => return Ok(Document::from_response(url.clone(), &response)),
				Outcome::HardError => {
					return Err(FetchError::HardStatus {
						url: url.clone(),
						status: response.status,
					});
				}
				Outcome::Challenged => {
					if let Some(marker) = self.detector.matched_signature(&response.text()) {
						log::debug!("{url} matched challenge marker {marker}");
					}

					let Some(tier) = tiers.next() else {
						let reason = if attempt == 1 {
							ChallengeFailure::NoEscalation
						} else {
							ChallengeFailure::StillChallenged {
								status: response.status,
								attempts: attempt,
							}
						};
						return Err(FetchError::Challenge {
							url: url.clone(),
							reason,
						});
					};

					self.rate_limiter.wait().await;
					self.escalate(tier.as_ref(), url, &identity)
						.await
						.map_err(|reason| FetchError::Challenge {
							url: url.clone(),
							reason,
						})?;
					cleared_by = Some(tier.name());
				}
			}
		}
	}

	fn session(&self, url: &Url, identity: &CredentialSet) -> FetchResult<HttpSession> {
		self.sessions
			.build(identity)
			.map_err(|source| FetchError::Session {
				url: url.clone(),
				source,
			})
	}

	/// Harvest, validate, merge and persist. Returns the fresh cookies.
	async fn escalate(
		&self,
		tier: &dyn TrustHarvester,
		url: &Url,
		identity: &CredentialSet,
	) -> Result<CredentialSet, ChallengeFailure> {
		let started = Instant::now();
		let result = tier.harvest(url, identity).await.and_then(|fresh| {
			if fresh.is_empty() {
				Err(HarvestError::Empty)
			} else if identity.contains_all(&fresh) {
				Err(HarvestError::Unchanged)
			} else {
				Ok(fresh)
			}
		});

		self.events.dispatch(FetchEvent::Escalation(EscalationEvent {
			url: url.clone(),
			tier: tier.name().to_string(),
			success: result.is_ok(),
			detail: match &result {
				Ok(fresh) => format!("{} cookies", fresh.cookies().len()),
				Err(err) => err.to_string(),
			},
			elapsed: started.elapsed(),
			timestamp: Utc::now(),
		}));

		let fresh = result.map_err(|source| ChallengeFailure::Harvest {
			tier: tier.name().to_string(),
			source,
		})?;

		self.credentials.merge(&fresh);
		if let Err(warning) = self.credentials.persist(&fresh) {
			self.events.dispatch(FetchEvent::Persistence(PersistenceEvent {
				path: warning.path().to_path_buf(),
				error: warning.to_string(),
				timestamp: Utc::now(),
			}));
		}

		Ok(fresh)
	}

	fn emit_attempt(
		&self,
		url: &Url,
		outcome: Outcome,
		status: Option<u16>,
		attempt: u32,
		tier: Option<&str>,
	) {
		let mut record = FetchAttempt::new(url.clone(), outcome, status, attempt);
		if let Some(tier) = tier {
			record = record.with_tier(tier);
		}
		self.events.dispatch(FetchEvent::Attempt(record));
	}

	fn report_failure(&self, err: &FetchError) {
		self.events.dispatch(FetchEvent::Failure(FailureEvent {
			url: err.url().to_string(),
			error: err.to_string(),
			timestamp: Utc::now(),
		}));
	}
}

impl std::fmt::Debug for Fetcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Fetcher")
			.field("config", &self.config)
			.field("tiers", &self.tier_names())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_without_profile_fails_when_browser_enabled() {
		let dir = tempfile::tempdir().unwrap();
		let err = FetcherBuilder::new()
			.with_credential_store(CredentialStore::new(
				dir.path().join("cookies.json"),
				CredentialSet::defaults(),
				CredentialSet::new(),
			))
			.build()
			.unwrap_err();
		assert!(matches!(err, ConfigError::ProfileUnset));
	}

	#[test]
	fn build_without_browser_has_no_tiers() {
		let dir = tempfile::tempdir().unwrap();
		let fetcher = FetcherBuilder::new()
			.without_browser()
			.with_delay(Duration::ZERO)
			.with_cookie_file(dir.path().join("cookies.json"))
			.build()
			.unwrap();
		assert!(fetcher.tier_names().is_empty());
		assert_eq!(fetcher.rate_limiter().min_delay(), Duration::ZERO);
		assert_eq!(fetcher.credentials().path(), dir.path().join("cookies.json"));
	}

	#[tokio::test]
	async fn invalid_url_is_reported_per_url() {
		let dir = tempfile::tempdir().unwrap();
		let fetcher = FetcherBuilder::new()
			.without_browser()
			.with_delay(Duration::ZERO)
			.with_cookie_file(dir.path().join("cookies.json"))
			.build()
			.unwrap();

		let report = fetcher.fetch_all(["not a url", "::also-bad"]).await;
		assert_eq!(report.attempted(), 2);
		assert!(report.all_failed());
		assert_eq!(report.failures[0].error.kind(), "invalid_url");
		assert_eq!(report.failures[0].error.url(), "not a url");
	}
}
