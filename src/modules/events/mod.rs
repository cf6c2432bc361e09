//! Fetch lifecycle events.
//!
//! The fetcher publishes every attempt, escalation and failure here. The
//! default [`LoggingHandler`] turns them into log lines; tests register their
//! own handlers to observe the state machine.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::challenges::core::{FetchAttempt, Outcome};

/// Outcome of handing a challenged URL to an escalation tier.
#[derive(Debug, Clone)]
pub struct EscalationEvent {
    pub url: Url,
    pub tier: String,
    pub success: bool,
    /// Number of cookies harvested, or the failure reason.
    pub detail: String,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Cookie file could not be written; the run continues with in-memory cookies.
#[derive(Debug, Clone)]
pub struct PersistenceEvent {
    pub path: PathBuf,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Terminal failure for a URL.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum FetchEvent {
    Attempt(FetchAttempt),
    Escalation(EscalationEvent),
    Persistence(PersistenceEvent),
    Failure(FailureEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &FetchEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Dispatcher with a [`LoggingHandler`] already registered.
    pub fn with_logging() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&self, event: FetchEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &FetchEvent) {
        match event {
            FetchEvent::Attempt(attempt) => {
                let status = attempt
                    .http_status
                    .map(|status| status.to_string())
                    .unwrap_or_else(|| "-".to_string());
                match attempt.outcome {
                    Outcome::Success => log::debug!(
                        "<- GET {} -> {} (attempt {})",
                        attempt.url,
                        status,
                        attempt.attempt
                    ),
                    outcome => log::info!(
                        "<- GET {} -> {} {} (attempt {})",
                        attempt.url,
                        status,
                        outcome.as_str(),
                        attempt.attempt
                    ),
                }
            }
            FetchEvent::Escalation(escalation) => {
                log::info!(
                    "escalation {} via {} success={} ({}, {:.1}s)",
                    escalation.url,
                    escalation.tier,
                    escalation.success,
                    escalation.detail,
                    escalation.elapsed.as_secs_f64()
                );
            }
            FetchEvent::Persistence(persistence) => {
                log::warn!(
                    "cookie file {} not updated: {}",
                    persistence.path.display(),
                    persistence.error
                );
            }
            FetchEvent::Failure(failure) => {
                log::warn!("failed {} -> {}", failure.url, failure.error);
            }
        }
    }
}
