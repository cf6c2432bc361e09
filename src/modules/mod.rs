//! Cross-cutting services module
//!
//! Identity management, request pacing and lifecycle events shared by the
//! fetcher and the scrapers.

pub mod credentials;
pub mod events;
pub mod rate_limit;

// Re-export commonly used types
pub use credentials::{CredentialSet, CredentialStore, PersistenceWarning};
pub use events::{
    EscalationEvent, EventDispatcher, EventHandler, FailureEvent, FetchEvent, LoggingHandler,
    PersistenceEvent,
};
pub use rate_limit::RateLimiter;
