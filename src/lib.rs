//! # pfr-scraper
//!
//! Pulls statistics pages from Pro-Football-Reference without tripping its
//! Cloudflare protection, and turns them into CSV.
//!
//! The interesting part is the fetch layer: requests carry a browser-like
//! identity, are spaced by a shared rate limiter, and are classified as
//! success, challenge or hard error. A challenged URL is handed to a real
//! Chrome once to harvest fresh clearance cookies, which are merged into the
//! on-disk cookie jar before a single retry.
//!
//! ## Features
//!
//! - Identity from built-in defaults, `PFR_HTTP_*` environment overrides and a
//!   persisted cookie file
//! - Configurable challenge signatures
//! - Bounded browser escalation via `chromiumoxide`
//! - Scrapers for active players, rosters, game logs and depth charts
//!
//! ## Example
//!
//! ```no_run
//! use pfr_scraper::Fetcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Fetcher::from_env()?;
//!     let page = fetcher.fetch("https://www.pro-football-reference.com/players/A/").await?;
//!     println!("{} bytes", page.html.len());
//!     Ok(())
//! }
//! ```

mod fetcher;

pub mod challenges;
pub mod config;
pub mod external_deps;
pub mod modules;
pub mod scrapers;

pub use crate::fetcher::{
    BatchReport,
    ChallengeFailure,
    FetchError,
    FetchFailure,
    FetchResult,
    Fetcher,
    FetcherBuilder,
};

pub use crate::challenges::core::{
    Document,
    FetchAttempt,
    FetchResponse,
    HttpSession,
    Outcome,
    SessionError,
    SessionFactory,
    TransportError,
};

pub use crate::challenges::detectors::{
    ChallengeDetector,
    ChallengeSignatures,
    DEFAULT_SIGNATURES,
    SignatureError,
};

pub use crate::challenges::escalation::{HarvestError, TrustHarvester};

pub use crate::config::{BrowserSettings, ConfigError, DataPaths, FetchConfig};

pub use crate::external_deps::browser::BrowserFallback;

pub use crate::modules::{
    CredentialSet,
    CredentialStore,
    EscalationEvent,
    EventDispatcher,
    EventHandler,
    FailureEvent,
    FetchEvent,
    LoggingHandler,
    PersistenceEvent,
    PersistenceWarning,
    RateLimiter,
};

pub use crate::scrapers::{ScrapeError, ScrapeReport, Scraper};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
