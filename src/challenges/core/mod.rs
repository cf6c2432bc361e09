//! Core utilities shared by the detector, the session layer and the fetcher.

pub mod reqwest_client;
pub mod types;

pub use reqwest_client::{HttpSession, SessionError, SessionFactory, TransportError};
pub use types::{Document, FetchAttempt, FetchResponse, Outcome};
