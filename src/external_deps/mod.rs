//! Integrations that rely on third-party programs.
//!
//! Currently a single adapter that drives a local Chrome over the DevTools
//! protocol to obtain fresh clearance cookies.

pub mod browser;

pub use browser::BrowserFallback;
