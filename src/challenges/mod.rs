// Aggregates response classification, HTTP sessions and the escalation tiers used to get past Cloudflare interstitials.

pub mod core;
pub mod detectors;
pub mod escalation;
