//! Challenge detection module.
//!
//! Classifies responses into success, soft-block (challenge) or hard failure.
//! Body signatures are plain configuration: the built-in set covers the
//! Cloudflare interstitials seen in the wild, and callers can append their own
//! markers when the target site changes its challenge markup.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::challenges::core::{FetchResponse, Outcome};

/// Built-in challenge page markers.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    r#"<title>\s*Just a moment\.\.\.\s*</title>"#,
    r"window\._cf_chl_opt\s*=",
    r#"cpo\.src\s*=\s*['"]/cdn-cgi/challenge-platform/[^'"]*orchestrate/"#,
    r#"<form[^>]*id=['"]challenge-form['"]"#,
    r#"class=['"]cf-browser-verification"#,
    r#"class=['"]cf-turnstile['"]"#,
    r"<title>\s*Attention Required! \| Cloudflare\s*</title>",
    r"Checking your browser before accessing",
];

static BUILTIN: Lazy<Vec<Regex>> = Lazy::new(|| {
    DEFAULT_SIGNATURES
        .iter()
        .map(|pattern| {
            build_regex(pattern)
                .unwrap_or_else(|err| panic!("invalid challenge detection regex `{}`: {}", pattern, err))
        })
        .collect()
});

/// Raised when a caller-supplied marker is not a valid regular expression.
#[derive(Debug, Error)]
#[error("invalid challenge signature `{pattern}`: {source}")]
pub struct SignatureError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Ordered list of body markers that identify a challenge page.
#[derive(Debug, Clone)]
pub struct ChallengeSignatures {
    patterns: Vec<Regex>,
}

impl Default for ChallengeSignatures {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ChallengeSignatures {
    pub fn builtin() -> Self {
        Self {
            patterns: BUILTIN.clone(),
        }
    }

    /// Signature set with no markers at all; only the status code is considered.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Append caller-supplied markers. Patterns are case-insensitive regular expressions.
    pub fn extended<I, S>(mut self, raw_patterns: I) -> Result<Self, SignatureError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in raw_patterns {
            let raw = raw.as_ref();
            let regex = build_regex(raw).map_err(|source| SignatureError {
                pattern: raw.to_string(),
                source,
            })?;
            self.patterns.push(regex);
        }
        Ok(self)
    }

    /// First marker found in `body`, if any.
    pub fn find(&self, body: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|regex| regex.is_match(body))
            .map(|regex| regex.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Status + signature classifier.
#[derive(Debug, Clone, Default)]
pub struct ChallengeDetector {
    signatures: ChallengeSignatures,
}

impl ChallengeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signatures(signatures: ChallengeSignatures) -> Self {
        Self { signatures }
    }

    pub fn signatures(&self) -> &ChallengeSignatures {
        &self.signatures
    }

    pub fn classify(&self, response: &FetchResponse) -> Outcome {
        self.classify_parts(response.status, &response.text())
    }

    /// A body signature wins over the status code, so a 200 interstitial is still `Challenged`.
    pub fn classify_parts(&self, status: u16, body: &str) -> Outcome {
        if self.signatures.find(body).is_some() {
            return Outcome::Challenged;
        }

        match status {
            200..=299 => Outcome::Success,
            403 => Outcome::Challenged,
            _ => Outcome::HardError,
        }
    }

    /// Marker that triggered a challenge classification, for logging.
    pub fn matched_signature<'a>(&'a self, body: &str) -> Option<&'a str> {
        self.signatures.find(body)
    }
}

fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use http::header::SERVER;
    use url::Url;

    struct ResponseFixture {
        url: Url,
        headers: HeaderMap,
    }

    impl ResponseFixture {
        fn new() -> Self {
            let mut headers = HeaderMap::new();
            headers.insert(SERVER, "cloudflare".parse().unwrap());
            Self {
                url: Url::parse("https://www.pro-football-reference.com/players/A/").unwrap(),
                headers,
            }
        }

        fn response(&self, status: u16, body: &str) -> FetchResponse {
            FetchResponse::new(
                self.url.clone(),
                status,
                self.headers.clone(),
                body.as_bytes().to_vec(),
            )
        }
    }

    const INTERSTITIAL: &str = r#"
        <!DOCTYPE html>
        <html><head><title>Just a moment...</title></head>
        <body>
            <script>window._cf_chl_opt = { cType: 'managed' };</script>
        </body></html>
    "#;

    #[test]
    fn forbidden_is_challenged() {
        let fixture = ResponseFixture::new();
        let detector = ChallengeDetector::new();
        assert_eq!(
            detector.classify(&fixture.response(403, "Forbidden")),
            Outcome::Challenged
        );
    }

    #[test]
    fn ok_with_signature_is_challenged() {
        let fixture = ResponseFixture::new();
        let detector = ChallengeDetector::new();
        assert_eq!(
            detector.classify(&fixture.response(200, INTERSTITIAL)),
            Outcome::Challenged
        );
    }

    #[test]
    fn ok_without_signature_is_success() {
        let fixture = ResponseFixture::new();
        let detector = ChallengeDetector::new();
        let body = r#"<html><head><title>Players | Pro-Football-Reference.com</title></head>
            <body><div id="div_players"></div></body></html>"#;
        assert_eq!(
            detector.classify(&fixture.response(200, body)),
            Outcome::Success
        );
    }

    #[test]
    fn server_error_is_hard_error() {
        let fixture = ResponseFixture::new();
        let detector = ChallengeDetector::new();
        assert_eq!(
            detector.classify(&fixture.response(500, "Internal Server Error")),
            Outcome::HardError
        );
        assert_eq!(
            detector.classify(&fixture.response(404, "Not Found")),
            Outcome::HardError
        );
    }

    #[test]
    fn signature_beats_server_error_status() {
        let detector = ChallengeDetector::new();
        assert_eq!(detector.classify_parts(503, INTERSTITIAL), Outcome::Challenged);
    }

    #[test]
    fn custom_marker_is_honoured() {
        let signatures = ChallengeSignatures::empty()
            .extended(["please verify you are human"])
            .unwrap();
        let detector = ChallengeDetector::with_signatures(signatures);

        assert_eq!(
            detector.classify_parts(200, "<p>Please verify you are HUMAN</p>"),
            Outcome::Challenged
        );
        assert_eq!(detector.classify_parts(200, INTERSTITIAL), Outcome::Success);
    }

    #[test]
    fn invalid_marker_is_reported() {
        let err = ChallengeSignatures::builtin().extended(["(unclosed"]).unwrap_err();
        assert_eq!(err.pattern, "(unclosed");
    }
}
