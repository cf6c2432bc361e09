//! Chrome-driven escalation tier.
//!
//! Opens the challenged URL in a real Chrome on a persistent profile, lets the
//! interstitial run, and hands back the cookies the site issued once the
//! clearance cookie shows up.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::Cookie;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures_util::stream::StreamExt;
use url::Url;

use crate::challenges::escalation::{HarvestError, TrustHarvester};
use crate::config::{BrowserSettings, ConfigError};
use crate::modules::credentials::{CredentialSet, DEFAULT_USER_AGENT};

const SETTLE_DELAY: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_ATTEMPTS: u32 = 15;

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--lang=en-US",
];

const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
Object.defineProperty(navigator, 'maxTouchPoints', {get: () => 0});
Object.defineProperty(navigator, 'platform', {get: () => 'MacIntel'});
Object.defineProperty(navigator, 'language', {get: () => 'en-US'});
Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
"#;

/// Browser tier backed by `chromiumoxide`.
#[derive(Debug, Clone)]
pub struct BrowserFallback {
    profile_dir: PathBuf,
    executable: Option<PathBuf>,
    headed: bool,
    timeout: Duration,
    clearance_cookie: String,
}

impl BrowserFallback {
    /// Fails when the profile directory is unset or missing.
    pub fn new(settings: &BrowserSettings) -> Result<Self, ConfigError> {
        let profile_dir = settings.validated_profile()?;
        Ok(Self {
            profile_dir,
            executable: settings.executable.clone(),
            headed: settings.headed,
            timeout: settings.timeout(),
            clearance_cookie: settings.clearance_cookie.clone(),
        })
    }

    pub fn profile_dir(&self) -> &PathBuf {
        &self.profile_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn browser_config(&self, user_agent: &str) -> Result<BrowserConfig, HarvestError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&self.profile_dir)
            .request_timeout(self.timeout)
            .args(LAUNCH_ARGS.iter().copied())
            .arg(format!("--user-agent={user_agent}"));

        if self.headed {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(HarvestError::Launch)
    }

    async fn run(&self, url: &Url, user_agent: &str) -> Result<CredentialSet, HarvestError> {
        let host = url.host_str().unwrap_or_default().to_string();
        let config = self.browser_config(user_agent)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| HarvestError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.collect_cookies(&browser, url, &host).await;

        if let Err(err) = browser.close().await {
            log::debug!("browser close failed: {err}");
        }
        let _ = browser.wait().await;
        handler_task.abort();

        result
    }

    async fn collect_cookies(
        &self,
        browser: &Browser,
        url: &Url,
        host: &str,
    ) -> Result<CredentialSet, HarvestError> {
        let browser_err = |err: chromiumoxide::error::CdpError| HarvestError::Browser(err.to_string());

        let page = browser.new_page("about:blank").await.map_err(browser_err)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(browser_err)?;

        log::info!("browser navigating to {url}");
        page.goto(url.as_str()).await.map_err(browser_err)?;
        if let Err(err) = page.wait_for_navigation().await {
            log::debug!("navigation wait for {url} ended early: {err}");
        }
        tokio::time::sleep(SETTLE_DELAY).await;

        for attempt in 1..=POLL_ATTEMPTS {
            let cookies = page.get_cookies().await.map_err(browser_err)?;
            let matching = cookies_for_host(&cookies, host);
            if matching.cookie(&self.clearance_cookie).is_some() {
                log::debug!(
                    "clearance cookie present after {attempt} polls ({} cookies)",
                    matching.cookies().len()
                );
                return Ok(matching);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(HarvestError::NoClearance {
            cookie: self.clearance_cookie.clone(),
            host: host.to_string(),
        })
    }
}

#[async_trait]
impl TrustHarvester for BrowserFallback {
    fn name(&self) -> &str {
        "browser"
    }

    async fn harvest(&self, url: &Url, identity: &CredentialSet) -> Result<CredentialSet, HarvestError> {
        let user_agent = identity.user_agent().unwrap_or(DEFAULT_USER_AGENT);
        let started = Instant::now();

        let harvested = tokio::time::timeout(self.timeout, self.run(url, user_agent))
            .await
            .map_err(|_| HarvestError::Timeout(self.timeout))??;

        log::info!(
            "harvested {} cookies for {} in {:.1}s",
            harvested.cookies().len(),
            url.host_str().unwrap_or_default(),
            started.elapsed().as_secs_f64()
        );
        Ok(harvested)
    }
}

/// Whether a cookie scoped to `domain` is sent to `host`.
pub fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn cookies_for_host(cookies: &[Cookie], host: &str) -> CredentialSet {
    CredentialSet::from_cookies(
        cookies
            .iter()
            .filter(|cookie| domain_matches(&cookie.domain, host))
            .map(|cookie| (cookie.name.clone(), cookie.value.clone())),
    )
}
