//! Per-entity scrapers for Pro-Football-Reference.
//!
//! Each scraper knows which pages to request and how to turn them into
//! records. Fetching, snapshotting and CSV output are shared by
//! [`Scraper::run`].

pub mod active_players;
pub mod output;
pub mod team_depth_chart;
pub mod team_game_logs;
pub mod team_rosters;

use std::path::PathBuf;

use async_trait::async_trait;
use scraper::ElementRef;
use thiserror::Error;

use crate::challenges::core::Document;
use crate::config::DataPaths;
use crate::fetcher::{FetchFailure, Fetcher};

pub use active_players::{ActivePlayerRecord, ActivePlayersScraper};
pub use team_depth_chart::{TeamDepthChartRecord, TeamDepthChartScraper};
pub use team_game_logs::{TeamGameLogRecord, TeamGameLogScraper};
pub use team_rosters::{TeamRosterRecord, TeamRosterScraper};

pub const BASE_URL: &str = "https://www.pro-football-reference.com";

/// Site abbreviations of the 32 current franchises.
pub const DEFAULT_TEAM_CODES: [&str; 32] = [
    "crd", "atl", "rav", "buf", "car", "chi", "cin", "cle", "dal", "den", "det", "gnb", "htx",
    "clt", "jax", "kan", "rai", "sdg", "ram", "mia", "min", "nwe", "nor", "nyg", "nyj", "phi",
    "pit", "sfo", "sea", "tam", "oti", "was",
];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("`{0}` is not a single letter A-Z")]
    InvalidLetter(String),
    #[error("`{0}` is not a team code")]
    InvalidTeam(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write csv {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A row of scraper output.
pub trait Record {
    const HEADER: &'static [&'static str];

    fn row(&self) -> Vec<String>;
}

/// A page to request, keyed by what it covers (a letter or a team code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub key: String,
    pub url: String,
}

/// A fetched page ready for parsing.
#[derive(Debug, Clone)]
pub struct Page {
    pub key: String,
    pub document: Document,
}

impl Page {
    pub fn new(key: impl Into<String>, document: Document) -> Self {
        Self {
            key: key.into(),
            document,
        }
    }

    pub fn html(&self) -> &str {
        &self.document.html
    }
}

/// Summary of one scraper run.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub scraper: String,
    pub pages: usize,
    pub records: usize,
    /// CSV written, if any page was fetched.
    pub output: Option<PathBuf>,
    pub failures: Vec<FetchFailure>,
}

impl ScrapeReport {
    pub fn all_failed(&self) -> bool {
        self.pages == 0 && !self.failures.is_empty()
    }
}

#[async_trait]
pub trait Scraper: Send + Sync {
    type Record: Record + Send;

    /// Identifier used in logs and summaries.
    fn name(&self) -> &'static str;

    /// File name under `processed/`.
    fn output_file(&self) -> String;

    /// Directory under `raw/` that receives HTML snapshots.
    fn snapshot_dir(&self) -> PathBuf;

    fn targets(&self) -> Vec<Target>;

    fn parse(&self, pages: &[Page]) -> Vec<Self::Record>;

    /// Fetch every target, snapshot the pages, parse them and write the CSV.
    ///
    /// Failed URLs are collected in the report. The CSV is left untouched
    /// when every page failed.
    async fn run(&self, fetcher: &Fetcher, paths: &DataPaths) -> Result<ScrapeReport, ScrapeError> {
        let mut report = ScrapeReport {
            scraper: self.name().to_string(),
            ..ScrapeReport::default()
        };

        let mut pages = Vec::new();
        for target in self.targets() {
            match fetcher.fetch(&target.url).await {
                Ok(document) => pages.push(Page::new(target.key, document)),
                Err(error) => report.failures.push(FetchFailure {
                    url: target.url,
                    error,
                }),
            }
        }
        report.pages = pages.len();

        if report.all_failed() {
            log::warn!("{}: every request failed, nothing written", self.name());
            return Ok(report);
        }

        let raw_dir = paths.raw().join(self.snapshot_dir());
        for page in &pages {
            output::write_snapshot(&raw_dir, &page.key, page.html()).map_err(|source| {
                ScrapeError::Io {
                    path: raw_dir.clone(),
                    source,
                }
            })?;
        }

        let records = self.parse(&pages);
        let path = paths.processed().join(self.output_file());
        report.records = output::write_csv(
            &path,
            <Self::Record as Record>::HEADER,
            records.iter().map(Record::row),
        )
        .map_err(|source| ScrapeError::Csv {
            path: path.clone(),
            source,
        })?;

        log::info!(
            "{}: {} records from {} pages -> {}",
            self.name(),
            report.records,
            report.pages,
            path.display()
        );
        report.output = Some(path);
        Ok(report)
    }
}

/// Team codes, lowercased and checked. Empty input means every franchise.
pub fn normalize_teams<I, S>(teams: I) -> Result<Vec<String>, ScrapeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for team in teams {
        let team = team.as_ref().trim().to_ascii_lowercase();
        if team.is_empty() || !team.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ScrapeError::InvalidTeam(team));
        }
        out.push(team);
    }
    if out.is_empty() {
        out = DEFAULT_TEAM_CODES.iter().map(|team| team.to_string()).collect();
    }
    Ok(out)
}

/// Absolute URL for a site-relative link.
pub(crate) fn resolve_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{BASE_URL}{href}")
    }
}

/// `/players/A/AbduAm00.htm` -> `AbduAm00`.
pub(crate) fn player_id_from_href(href: &str) -> Option<String> {
    let file = href.trim_end_matches('/').rsplit('/').next()?;
    let id = file.split('.').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Text nodes trimmed and joined with single spaces; `None` when blank.
pub(crate) fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Direct element children named `tag`.
pub(crate) fn child_elements<'a>(
    parent: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

pub(crate) fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|name| name == class)
}

pub(crate) fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_links() {
        assert_eq!(
            resolve_url("/players/A/TestPl00.htm"),
            "https://www.pro-football-reference.com/players/A/TestPl00.htm"
        );
        assert_eq!(resolve_url("https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn player_ids_come_from_the_file_name() {
        assert_eq!(player_id_from_href("/players/A/TestPl00.htm").as_deref(), Some("TestPl00"));
        assert_eq!(player_id_from_href("/players/A/TestPl00/").as_deref(), Some("TestPl00"));
        assert_eq!(player_id_from_href("/"), None);
    }

    #[test]
    fn team_codes_are_checked() {
        assert_eq!(normalize_teams(["SFO", " kan "]).unwrap(), vec!["sfo", "kan"]);
        assert_eq!(normalize_teams(Vec::<String>::new()).unwrap().len(), 32);
        assert!(matches!(normalize_teams(["../x"]), Err(ScrapeError::InvalidTeam(_))));
    }
}
