//! Active player index (`/players/<letter>/`).
//!
//! Active players are the bold entries on each letter page.

use std::collections::BTreeMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{
    BASE_URL, Page, Record, ScrapeError, Scraper, Target, element_text, optional,
    player_id_from_href, resolve_url,
};

static ACTIVE_ENTRY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div#div_players b").expect("valid active player selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePlayerRecord {
    pub player_id: String,
    pub player_name: String,
    pub letter: String,
    pub url: String,
    pub position: Option<String>,
}

impl Record for ActivePlayerRecord {
    const HEADER: &'static [&'static str] = &["player_id", "player_name", "letter", "url", "position"];

    fn row(&self) -> Vec<String> {
        vec![
            self.player_id.clone(),
            self.player_name.clone(),
            self.letter.clone(),
            self.url.clone(),
            optional(&self.position),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ActivePlayersScraper {
    letters: Vec<char>,
}

impl Default for ActivePlayersScraper {
    fn default() -> Self {
        Self {
            letters: ('A'..='Z').collect(),
        }
    }
}

impl ActivePlayersScraper {
    /// Restrict the run to `letters`. Empty input means A-Z.
    pub fn with_letters<I, S>(letters: I) -> Result<Self, ScrapeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for raw in letters {
            let raw = raw.as_ref().trim();
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) if ch.is_ascii_alphabetic() => {
                    let upper = ch.to_ascii_uppercase();
                    if !parsed.contains(&upper) {
                        parsed.push(upper);
                    }
                }
                _ => return Err(ScrapeError::InvalidLetter(raw.to_string())),
            }
        }
        if parsed.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { letters: parsed })
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }
}

impl Scraper for ActivePlayersScraper {
    type Record = ActivePlayerRecord;

    fn name(&self) -> &'static str {
        "active_players"
    }

    fn output_file(&self) -> String {
        "active_players.csv".to_string()
    }

    fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from("active_players")
    }

    fn targets(&self) -> Vec<Target> {
        self.letters
            .iter()
            .map(|letter| Target {
                key: letter.to_string(),
                url: format!("{BASE_URL}/players/{letter}/"),
            })
            .collect()
    }

    fn parse(&self, pages: &[Page]) -> Vec<ActivePlayerRecord> {
        let mut by_id = BTreeMap::new();

        for page in pages {
            let html = Html::parse_document(page.html());
            for bold in html.select(&ACTIVE_ENTRY) {
                let Some(record) = parse_entry(bold, &page.key) else {
                    continue;
                };
                by_id.insert(record.player_id.clone(), record);
            }
        }

        let mut records: Vec<_> = by_id.into_values().collect();
        records.sort_by(|a, b| {
            a.letter
                .cmp(&b.letter)
                .then_with(|| a.player_name.cmp(&b.player_name))
        });
        records
    }
}

fn parse_entry(bold: ElementRef<'_>, letter: &str) -> Option<ActivePlayerRecord> {
    let anchor = bold.select(&LINK).next()?;
    let href = anchor.value().attr("href")?;
    let name = element_text(anchor)?;
    let player_id = player_id_from_href(href)?;
    let position = element_text(bold).and_then(|text| position_suffix(&text, &name));

    Some(ActivePlayerRecord {
        player_id,
        player_name: name,
        letter: letter.to_string(),
        url: resolve_url(href),
        position,
    })
}

/// `Test Player (QB)` -> `QB`.
fn position_suffix(text: &str, name: &str) -> Option<String> {
    let rest = text.strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?;
    let end = inner.find(')')?;
    let position = inner[..end].trim();
    (!position.is_empty()).then(|| position.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::{Document, FetchResponse};
    use http::HeaderMap;
    use url::Url;

    const SAMPLE: &str = r#"
        <div id="div_players">
            <p><b><a href="/players/A/TestPl00.htm">Test Player</a> (QB)</b> 2023-2025</p>
            <p><a href="/players/A/OtherPl00.htm">Other Player</a> (RB) 2019-2020</p>
            <p><b><a href="/players/A/ProxyPl01.htm">Proxy Player</a></b> 2022-2024</p>
        </div>
    "#;

    fn page(key: &str, html: &str) -> Page {
        let url = Url::parse(&format!("{BASE_URL}/players/{key}/")).unwrap();
        let response = FetchResponse::new(url.clone(), 200, HeaderMap::new(), html.to_string());
        Page::new(key, Document::from_response(url, &response))
    }

    #[test]
    fn letters_are_validated() {
        let scraper = ActivePlayersScraper::with_letters(["a", "B", "a"]).unwrap();
        assert_eq!(scraper.letters(), &['A', 'B']);
        assert!(matches!(
            ActivePlayersScraper::with_letters(["AB"]),
            Err(ScrapeError::InvalidLetter(_))
        ));
        assert!(ActivePlayersScraper::with_letters(["1"]).is_err());
        assert_eq!(ActivePlayersScraper::with_letters(Vec::<String>::new()).unwrap().letters().len(), 26);
    }

    #[test]
    fn targets_cover_each_letter() {
        let scraper = ActivePlayersScraper::with_letters(["A"]).unwrap();
        assert_eq!(
            scraper.targets(),
            vec![Target {
                key: "A".into(),
                url: "https://www.pro-football-reference.com/players/A/".into(),
            }]
        );
    }

    #[test]
    fn parses_only_bold_entries() {
        let scraper = ActivePlayersScraper::default();
        let records = scraper.parse(&[page("A", SAMPLE)]);

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            ActivePlayerRecord {
                player_id: "ProxyPl01".into(),
                player_name: "Proxy Player".into(),
                letter: "A".into(),
                url: "https://www.pro-football-reference.com/players/A/ProxyPl01.htm".into(),
                position: None,
            }
        );
        assert_eq!(records[1].player_id, "TestPl00");
        assert_eq!(records[1].position.as_deref(), Some("QB"));
        assert_eq!(records[1].row()[4], "QB");
        assert_eq!(records[0].row()[4], "");
    }

    #[test]
    fn duplicates_across_pages_collapse() {
        let scraper = ActivePlayersScraper::default();
        let records = scraper.parse(&[page("A", SAMPLE), page("A", SAMPLE)]);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn position_needs_parentheses() {
        assert_eq!(position_suffix("Test Player (QB) 2023", "Test Player").as_deref(), Some("QB"));
        assert_eq!(position_suffix("Test Player", "Test Player"), None);
        assert_eq!(position_suffix("Test Player ()", "Test Player"), None);
    }
}
