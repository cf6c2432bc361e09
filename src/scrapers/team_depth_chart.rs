//! Team depth charts (`/teams/<team>/<season>_depth_chart.htm`).
//!
//! Each `depth_chart*` table lists positions as row headers and depth slots as
//! cells. A cell may name several players plus a free-text note.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{
    BASE_URL, Page, Record, ScrapeError, Scraper, Target, child_elements, element_text, has_class,
    normalize_teams, optional, player_id_from_href, resolve_url,
};

const TABLE_PREFIX: &str = "depth_chart";

static TABLES: Lazy<Selector> = Lazy::new(|| Selector::parse("table[id]").expect("valid table selector"));
static BODY_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody > tr").expect("valid row selector"));
static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid link selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamDepthChartRecord {
    pub season: u16,
    pub team: String,
    pub unit: String,
    pub position: String,
    pub depth_slot: usize,
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub player_url: Option<String>,
    pub note: Option<String>,
}

impl Record for TeamDepthChartRecord {
    const HEADER: &'static [&'static str] = &[
        "season",
        "team",
        "unit",
        "position",
        "depth_slot",
        "player_id",
        "player_name",
        "player_url",
        "note",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.season.to_string(),
            self.team.clone(),
            self.unit.clone(),
            self.position.clone(),
            self.depth_slot.to_string(),
            optional(&self.player_id),
            optional(&self.player_name),
            optional(&self.player_url),
            optional(&self.note),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TeamDepthChartScraper {
    season: u16,
    teams: Vec<String>,
}

impl TeamDepthChartScraper {
    pub fn new<I, S>(season: u16, teams: I) -> Result<Self, ScrapeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            season,
            teams: normalize_teams(teams)?,
        })
    }
}

impl Scraper for TeamDepthChartScraper {
    type Record = TeamDepthChartRecord;

    fn name(&self) -> &'static str {
        "team_depth_chart"
    }

    fn output_file(&self) -> String {
        format!("team_depth_chart_{}.csv", self.season)
    }

    fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from("team_depth_charts").join(self.season.to_string())
    }

    fn targets(&self) -> Vec<Target> {
        self.teams
            .iter()
            .map(|team| Target {
                key: team.clone(),
                url: format!("{BASE_URL}/teams/{team}/{}_depth_chart.htm", self.season),
            })
            .collect()
    }

    fn parse(&self, pages: &[Page]) -> Vec<TeamDepthChartRecord> {
        let mut records = Vec::new();
        for page in pages {
            let html = Html::parse_document(page.html());
            for table in html.select(&TABLES) {
                let Some(table_id) = table.value().id() else {
                    continue;
                };
                if !table_id.starts_with(TABLE_PREFIX) {
                    continue;
                }
                let slot = SlotContext {
                    season: self.season,
                    team: &page.key,
                    unit: unit_from_table_id(table_id),
                };
                for row in table.select(&BODY_ROWS) {
                    if has_class(row, "thead") {
                        continue;
                    }
                    slot.parse_row(row, &mut records);
                }
            }
        }
        records
    }
}

struct SlotContext<'a> {
    season: u16,
    team: &'a str,
    unit: String,
}

impl SlotContext<'_> {
    fn parse_row(&self, row: ElementRef<'_>, out: &mut Vec<TeamDepthChartRecord>) {
        let Some(position) = child_elements(row, "th")
            .find(|cell| cell.value().attr("scope") == Some("row"))
            .and_then(element_text)
        else {
            return;
        };

        for (index, cell) in child_elements(row, "td").enumerate() {
            self.parse_cell(&position, index + 1, cell, out);
        }
    }

    fn parse_cell(
        &self,
        position: &str,
        depth_slot: usize,
        cell: ElementRef<'_>,
        out: &mut Vec<TeamDepthChartRecord>,
    ) {
        let cell_text = element_text(cell);
        let anchors: Vec<_> = cell.select(&LINKS).collect();

        let record = |player_id, player_name, player_url, note| TeamDepthChartRecord {
            season: self.season,
            team: self.team.to_string(),
            unit: self.unit.clone(),
            position: position.to_string(),
            depth_slot,
            player_id,
            player_name,
            player_url,
            note,
        };

        if anchors.is_empty() {
            if let Some(name) = cell_text {
                out.push(record(None, Some(name), None, None));
            }
            return;
        }

        let names: Vec<Option<String>> = anchors.iter().map(|anchor| element_text(*anchor)).collect();
        let note = cell_text.and_then(|text| derive_note(&text, names.iter().flatten()));

        for (anchor, name) in anchors.iter().zip(names) {
            let href = anchor.value().attr("href").filter(|href| !href.is_empty());
            out.push(record(
                href.and_then(player_id_from_href),
                name,
                href.map(resolve_url),
                note.clone(),
            ));
        }
    }
}

/// Cell text with each player name removed once.
fn derive_note<'a>(cell_text: &str, names: impl Iterator<Item = &'a String>) -> Option<String> {
    let mut remainder = cell_text.to_string();
    for name in names {
        remainder = remainder.replacen(name.as_str(), "", 1).trim().to_string();
    }
    (!remainder.is_empty()).then_some(remainder)
}

fn unit_from_table_id(table_id: &str) -> String {
    let suffix = table_id
        .strip_prefix(TABLE_PREFIX)
        .unwrap_or(table_id)
        .trim_matches('_');
    match suffix {
        "" => "Depth Chart".to_string(),
        "offense" => "Offense".to_string(),
        "defense" => "Defense".to_string(),
        "special_teams" => "Special Teams".to_string(),
        other => title_case(other),
    }
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
