//! Season rosters (`/teams/<team>/<season>_roster.htm`).

use std::path::PathBuf;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{
    BASE_URL, Page, Record, ScrapeError, Scraper, Target, child_elements, element_text, has_class,
    normalize_teams, optional, player_id_from_href, resolve_url,
};

static ROSTER_ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table#roster > tbody > tr").expect("valid roster selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamRosterRecord {
    pub season: u16,
    pub team: String,
    pub uniform_number: Option<String>,
    pub player_id: String,
    pub player_name: String,
    pub player_url: String,
    pub position: Option<String>,
    pub age: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub experience: Option<String>,
    pub games_played: Option<String>,
    pub games_started: Option<String>,
    pub approximate_value: Option<String>,
    pub college: Option<String>,
    pub birth_date: Option<String>,
    pub draft_info: Option<String>,
}

impl Record for TeamRosterRecord {
    const HEADER: &'static [&'static str] = &[
        "season",
        "team",
        "uniform_number",
        "player_id",
        "player_name",
        "player_url",
        "position",
        "age",
        "height",
        "weight",
        "experience",
        "games_played",
        "games_started",
        "approximate_value",
        "college",
        "birth_date",
        "draft_info",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.season.to_string(),
            self.team.clone(),
            optional(&self.uniform_number),
            self.player_id.clone(),
            self.player_name.clone(),
            self.player_url.clone(),
            optional(&self.position),
            optional(&self.age),
            optional(&self.height),
            optional(&self.weight),
            optional(&self.experience),
            optional(&self.games_played),
            optional(&self.games_started),
            optional(&self.approximate_value),
            optional(&self.college),
            optional(&self.birth_date),
            optional(&self.draft_info),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TeamRosterScraper {
    season: u16,
    teams: Vec<String>,
}

impl TeamRosterScraper {
    /// Empty `teams` means every franchise.
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

    pub fn teams(&self) -> &[String] {
        &self.teams
    }
}

impl Scraper for TeamRosterScraper {
    type Record = TeamRosterRecord;

    fn name(&self) -> &'static str {
        "team_rosters"
    }

    fn output_file(&self) -> String {
        format!("team_rosters_{}.csv", self.season)
    }

    fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from("team_rosters").join(self.season.to_string())
    }

    fn targets(&self) -> Vec<Target> {
        self.teams
            .iter()
            .map(|team| Target {
                key: team.clone(),
                url: format!("{BASE_URL}/teams/{team}/{}_roster.htm", self.season),
            })
            .collect()
    }

    fn parse(&self, pages: &[Page]) -> Vec<TeamRosterRecord> {
        let mut records = Vec::new();
        for page in pages {
            let html = Html::parse_document(page.html());
            for row in html.select(&ROSTER_ROWS) {
                if has_class(row, "thead") {
                    continue;
                }
                if let Some(record) = parse_row(row, self.season, &page.key) {
                    records.push(record);
                }
            }
        }
        records
    }
}

/// First direct `th`/`td` child carrying `data-stat="<stat>"`.
fn stat_cell<'a>(row: ElementRef<'a>, tag: &'a str, stat: &str) -> Option<ElementRef<'a>> {
    child_elements(row, tag).find(|cell| cell.value().attr("data-stat") == Some(stat))
}

fn stat_text(row: ElementRef<'_>, stat: &str) -> Option<String> {
    stat_cell(row, "td", stat).and_then(element_text)
}

fn parse_row(row: ElementRef<'_>, season: u16, team: &str) -> Option<TeamRosterRecord> {
    let player_cell = stat_cell(row, "td", "player")?;
    let anchor = player_cell.select(&LINK).next()?;
    let href = anchor.value().attr("href")?;

    let player_id = player_cell
        .value()
        .attr("data-append-csv")
        .map(str::to_string)
        .or_else(|| player_id_from_href(href))?;

    Some(TeamRosterRecord {
        season,
        team: team.to_string(),
        uniform_number: stat_cell(row, "th", "uniform_number").and_then(element_text),
        player_id,
        player_name: element_text(anchor).unwrap_or_default(),
        player_url: resolve_url(href),
        position: stat_text(row, "pos"),
        age: stat_text(row, "age"),
        height: stat_text(row, "height"),
        weight: stat_text(row, "weight"),
        experience: stat_text(row, "experience"),
        games_played: stat_text(row, "g"),
        games_started: stat_text(row, "gs"),
        approximate_value: stat_text(row, "av"),
        college: stat_text(row, "college_id"),
        birth_date: stat_text(row, "birth_date_mod"),
        draft_info: stat_text(row, "draft_info"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::{Document, FetchResponse};
    use http::HeaderMap;
    use url::Url;

    const SAMPLE: &str = r#"
        <table id="roster">
            <thead><tr><th>No.</th><th>Player</th></tr></thead>
            <tbody>
                <tr>
                    <th data-stat="uniform_number">12</th>
                    <td data-stat="player" data-append-csv="BradTo00"><a href="/players/B/BradTo00.htm">Tom Brady</a></td>
                    <td data-stat="age">45</td>
                    <td data-stat="pos">QB</td>
                    <td data-stat="g">17</td>
                    <td data-stat="gs">17</td>
                    <td data-stat="weight">225</td>
                    <td data-stat="height">6-4</td>
                    <td data-stat="college_id">Michigan</td>
                    <td data-stat="birth_date_mod">8/3/1977</td>
                    <td data-stat="experience">22</td>
                    <td data-stat="av">12</td>
                    <td data-stat="draft_info">New England Patriots / 6th / 199th pick / 2000</td>
                </tr>
                <tr class="thead"><th>No.</th><td data-stat="player">Player</td></tr>
                <tr>
                    <th data-stat="uniform_number"></th>
                    <td data-stat="player"><a href="/players/E/EvanMi00.htm">Mike Evans</a></td>
                    <td data-stat="pos">WR</td>
                </tr>
                <tr>
                    <th data-stat="uniform_number">99</th>
                    <td data-stat="player">Unlinked Name</td>
                </tr>
            </tbody>
        </table>
    "#;

    fn page(team: &str) -> Page {
        let url = Url::parse(&format!("{BASE_URL}/teams/{team}/2022_roster.htm")).unwrap();
        let response = FetchResponse::new(url.clone(), 200, HeaderMap::new(), SAMPLE);
        Page::new(team, Document::from_response(url, &response))
    }

    #[test]
    fn targets_use_season_roster_pages() {
        let scraper = TeamRosterScraper::new(2022, ["TAM"]).unwrap();
        assert_eq!(
            scraper.targets()[0].url,
            "https://www.pro-football-reference.com/teams/tam/2022_roster.htm"
        );
        assert_eq!(scraper.output_file(), "team_rosters_2022.csv");
        assert_eq!(TeamRosterScraper::new(2022, Vec::<&str>::new()).unwrap().teams().len(), 32);
    }

    #[test]
    fn parses_linked_players_and_skips_header_rows() {
        let scraper = TeamRosterScraper::new(2022, ["tam"]).unwrap();
        let records = scraper.parse(&[page("tam")]);
        assert_eq!(records.len(), 2);

        let brady = &records[0];
        assert_eq!(brady.player_id, "BradTo00");
        assert_eq!(brady.player_name, "Tom Brady");
        assert_eq!(brady.player_url, "https://www.pro-football-reference.com/players/B/BradTo00.htm");
        assert_eq!(brady.uniform_number.as_deref(), Some("12"));
        assert_eq!(brady.position.as_deref(), Some("QB"));
        assert_eq!(brady.height.as_deref(), Some("6-4"));
        assert_eq!(brady.college.as_deref(), Some("Michigan"));
        assert_eq!(brady.season, 2022);
        assert_eq!(brady.team, "tam");

        let evans = &records[1];
        assert_eq!(evans.player_id, "EvanMi00");
        assert_eq!(evans.uniform_number, None);
        assert_eq!(evans.age, None);
        assert_eq!(evans.row().len(), TeamRosterRecord::HEADER.len());
    }
}
