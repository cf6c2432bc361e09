//! Team game logs (`/teams/<team>/<season>/gamelog/`).

use std::path::PathBuf;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{
    BASE_URL, Page, Record, ScrapeError, Scraper, Target, child_elements, element_text, has_class,
    normalize_teams, optional, resolve_url,
};

const REGULAR_SEASON_TABLE: &str = "table_pfr_team-year_game-logs_team-year-regular-season-game-log";
const PLAYOFFS_TABLE: &str = "table_pfr_team-year_game-logs_team-year-playoffs-game-log";

static TABLES: Lazy<Selector> = Lazy::new(|| Selector::parse("table[id]").expect("valid table selector"));
static BODY_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody > tr").expect("valid row selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameType {
    Regular,
    Playoffs,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Regular => "regular",
            GameType::Playoffs => "playoffs",
        }
    }

    fn from_table_id(id: &str) -> Option<Self> {
        match id {
            REGULAR_SEASON_TABLE => Some(GameType::Regular),
            PLAYOFFS_TABLE => Some(GameType::Playoffs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamGameLogRecord {
    pub season: u16,
    pub team: String,
    pub game_type: GameType,
    pub game_number: Option<String>,
    pub week: Option<String>,
    pub date: Option<String>,
    pub day: Option<String>,
    pub home_away: Option<String>,
    pub opponent: Option<String>,
    pub result: Option<String>,
    pub team_points: Option<String>,
    pub opponent_points: Option<String>,
    pub overtime: Option<String>,
    pub boxscore_url: Option<String>,
}

impl TeamGameLogRecord {
    fn empty(season: u16, team: &str, game_type: GameType) -> Self {
        Self {
            season,
            team: team.to_string(),
            game_type,
            game_number: None,
            week: None,
            date: None,
            day: None,
            home_away: None,
            opponent: None,
            result: None,
            team_points: None,
            opponent_points: None,
            overtime: None,
            boxscore_url: None,
        }
    }

    fn field_mut(&mut self, stat: &str) -> Option<&mut Option<String>> {
        let field = match stat {
            "team_game_num_season" => &mut self.game_number,
            "week_num" => &mut self.week,
            "date" => &mut self.date,
            "game_day_of_week" => &mut self.day,
            "game_location" => &mut self.home_away,
            "opp_name_abbr" => &mut self.opponent,
            "team_game_result" => &mut self.result,
            "points" => &mut self.team_points,
            "points_opp" => &mut self.opponent_points,
            "overtimes" => &mut self.overtime,
            _ => return None,
        };
        Some(field)
    }
}

impl Record for TeamGameLogRecord {
    const HEADER: &'static [&'static str] = &[
        "season",
        "team",
        "game_type",
        "game_number",
        "week",
        "date",
        "day",
        "home_away",
        "opponent",
        "result",
        "team_points",
        "opponent_points",
        "overtime",
        "boxscore_url",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.season.to_string(),
            self.team.clone(),
            self.game_type.as_str().to_string(),
            optional(&self.game_number),
            optional(&self.week),
            optional(&self.date),
            optional(&self.day),
            optional(&self.home_away),
            optional(&self.opponent),
            optional(&self.result),
            optional(&self.team_points),
            optional(&self.opponent_points),
            optional(&self.overtime),
            optional(&self.boxscore_url),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct TeamGameLogScraper {
    season: u16,
    teams: Vec<String>,
    include_playoffs: bool,
}

impl TeamGameLogScraper {
    pub fn new<I, S>(season: u16, teams: I) -> Result<Self, ScrapeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            season,
            teams: normalize_teams(teams)?,
            include_playoffs: true,
        })
    }

    pub fn include_playoffs(mut self, include: bool) -> Self {
        self.include_playoffs = include;
        self
    }
}

impl Scraper for TeamGameLogScraper {
    type Record = TeamGameLogRecord;

    fn name(&self) -> &'static str {
        "team_game_logs"
    }

    fn output_file(&self) -> String {
        format!("team_game_logs_{}.csv", self.season)
    }

    fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from("team_game_logs").join(self.season.to_string())
    }

    fn targets(&self) -> Vec<Target> {
        self.teams
            .iter()
            .map(|team| Target {
                key: team.clone(),
                url: format!("{BASE_URL}/teams/{team}/{}/gamelog/", self.season),
            })
            .collect()
    }

    fn parse(&self, pages: &[Page]) -> Vec<TeamGameLogRecord> {
        let mut records = Vec::new();
        for page in pages {
            let html = Html::parse_document(page.html());
            for table in html.select(&TABLES) {
                let Some(game_type) = table.value().id().and_then(GameType::from_table_id) else {
                    continue;
                };
                if game_type == GameType::Playoffs && !self.include_playoffs {
                    continue;
                }
                for row in table.select(&BODY_ROWS) {
                    if has_class(row, "thead") || has_class(row, "partial_table") {
                        continue;
                    }
                    if let Some(record) = parse_row(row, self.season, &page.key, game_type) {
                        records.push(record);
                    }
                }
            }
        }
        records
    }
}

fn parse_row(
    row: ElementRef<'_>,
    season: u16,
    team: &str,
    game_type: GameType,
) -> Option<TeamGameLogRecord> {
    let mut record = TeamGameLogRecord::empty(season, team, game_type);

    let cells = child_elements(row, "th").chain(child_elements(row, "td"));
    for cell in cells {
        let Some(stat) = cell.value().attr("data-stat") else {
            continue;
        };
        if let Some(field) = record.field_mut(stat) {
            *field = element_text(cell);
        }
        if stat == "date" {
            record.boxscore_url = cell
                .select(&LINK)
                .next()
                .and_then(|anchor| anchor.value().attr("href"))
                .map(resolve_url);
        }
    }

    record.opponent.is_some().then_some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::{Document, FetchResponse};
    use http::HeaderMap;
    use url::Url;

    fn sample() -> String {
        format!(
            r#"
            <table id="{REGULAR_SEASON_TABLE}">
                <tbody>
                    <tr>
                        <th data-stat="team_game_num_season">1</th>
                        <td data-stat="week_num">1</td>
                        <td data-stat="date"><a href="/boxscores/202309100min.htm">2023-09-10</a></td>
                        <td data-stat="game_day_of_week">Sun</td>
                        <td data-stat="game_location">@</td>
                        <td data-stat="opp_name_abbr">MIN</td>
                        <td data-stat="team_game_result">W</td>
                        <td data-stat="points">20</td>
                        <td data-stat="points_opp">17</td>
                        <td data-stat="overtimes"></td>
                    </tr>
                    <tr class="thead"><th>Rk</th></tr>
                    <tr>
                        <th data-stat="team_game_num_season"></th>
                        <td data-stat="week_num">6</td>
                        <td data-stat="opp_name_abbr">Bye Week</td>
                    </tr>
                    <tr>
                        <th data-stat="team_game_num_season"></th>
                        <td data-stat="week_num">7</td>
                        <td data-stat="opp_name_abbr"></td>
                    </tr>
                </tbody>
            </table>
            <table id="{PLAYOFFS_TABLE}">
                <tbody>
                    <tr>
                        <th data-stat="team_game_num_season">18</th>
                        <td data-stat="date"><a href="/boxscores/202401140phi.htm">2024-01-15</a></td>
                        <td data-stat="opp_name_abbr">PHI</td>
                        <td data-stat="team_game_result">W</td>
                    </tr>
                </tbody>
            </table>
            <table id="unrelated"><tbody><tr><td data-stat="opp_name_abbr">XXX</td></tr></tbody></table>
            "#
        )
    }

    fn page(team: &str) -> Page {
        let url = Url::parse(&format!("{BASE_URL}/teams/{team}/2023/gamelog/")).unwrap();
        let response = FetchResponse::new(url.clone(), 200, HeaderMap::new(), sample());
        Page::new(team, Document::from_response(url, &response))
    }

    #[test]
    fn parses_regular_and_playoff_games() {
        let scraper = TeamGameLogScraper::new(2023, ["tam"]).unwrap();
        let records = scraper.parse(&[page("tam")]);

        assert_eq!(records.len(), 3);
        let first = &records[0];
        assert_eq!(first.game_type, GameType::Regular);
        assert_eq!(first.game_number.as_deref(), Some("1"));
        assert_eq!(first.home_away.as_deref(), Some("@"));
        assert_eq!(first.opponent.as_deref(), Some("MIN"));
        assert_eq!(first.overtime, None);
        assert_eq!(
            first.boxscore_url.as_deref(),
            Some("https://www.pro-football-reference.com/boxscores/202309100min.htm")
        );

        assert_eq!(records[1].opponent.as_deref(), Some("Bye Week"));
        assert_eq!(records[1].boxscore_url, None);
        assert_eq!(records[2].game_type, GameType::Playoffs);
        assert_eq!(records[2].row()[2], "playoffs");
    }

    #[test]
    fn playoffs_can_be_excluded() {
        let scraper = TeamGameLogScraper::new(2023, ["tam"]).unwrap().include_playoffs(false);
        let records = scraper.parse(&[page("tam")]);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.game_type == GameType::Regular));
    }

    #[test]
    fn targets_point_at_gamelog_pages() {
        let scraper = TeamGameLogScraper::new(2023, ["sfo", "kan"]).unwrap();
        let urls: Vec<_> = scraper.targets().into_iter().map(|target| target.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.pro-football-reference.com/teams/sfo/2023/gamelog/",
                "https://www.pro-football-reference.com/teams/kan/2023/gamelog/",
            ]
        );
    }
}
