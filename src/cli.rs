//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Scrape Pro-Football-Reference into CSV.
///
/// Settings are read from `PFR_*` environment variables first; flags given
/// here take precedence.
#[derive(Parser, Debug)]
#[command(name = "pfr-scraper")]
#[command(author, version, about)]
pub struct Args {
    /// Seconds between requests (0 disables throttling)
    #[arg(long, global = true)]
    pub delay: Option<f64>,

    /// Root directory for raw snapshots and processed CSV
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Cookie jar shared between runs
    #[arg(long, global = true)]
    pub cookie_file: Option<PathBuf>,

    /// Never launch Chrome; challenged pages fail immediately
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Active player index, one page per letter
    ActivePlayers {
        /// Letters to scrape (default A-Z)
        #[arg(long, num_args = 1..)]
        letters: Vec<String>,
    },
    /// Season rosters
    Rosters(SeasonArgs),
    /// Season game logs
    GameLogs {
        #[command(flatten)]
        season: SeasonArgs,

        /// Skip the playoff table
        #[arg(long)]
        no_playoffs: bool,
    },
    /// Season depth charts
    DepthCharts(SeasonArgs),
    /// Open Chrome on the site and store the clearance cookies it receives
    HarvestCookies {
        /// Page to open
        #[arg(long, default_value = "https://www.pro-football-reference.com/")]
        url: String,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct SeasonArgs {
    /// Season year, e.g. 2024
    pub season: u16,

    /// Team codes (default: all 32 franchises)
    #[arg(long, num_args = 1..)]
    pub teams: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_subcommands() {
        let args = Args::try_parse_from([
            "pfr-scraper",
            "rosters",
            "2024",
            "--teams",
            "sfo",
            "kan",
            "--delay",
            "0",
            "--no-browser",
        ])
        .unwrap();

        assert_eq!(args.delay, Some(0.0));
        assert!(args.no_browser);
        match args.command {
            Command::Rosters(season) => {
                assert_eq!(season.season, 2024);
                assert_eq!(season.teams, vec!["sfo", "kan"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn active_players_letters_are_optional() {
        let args = Args::try_parse_from(["pfr-scraper", "active-players"]).unwrap();
        assert!(matches!(args.command, Command::ActivePlayers { ref letters } if letters.is_empty()));

        let args = Args::try_parse_from(["pfr-scraper", "active-players", "--letters", "A", "B"]).unwrap();
        assert!(matches!(args.command, Command::ActivePlayers { ref letters } if letters.len() == 2));
    }

    #[test]
    fn game_logs_accepts_no_playoffs() {
        let args = Args::try_parse_from(["pfr-scraper", "game-logs", "2023", "--no-playoffs"]).unwrap();
        assert!(matches!(
            args.command,
            Command::GameLogs { no_playoffs: true, ref season } if season.season == 2023
        ));
    }

    #[test]
    fn harvest_defaults_to_home_page() {
        let args = Args::try_parse_from(["pfr-scraper", "harvest-cookies", "--headed"]).unwrap();
        match args.command {
            Command::HarvestCookies { url, headed, timeout } => {
                assert_eq!(url, "https://www.pro-football-reference.com/");
                assert!(headed);
                assert_eq!(timeout, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn season_is_required() {
        let err = Args::try_parse_from(["pfr-scraper", "depth-charts"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
