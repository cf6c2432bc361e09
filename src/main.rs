//! pfr-scraper - Pro-Football-Reference to CSV.

mod cli;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use url::Url;

use cli::{Args, Command, SeasonArgs};
use pfr_scraper::config::{DataPaths, FetchConfig};
use pfr_scraper::scrapers::{
    ActivePlayersScraper, TeamDepthChartScraper, TeamGameLogScraper, TeamRosterScraper,
};
use pfr_scraper::{Fetcher, FetcherBuilder, ScrapeReport, Scraper};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = FetchConfig::from_env().context("invalid PFR_* environment")?;
    apply_overrides(&mut config, &args)?;
    let paths = config.data_paths();

    match args.command {
        Command::ActivePlayers { letters } => {
            let scraper = ActivePlayersScraper::with_letters(letters)?;
            scrape(&scraper, config, &paths).await
        }
        Command::Rosters(SeasonArgs { season, teams }) => {
            let scraper = TeamRosterScraper::new(season, teams)?;
            scrape(&scraper, config, &paths).await
        }
        Command::GameLogs { season, no_playoffs } => {
            let scraper =
                TeamGameLogScraper::new(season.season, season.teams)?.include_playoffs(!no_playoffs);
            scrape(&scraper, config, &paths).await
        }
        Command::DepthCharts(SeasonArgs { season, teams }) => {
            let scraper = TeamDepthChartScraper::new(season, teams)?;
            scrape(&scraper, config, &paths).await
        }
        Command::HarvestCookies { url, headed, timeout } => {
            if !config.browser.enabled {
                bail!("harvest-cookies needs the browser; drop --no-browser");
            }
            config.browser.headed |= headed;
            if let Some(secs) = timeout {
                config.browser.timeout_secs = seconds("--timeout", secs)?.as_secs_f64();
            }
            harvest(config, &url).await
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .init();
}

/// Flags win over the environment.
fn apply_overrides(config: &mut FetchConfig, args: &Args) -> Result<()> {
    if let Some(delay) = args.delay {
        config.request_delay_secs = seconds("--delay", delay)?.as_secs_f64();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(file) = &args.cookie_file {
        config.cookie_file = file.clone();
    }
    if args.no_browser {
        config.browser.enabled = false;
    }
    Ok(())
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("{flag} must be a non-negative number of seconds"))
}

fn build_fetcher(config: FetchConfig) -> Result<Fetcher> {
    FetcherBuilder::from_config(config)
        .build()
        .context("could not set up the fetcher (set PFR_BROWSER_PROFILE or pass --no-browser)")
}

async fn scrape<S: Scraper>(scraper: &S, config: FetchConfig, paths: &DataPaths) -> Result<ExitCode> {
    let fetcher = build_fetcher(config)?;
    let report = scraper.run(&fetcher, paths).await?;
    print_summary(&report);

    Ok(if report.all_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_summary(report: &ScrapeReport) {
    println!(
        "{}: {} records from {} pages",
        report.scraper, report.records, report.pages
    );
    if let Some(path) = &report.output {
        println!("  wrote {}", path.display());
    }
    if !report.failures.is_empty() {
        println!("  {} failed:", report.failures.len());
        for failure in &report.failures {
            println!("    {} ({}): {}", failure.url, failure.error.kind(), failure.error);
        }
    }
}

async fn harvest(config: FetchConfig, url: &str) -> Result<ExitCode> {
    let url = Url::parse(url).with_context(|| format!("invalid url `{url}`"))?;
    let cookie_file = config.cookie_file.clone();
    let fetcher = build_fetcher(config)?;

    let fresh = fetcher
        .refresh_credentials(&url)
        .await
        .with_context(|| format!("could not harvest cookies from {url}"))?;

    let names: Vec<&str> = fresh.cookies().keys().map(String::as_str).collect();
    println!("harvested {} cookies: {}", names.len(), names.join(", "));
    println!("  saved to {}", cookie_file.display());
    Ok(ExitCode::SUCCESS)
}
