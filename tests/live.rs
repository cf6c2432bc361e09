//! Hits the real site. Run with `cargo test --test live -- --ignored` and a
//! valid `PFR_BROWSER_PROFILE` if Cloudflare is active.

use pfr_scraper::scrapers::{ActivePlayersScraper, Page, Scraper};
use pfr_scraper::{Fetcher, FetcherBuilder, config::FetchConfig};

fn live_fetcher() -> Fetcher {
    let config = FetchConfig::from_env().unwrap();
    let builder = FetcherBuilder::from_config(config.clone());
    if config.browser.profile_dir.is_some() {
        builder.build().unwrap()
    } else {
        builder.without_browser().build().unwrap()
    }
}

#[tokio::test]
#[ignore = "requires network access"]
async fn fetches_and_parses_one_index_page() {
    let _ = env_logger::builder().is_test(true).try_init();

    let fetcher = live_fetcher();
    let scraper = ActivePlayersScraper::with_letters(["Q"]).unwrap();
    let target = scraper.targets().remove(0);

    let document = fetcher.fetch(&target.url).await.unwrap();
    let records = scraper.parse(&[Page::new(target.key, document)]);
    assert!(!records.is_empty());
}
