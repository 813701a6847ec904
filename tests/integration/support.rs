//! Shared fixtures for the integration tests

use reading_ledger::config::Config;
use reading_ledger::crawler::{CrawlReport, Crawler};
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USER: &str = "reader";
pub const TOKEN: &str = "dbcl2=\"4242:abc\"; ck=xyz";
pub const PAGE_SIZE: u32 = 15;

/// Only one crawl may run per process, so crawling tests take turns
static CRAWL_SLOT: Mutex<()> = Mutex::const_new(());

pub async fn exclusive() -> MutexGuard<'static, ()> {
    CRAWL_SLOT.lock().await
}

/// One listing entry: subject id, stars (0 = unrated), review text
pub type Entry<'a> = (u32, u32, &'a str);

pub fn listing_html(entries: &[Entry<'_>]) -> String {
    let items: String = entries
        .iter()
        .map(|(id, stars, review)| {
            let rating = if *stars > 0 {
                format!(r#"<span class="rating{}-t"></span>"#, stars)
            } else {
                String::new()
            };
            format!(
                r#"<li class="subject-item">
                  <div class="info">
                    <h2><a href="/subject/{id}/?from=collect" title="Book {id}">Book {id}</a></h2>
                    <div class="pub">Author {id} / Some Press / 2010-5 / 32.00</div>
                    <div class="short-note">
                      <div>{rating}<span class="date">2023-{month:02}-10 read</span></div>
                      <p class="comment">{review}</p>
                    </div>
                  </div>
                </li>"#,
                id = id,
                rating = rating,
                month = (id % 12) + 1,
                review = review
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html><html><body><div class="article">
        <ul class="interest-list">{}</ul></div></body></html>"#,
        items
    )
}

/// Config pointed at `server` with no pacing, writing into `dir`
pub fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.session.base_url = server.uri();
    config.session.timeout_secs = 5;
    config.crawler.page_size = PAGE_SIZE;
    config.crawler.max_retries = 1;
    config.crawler.failure_threshold = 3;
    config.rate_limit.request_delay_ms = 0;
    config.rate_limit.max_delay_ms = 0;
    config.output.database_path = dir
        .path()
        .join("ledger.db")
        .to_string_lossy()
        .into_owned();
    config
}

/// Query value `start` for a 1-based page
pub fn offset(page: u32) -> String {
    ((page - 1) * PAGE_SIZE).to_string()
}

/// Serves `entries` as listing page `page` to requests carrying the token
pub async fn mount_page(server: &MockServer, page: u32, entries: &[Entry<'_>]) {
    Mock::given(method("GET"))
        .and(path(format!("/people/{}/collect", USER)))
        .and(query_param("start", offset(page)))
        .and(header("Cookie", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(entries)))
        .mount(server)
        .await;
}

/// Serves a fixed response for listing page `page`
pub async fn mount_status(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/people/{}/collect", USER)))
        .and(query_param("start", offset(page)))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Listing offsets the server saw, in order
pub async fn requested_offsets(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| {
            request
                .url
                .query_pairs()
                .find(|(key, _)| key == "start")
                .map(|(_, value)| value.into_owned())
        })
        .collect()
}

pub async fn crawl(crawler: &Crawler, max_pages: Option<u32>) -> CrawlReport {
    crawler
        .start_crawl(USER, TOKEN, max_pages)
        .expect("crawl should start")
        .wait()
        .await
        .expect("worker should not panic")
}
