//! End-to-end crawl scenarios against a mock listing

use crate::support::{
    crawl, exclusive, mount_page, mount_status, offset, requested_offsets, test_config, TOKEN,
    USER,
};
use reading_ledger::crawler::{AbortReason, CrawlEvent, CrawlOutcome, Crawler};
use reading_ledger::output::{get_export_projection, get_summary};
use reading_ledger::storage::{DateRange, SqliteStorage, Storage};
use reading_ledger::{LedgerError, Rating};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{MockServer, ResponseTemplate};

fn stored(crawler: &Crawler) -> u64 {
    crawler
        .storage()
        .lock()
        .unwrap()
        .count_records(USER, DateRange::all())
        .unwrap()
}

#[tokio::test]
async fn test_crawl_until_listing_ends() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, 1, &[(1, 5, "Loved it"), (2, 4, "")]).await;
    mount_page(&server, 2, &[(3, 0, ""), (4, 2, "Too long")]).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.pages_done, 2);
    assert_eq!(report.tally.inserted, 4);
    assert_eq!(stored(&crawler), 4);
    assert_eq!(requested_offsets(&server).await, vec!["0", "15", "30"]);

    let storage = crawler.storage();
    let storage = storage.lock().unwrap();
    let record = storage
        .get_record(USER, &format!("{}/subject/1/", server.uri()))
        .unwrap()
        .expect("query string is dropped from the key");
    assert_eq!(record.title, "Book 1");
    assert_eq!(record.author.as_deref(), Some("Author 1"));
    assert_eq!(record.rating, Rating::FiveStars);
    assert_eq!(record.review_content, "Loved it");
    assert_eq!(record.first_seen_at, record.last_updated_at);

    let unrated = storage.get_records_by_rating(USER, Rating::Unrated).unwrap();
    assert_eq!(unrated.len(), 1);
    assert_eq!(unrated[0].title, "Book 3");
}

#[tokio::test]
async fn test_empty_first_page_completes_with_nothing() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[]).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.pages_done, 0);
    assert_eq!(stored(&crawler), 0);
}

#[tokio::test]
async fn test_page_ceiling_limits_requests() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[(1, 3, "")]).await;
    mount_page(&server, 2, &[(2, 3, "")]).await;
    mount_page(&server, 3, &[(3, 3, "")]).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let report = crawl(&crawler, Some(2)).await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.pages_done, 2);
    assert_eq!(requested_offsets(&server).await, vec!["0", "15"]);
    assert_eq!(stored(&crawler), 2);
}

#[tokio::test]
async fn test_login_redirect_on_first_page_aborts() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_status(
        &server,
        1,
        ResponseTemplate::new(302)
            .insert_header("Location", "https://accounts.example.com/passport/login"),
    )
    .await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(report.outcome, CrawlOutcome::Aborted(AbortReason::AuthFailure));
    assert_eq!(report.committed, 0);
    assert_eq!(stored(&crawler), 0);
    // Auth failures are not retried
    assert_eq!(requested_offsets(&server).await, vec!["0"]);
}

#[tokio::test]
async fn test_forbidden_mid_crawl_keeps_earlier_pages() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[(1, 4, ""), (2, 4, "")]).await;
    mount_status(&server, 2, ResponseTemplate::new(403)).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(report.outcome, CrawlOutcome::Aborted(AbortReason::AuthFailure));
    assert_eq!(report.committed, 2);
    assert_eq!(stored(&crawler), 2);
}

#[tokio::test]
async fn test_three_unreachable_pages_abort() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[(1, 5, "First"), (2, 1, "")]).await;
    for page in 2..=4 {
        mount_status(&server, page, ResponseTemplate::new(503)).await;
    }
    mount_page(&server, 5, &[(5, 5, "")]).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(
        report.outcome,
        CrawlOutcome::Aborted(AbortReason::TooManyFailures)
    );
    assert_eq!(report.pages_done, 1);
    assert_eq!(stored(&crawler), 2);

    // Each failed page used its retry: two attempts per page, page 5 never asked for
    let offsets = requested_offsets(&server).await;
    assert_eq!(offsets, vec!["0", "15", "15", "30", "30", "45", "45"]);
    assert!(!offsets.contains(&offset(5)));
}

#[tokio::test]
async fn test_request_timeouts_abort_after_retries() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_status(
        &server,
        1,
        ResponseTemplate::new(200)
            .set_body_string(crate::support::listing_html(&[(1, 5, "")]))
            .set_delay(Duration::from_millis(2500)),
    )
    .await;

    let mut config = test_config(&server, &dir);
    config.session.timeout_secs = 1;
    config.crawler.failure_threshold = 1;
    let crawler = Crawler::open(config).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(
        report.outcome,
        CrawlOutcome::Aborted(AbortReason::TooManyFailures)
    );
    assert_eq!(report.detail.as_deref(), Some("request timed out"));
    assert_eq!(report.pages_done, 0);
    // The first attempt and its one retry, then nothing more
    assert_eq!(requested_offsets(&server).await, vec!["0", "0"]);
    assert_eq!(stored(&crawler), 0);
}

#[tokio::test]
async fn test_unreachable_host_aborts() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Bind then release a port so nothing is listening on it
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = closed.local_addr().unwrap();
    drop(closed);

    let mut config = test_config(&server, &dir);
    config.session.base_url = format!("http://{}", address);
    let crawler = Crawler::open(config).unwrap();
    let report = crawl(&crawler, None).await;

    assert_eq!(
        report.outcome,
        CrawlOutcome::Aborted(AbortReason::TooManyFailures)
    );
    assert_eq!(report.detail.as_deref(), Some("connection failed"));
    assert_eq!(report.pages_done, 0);
    assert_eq!(report.pages_skipped, 2);
    assert_eq!(stored(&crawler), 0);
}

#[tokio::test]
async fn test_recrawl_without_changes_writes_nothing() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[(1, 5, "Loved it"), (2, 3, "")]).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    crawl(&crawler, None).await;
    let before = crawler.storage().lock().unwrap().get_records(USER).unwrap();

    let second = crawl(&crawler, None).await;

    assert_eq!(second.outcome, CrawlOutcome::Completed);
    assert_eq!(second.tally.inserted, 0);
    assert_eq!(second.tally.updated, 0);
    assert_eq!(second.tally.unchanged, 2);

    let after = crawler.storage().lock().unwrap().get_records(USER).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_recrawl_picks_up_edited_review() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[(1, 4, "Good"), (2, 3, "")]).await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    crawl(&crawler, None).await;

    let key = format!("{}/subject/1/", server.uri());
    let original = crawler
        .storage()
        .lock()
        .unwrap()
        .get_record(USER, &key)
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    server.reset().await;
    mount_page(&server, 1, &[(1, 5, "Better the second time"), (2, 3, "")]).await;

    let report = crawl(&crawler, None).await;
    assert_eq!(report.tally.updated, 1);
    assert_eq!(report.tally.unchanged, 1);

    let edited = crawler
        .storage()
        .lock()
        .unwrap()
        .get_record(USER, &key)
        .unwrap()
        .unwrap();
    assert_eq!(edited.review_content, "Better the second time");
    assert_eq!(edited.rating, Rating::FiveStars);
    assert_eq!(edited.first_seen_at, original.first_seen_at);
    assert!(edited.last_updated_at > original.last_updated_at);
    assert_eq!(stored(&crawler), 2);
}

#[tokio::test]
async fn test_progress_events_and_reader_connection() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_page(&server, 1, &[(1, 5, "A"), (2, 4, "")]).await;
    mount_page(&server, 2, &[(3, 3, "C")]).await;

    let config = test_config(&server, &dir);
    let db_path = config.output.database_path.clone();
    let crawler = Crawler::open(config).unwrap();

    let mut handle = crawler.start_crawl(USER, TOKEN, None).unwrap();
    let mut pages = Vec::new();
    let mut finished = None;
    while let Some(event) = handle.next_event().await {
        match event {
            CrawlEvent::Progress(progress) => pages.push(progress.page),
            CrawlEvent::PageSkipped(_) => panic!("no page should be skipped"),
            CrawlEvent::Finished(report) => finished = Some(report),
        }
    }
    assert_eq!(pages, vec![1, 2]);
    assert_eq!(finished.map(|r| r.committed), Some(3));

    // A separate read-only connection sees the committed data
    let reader = SqliteStorage::open_reader(Path::new(&db_path)).unwrap();
    let summary = get_summary(&reader, USER, DateRange::all()).unwrap();
    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.reviewed_count, 2);
    assert!(summary.rating_histogram.values().sum::<u64>() <= summary.total_count);

    let projection = get_export_projection(&reader, USER, DateRange::all()).unwrap();
    assert_eq!(projection.records.len(), 3);
    assert_eq!(projection.summary, summary);
}

#[tokio::test]
async fn test_one_crawl_at_a_time() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_status(
        &server,
        1,
        ResponseTemplate::new(200)
            .set_body_string(crate::support::listing_html(&[(1, 5, "")]))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let first = crawler.start_crawl(USER, TOKEN, None).unwrap();
    assert!(crawler.is_running());

    let second = crawler.start_crawl(USER, TOKEN, None);
    assert!(matches!(second, Err(LedgerError::CrawlInProgress)));

    // A crawler over a different database shares the same slot
    let other_dir = TempDir::new().unwrap();
    let other = Crawler::open(test_config(&server, &other_dir)).unwrap();
    assert!(other.is_running());
    let third = other.start_crawl("someone-else", TOKEN, None);
    assert!(matches!(third, Err(LedgerError::CrawlInProgress)));

    let report = first.wait().await.unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert!(!crawler.is_running());
    assert!(!other.is_running());
}

#[tokio::test]
async fn test_stop_request_ends_cleanly() {
    let _slot = exclusive().await;
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    for page in 1..=3 {
        mount_status(
            &server,
            page,
            ResponseTemplate::new(200)
                .set_body_string(crate::support::listing_html(&[(page, 4, "")]))
                .set_delay(Duration::from_millis(200)),
        )
        .await;
    }

    let crawler = Crawler::open(test_config(&server, &dir)).unwrap();
    let mut handle = crawler.start_crawl(USER, TOKEN, None).unwrap();

    // Ask to stop once the first page is committed
    while let Some(event) = handle.next_event().await {
        if let CrawlEvent::Progress(progress) = event {
            assert_eq!(progress.page, 1);
            assert!(handle.request_stop());
            break;
        }
    }

    let report = handle.wait().await.unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Stopped);
    // The page in flight when the stop arrived may or may not have been fetched
    assert!(report.pages_done >= 1 && report.pages_done <= 2);
    assert_eq!(stored(&crawler), report.committed);
}
