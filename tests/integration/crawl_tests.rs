//! Integration tests for the crawler
//!
//! These tests use wiremock to serve review listings and drive full sessions through the
//! real HTTP loader, the SQLite store and the SQLite sink.

use chrono::NaiveDate;
use review_sweep::config::{
    Config, CrawlerConfig, SelectorConfig, SiteConfig, StorageConfig, UserAgentConfig,
};
use review_sweep::crawler::{
    BatchOptions, BatchOutcome, HttpLoader, QueueEntry, QueueManager, RunOutcome, SessionRunner,
    StartRequest,
};
use review_sweep::output::{ObserverSet, SqliteSink};
use review_sweep::storage::open_store;
use review_sweep::{CrawlMode, SessionStatus};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TARGET: &str = "B00TEST123";

/// Creates a test configuration with one site served by the mock server
fn create_test_config(base_url: &str, mode: CrawlMode, db_path: &Path) -> Config {
    let host = Url::parse(base_url)
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string();

    Config {
        crawler: CrawlerConfig {
            min_delay_ms: 0,
            max_delay_ms: 5,
            request_timeout_secs: 5,
            max_pages: 50,
            rate_limit_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 10,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: db_path.display().to_string(),
        },
        sites: vec![SiteConfig {
            name: "mock".to_string(),
            domain: host,
            mode,
            target_pattern: r"/(?:item|reviews)/([A-Z0-9]{10})".to_string(),
            listing_url: format!("{}/reviews/{{target}}?page={{page}}", base_url),
            page_param: "page".to_string(),
            challenge_markers: vec!["Enter the characters you see below".to_string()],
            selectors: SelectorConfig {
                review: "div.review".to_string(),
                title: "h3".to_string(),
                body: "p.text".to_string(),
                author: "span.author".to_string(),
                date: Some("span.date".to_string()),
                rating: Some("span.stars".to_string()),
                next_page: Some("a.next".to_string()),
                total_count: None,
                page_size: None,
            },
        }],
    }
}

/// Renders a listing page; each review is (body, author, date)
fn listing(reviews: &[(&str, &str, &str)], has_next: bool) -> String {
    let mut html = String::from("<html><body><div id='reviews'>");
    for (body, author, date) in reviews {
        html.push_str(&format!(
            r#"<div class="review">
                <h3>Review by {author}</h3>
                <span class="stars" aria-label="4.0 out of 5 stars"></span>
                <span class="author">{author}</span>
                <span class="date">Reviewed on {date}</span>
                <p class="text">{body}</p>
            </div>"#
        ));
    }
    html.push_str("</div>");
    if has_next {
        html.push_str(r#"<a class="next" href="?page=next">Next</a>"#);
    }
    html.push_str("</body></html>");
    html
}

async fn mount_page(server: &MockServer, target: &str, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/reviews/{}", target)))
        .and(query_param("page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

struct Setup {
    runner: Arc<SessionRunner>,
    sink: Arc<SqliteSink>,
    _dir: TempDir,
}

fn setup(server: &MockServer, mode: CrawlMode) -> Setup {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("sweep.db");
    let config = create_test_config(&server.uri(), mode, &db_path);

    let store = open_store(&db_path).expect("Failed to open store");
    let sink = Arc::new(SqliteSink::new(&db_path).expect("Failed to open sink"));
    let loader = HttpLoader::from_config(&config.user_agent, &config.crawler)
        .expect("Failed to build loader");
    let runner = SessionRunner::new(
        Arc::new(config),
        store,
        Arc::new(loader),
        sink.clone(),
        ObserverSet::new(),
    );

    Setup {
        runner: Arc::new(runner),
        sink,
        _dir: dir,
    }
}

fn request(server: &MockServer, path: &str) -> StartRequest {
    StartRequest::new(Url::parse(&format!("{}{}", server.uri(), path)).unwrap())
}

#[tokio::test]
async fn test_fetch_mode_collects_all_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(
            &[("Works well", "Ana", "June 10, 2024"), ("Broke fast", "Ben", "June 5, 2024")],
            true,
        )),
    )
    .await;
    mount_page(
        &server,
        TARGET,
        2,
        html(listing(&[("Decent", "Cy", "May 20, 2024")], false)),
    )
    .await;

    let setup = setup(&server, CrawlMode::Fetch);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    assert_eq!(
        outcome,
        RunOutcome::Finished {
            status: SessionStatus::Completed,
            collected: 3,
            note: None,
        }
    );
    assert_eq!(setup.sink.count(Some(TARGET)).unwrap(), 3);
}

#[tokio::test]
async fn test_navigation_mode_redirects_then_paginates() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(&[("First", "Ana", "June 10, 2024")], true)),
    )
    .await;
    mount_page(
        &server,
        TARGET,
        2,
        html(listing(&[("Second", "Ben", "June 9, 2024")], true)),
    )
    .await;
    mount_page(
        &server,
        TARGET,
        3,
        html(listing(&[("Third", "Cy", "June 8, 2024")], false)),
    )
    .await;

    let setup = setup(&server, CrawlMode::Navigation);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    assert!(matches!(
        outcome,
        RunOutcome::Finished {
            status: SessionStatus::Completed,
            collected: 3,
            ..
        }
    ));

    let session = setup.runner.context().session().unwrap().unwrap();
    assert_eq!(session.last_processed_page, Some(3));
    assert_eq!(session.mode, CrawlMode::Navigation);
}

#[tokio::test]
async fn test_same_review_on_two_pages_is_stored_once() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(
            &[("Works well", "Ana", "June 10, 2024"), ("Shifted", "Ben", "June 5, 2024")],
            true,
        )),
    )
    .await;
    // A new review pushed "Shifted" onto the second page
    mount_page(
        &server,
        TARGET,
        2,
        html(listing(
            &[("Shifted", "Ben", "June 5, 2024"), ("Decent", "Cy", "May 20, 2024")],
            false,
        )),
    )
    .await;

    let setup = setup(&server, CrawlMode::Fetch);
    setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    let session = setup.runner.context().session().unwrap().unwrap();
    assert_eq!(session.collected_count, 3);
    assert_eq!(session.duplicates_dropped, 1);
    assert_eq!(setup.sink.count(Some(TARGET)).unwrap(), 3);
}

#[tokio::test]
async fn test_challenge_page_fails_session() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html("<html><body><form>Enter the characters you see below</form></body></html>".into()),
    )
    .await;

    let setup = setup(&server, CrawlMode::Fetch);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    match outcome {
        RunOutcome::Finished { status, note, .. } => {
            assert_eq!(status, SessionStatus::Failed);
            assert!(note.unwrap().contains("challenge"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(setup.sink.count(None).unwrap(), 0);
}

#[tokio::test]
async fn test_listing_redirected_to_challenge_fails_session() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        ResponseTemplate::new(302).insert_header("location", "/errors/validateCaptcha"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/errors/validateCaptcha"))
        .respond_with(html(
            "<html><head><title>Shop</title></head><body>\
             <form action='/errors/validateCaptcha'><input name='field-keywords'></form>\
             </body></html>"
                .into(),
        ))
        .mount(&server)
        .await;

    let setup = setup(&server, CrawlMode::Navigation);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    match outcome {
        RunOutcome::Finished { status, note, .. } => {
            assert_eq!(status, SessionStatus::Failed);
            assert!(note.unwrap().contains("challenge"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_review_mentioning_captcha_is_stored() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(
            &[("The captcha on the app is annoying. Are you a robot?", "Ana", "June 1, 2024")],
            false,
        )),
    )
    .await;

    let setup = setup(&server, CrawlMode::Fetch);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    assert!(matches!(
        outcome,
        RunOutcome::Finished {
            status: SessionStatus::Completed,
            collected: 1,
            ..
        }
    ));
    assert_eq!(setup.sink.count(Some(TARGET)).unwrap(), 1);
}

#[tokio::test]
async fn test_incremental_run_stops_at_watermark() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(
            &[
                ("Newest", "Ana", "June 10, 2024"),
                ("On the day", "Ben", "June 1, 2024"),
                ("Older", "Cy", "May 20, 2024"),
            ],
            true,
        )),
    )
    .await;
    let second_page = Mock::given(method("GET"))
        .and(path(format!("/reviews/{}", TARGET)))
        .and(query_param("page", "2"))
        .respond_with(html(listing(&[("Oldest", "Di", "May 1, 2024")], false)))
        .expect(0)
        .named("second page");
    server.register(second_page).await;

    let setup = setup(&server, CrawlMode::Fetch);
    let mut incremental = request(&server, "/item/B00TEST123");
    incremental.incremental_only = true;
    incremental.watermark_date = NaiveDate::from_ymd_opt(2024, 6, 1);

    let outcome = setup.runner.run(incremental).await.expect("Run failed");
    match outcome {
        RunOutcome::Finished {
            status,
            collected,
            note,
        } => {
            assert_eq!(status, SessionStatus::Completed);
            assert_eq!(collected, 2);
            assert!(note.unwrap().contains("watermark"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(setup.sink.count(Some(TARGET)).unwrap(), 2);
}

#[tokio::test]
async fn test_resync_defaults_to_last_completion() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(&[("Old news", "Ana", "January 3, 2020")], false)),
    )
    .await;

    let setup = setup(&server, CrawlMode::Fetch);
    setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("First run failed");

    let mut resync = request(&server, "/item/B00TEST123");
    resync.incremental_only = true;
    let outcome = setup.runner.run(resync).await.expect("Second run failed");

    assert!(matches!(
        outcome,
        RunOutcome::Finished {
            status: SessionStatus::Completed,
            collected: 0,
            ..
        }
    ));
    let session = setup.runner.context().session().unwrap().unwrap();
    assert_eq!(session.stale_dropped, 1);
    assert_eq!(setup.sink.count(Some(TARGET)).unwrap(), 1);
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/reviews/{}", TARGET)))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        TARGET,
        1,
        html(listing(&[("Worth the wait", "Ana", "June 10, 2024")], false)),
    )
    .await;

    let setup = setup(&server, CrawlMode::Fetch);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    assert!(matches!(
        outcome,
        RunOutcome::Finished {
            status: SessionStatus::Completed,
            collected: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_persistent_rate_limit_fails_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let setup = setup(&server, CrawlMode::Fetch);
    let outcome = setup
        .runner
        .run(request(&server, "/item/B00TEST123"))
        .await
        .expect("Run failed");

    match outcome {
        RunOutcome::Finished { status, note, .. } => {
            assert_eq!(status, SessionStatus::Failed);
            assert!(note.unwrap().contains("rate limited"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_continues_past_failed_target() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "B00FIRST01",
        1,
        html(listing(&[("Fine", "Ana", "June 10, 2024")], false)),
    )
    .await;
    mount_page(
        &server,
        "B00BROKEN2",
        1,
        ResponseTemplate::new(500).set_body_string("Internal Server Error"),
    )
    .await;
    mount_page(
        &server,
        "B00THIRD03",
        1,
        html(listing(&[("Great", "Ben", "June 9, 2024")], false)),
    )
    .await;

    let setup = setup(&server, CrawlMode::Navigation);
    let queue = QueueManager::new(setup.runner.clone());
    for target in ["B00FIRST01", "B00BROKEN2", "B00THIRD03"] {
        queue
            .enqueue(QueueEntry::new(format!("{}/item/{}", server.uri(), target)))
            .expect("Failed to enqueue");
    }

    let report = match queue.start_batch(BatchOptions::default()).await.unwrap() {
        BatchOutcome::Finished(report) => report,
        BatchOutcome::Rejected(reason) => panic!("batch rejected: {}", reason),
    };

    let statuses: Vec<_> = report.targets.iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        vec![
            Some(SessionStatus::Completed),
            Some(SessionStatus::Failed),
            Some(SessionStatus::Completed),
        ]
    );
    assert_eq!(report.collected(), 2);
    assert!(queue.list().unwrap().is_empty());

    let counts = setup.sink.count_by_target().unwrap();
    assert_eq!(
        counts,
        vec![("B00FIRST01".to_string(), 1), ("B00THIRD03".to_string(), 1)]
    );
}
