use std::sync::Once;
use std::time::Duration;

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use sitechat_client::{
    Backend, ClientError, ClientSettings, QueryRequest, ReqwestBackend, RetryPolicy,
    ScrapeRequest,
};
use sitechat_core::CrawlStatus;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(client_logging::initialize_for_tests);
}

fn backend_for(server: &MockServer, timeout: Duration) -> ReqwestBackend {
    let settings = ClientSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::from_millis(1),
            timeout,
        },
        ..ClientSettings::with_base_url(server.uri())
    };
    ReqwestBackend::new(settings).unwrap()
}

#[tokio::test]
async fn error_detail_is_surfaced_verbatim() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats/missing/tree"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({"detail": "Chat ID 'missing' not found"})),
        )
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_secs(2));
    let err = backend.chat_tree("missing").await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Chat ID 'missing' not found");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn error_without_detail_uses_generic_text() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/chats/c1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_secs(2));
    let err = backend.delete_chat("c1").await.unwrap_err();
    assert_eq!(err.to_string(), "request failed");
}

#[tokio::test]
async fn slow_response_times_out_after_one_attempt() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(400))
                .set_body_json(serde_json::json!([])),
        )
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_millis(50));
    let err = backend.list_chats().await.unwrap_err();

    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn previous_chats_decode_with_missing_fields() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "c1", "url": "https://docs.example.com/start", "title": null,
             "page_count": 12, "created_at": "2024-05-01T10:00:00Z"},
            {"id": "c2", "url": null, "title": null, "page_count": 0,
             "created_at": "2024-05-02T10:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_secs(2));
    let chats = backend.list_chats().await.unwrap();

    let titles: Vec<String> = chats.iter().map(|c| c.display_title()).collect();
    assert_eq!(titles, vec!["docs.example.com".to_string(), "Unknown".to_string()]);
    assert_eq!(chats[0].page_count, 12);
}

#[tokio::test]
async fn crawl_progress_and_cancel_use_crawl_paths() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crawls/r1/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "crawl_id": "r1", "status": "indexing", "progress_percentage": 55.5,
            "current_depth": 2, "max_depth": 3, "pages_indexed": 40,
            "pages_pending": 10, "pages_failed": 1, "total_links_found": 80
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crawls/r1/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_secs(2));
    let progress = backend.crawl_progress("r1").await.unwrap();
    assert_eq!(progress.status, CrawlStatus::Indexing);
    assert_eq!(progress.pages_indexed, 40);
    assert_eq!(progress.current_depth, 2);

    backend.cancel_crawl("r1").await.unwrap();
}

#[tokio::test]
async fn query_posts_chat_id_and_limit() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_json(serde_json::json!({"chat_id": "c1", "query": "what?", "limit": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "answer": "This.",
            "sources": [{"url": "https://a.example/1", "title": "One", "score": 0.9},
                        {"url": "https://a.example/2", "title": "Two", "score": 0.95}],
            "chat_id": "c1", "crawl_id": "r1",
            "metadata": {"model": "m", "chunks": 2}
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_secs(2));
    let response = backend
        .query(&QueryRequest {
            chat_id: "c1".into(),
            query: "what?".into(),
            limit: 5,
        })
        .await
        .unwrap();

    let urls: Vec<&str> = response.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.example/1", "https://a.example/2"]);
    assert!(response.metadata.is_some());
}

#[tokio::test]
async fn scrape_stream_yields_frames_in_order() {
    init_logging();
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"stage\":\"initializing\",\"message\":\"\"}\n\n",
        "data: {\"stage\":\"scraping\",\"message\":\"\",\"progress\":40}\n\n",
        "data: {\"stage\":\"complete\",\"message\":\"\",\"progress\":100,\"chat_id\":\"c1\",\"crawl_id\":\"r1\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/scrape/stream"))
        .and(body_json(serde_json::json!({"url": "https://example.com", "max_depth": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let backend = backend_for(&server, Duration::from_secs(2));
    let request = ScrapeRequest {
        url: "https://example.com".into(),
        max_depth: 1,
    };
    let frames: Vec<_> = backend
        .scrape_stream(&request)
        .await
        .unwrap()
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    let stages: Vec<&str> = frames.iter().map(|f| f.stage.as_str()).collect();
    assert_eq!(stages, vec!["initializing", "scraping", "complete"]);
    assert_eq!(frames[2].chat_id.as_deref(), Some("c1"));
}
