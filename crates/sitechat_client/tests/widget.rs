use std::sync::{Arc, Once};
use std::time::Duration;

use pretty_assertions::assert_eq;
use sitechat_client::{
    find_or_start_crawl, ChatSeed, ClientError, ClientSettings, ReqwestBackend, RetryPolicy,
    WidgetBridge, WidgetChat, WidgetConfig, WidgetPage, DEFAULT_GREETING,
};
use sitechat_core::{Role, WidgetPhase, NO_EMBEDDINGS_HINT};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(client_logging::initialize_for_tests);
}

fn backend_for(server: &MockServer) -> Arc<ReqwestBackend> {
    let settings = ClientSettings {
        retry: RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
            timeout: Duration::from_secs(2),
        },
        ..ClientSettings::with_base_url(server.uri())
    };
    Arc::new(ReqwestBackend::new(settings).unwrap())
}

fn config() -> WidgetConfig {
    WidgetConfig {
        site_id: Some("site-1".into()),
        api_key: Some("key-1".into()),
        pages: vec![
            WidgetPage::new("https://shop.example.com/"),
            WidgetPage::new("https://shop.example.com/faq"),
        ],
        ..WidgetConfig::default()
    }
}

async fn mount_init(server: &MockServer, has_embeddings: bool, count: u64) {
    Mock::given(method("POST"))
        .and(path("/widget/init"))
        .and(body_partial_json(serde_json::json!({"site_id": "site-1", "api_key": "key-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "has_embeddings": has_embeddings,
            "indexed_page_count": count
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn missing_credentials_skip_initialization() {
    init_logging();
    let server = MockServer::start().await;

    let bridge = WidgetBridge::connect(
        backend_for(&server),
        WidgetConfig {
            site_id: Some("site-1".into()),
            ..WidgetConfig::default()
        },
    )
    .await;

    assert_eq!(bridge.status().phase(), WidgetPhase::Unconfigured);
    assert!(!bridge.status().is_initializing());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn existing_embeddings_make_the_widget_ready() {
    init_logging();
    let server = MockServer::start().await;
    mount_init(&server, true, 2).await;

    let bridge = WidgetBridge::connect(backend_for(&server), config()).await;

    let status = bridge.status();
    assert_eq!(status.phase(), WidgetPhase::Ready);
    assert_eq!(status.indexed_page_count(), 2);
    assert_eq!(status.error(), None);
    assert!(!status.is_initializing());
}

#[tokio::test]
async fn missing_embeddings_need_a_refresh() {
    init_logging();
    let server = MockServer::start().await;
    mount_init(&server, false, 0).await;
    Mock::given(method("POST"))
        .and(path("/widget/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"indexed_page_count": 2})),
        )
        .mount(&server)
        .await;

    let mut bridge = WidgetBridge::connect(backend_for(&server), config()).await;
    assert_eq!(bridge.status().phase(), WidgetPhase::NeedsEmbeddings);
    assert_eq!(bridge.status().error(), Some(NO_EMBEDDINGS_HINT));

    let count = bridge.refresh_embeddings().await.unwrap();
    assert_eq!(count, 2);
    assert!(bridge.status().is_ready());
    assert!(!bridge.status().is_initializing());
    assert_eq!(bridge.status().error(), None);
}

#[tokio::test]
async fn failed_refresh_records_error_and_clears_initializing() {
    init_logging();
    let server = MockServer::start().await;
    mount_init(&server, false, 0).await;
    Mock::given(method("POST"))
        .and(path("/widget/refresh"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "Indexer offline"})),
        )
        .mount(&server)
        .await;

    let mut bridge = WidgetBridge::connect(backend_for(&server), config()).await;
    let err = bridge.refresh_embeddings().await.unwrap_err();

    assert_eq!(err.to_string(), "Indexer offline");
    let status = bridge.status();
    assert!(!status.is_ready());
    assert!(!status.is_initializing());
    assert_eq!(status.error(), Some("Indexer offline"));
}

#[tokio::test]
async fn failed_init_is_recorded() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/widget/init"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"detail": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let bridge = WidgetBridge::connect(backend_for(&server), config()).await;
    assert_eq!(bridge.status().phase(), WidgetPhase::Failed);
    assert_eq!(bridge.status().error(), Some("Invalid API key"));
}

#[tokio::test]
async fn widget_query_failure_becomes_an_apology() {
    init_logging();
    let server = MockServer::start().await;
    mount_init(&server, true, 2).await;
    Mock::given(method("POST"))
        .and(path("/widget/query"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(serde_json::json!({"detail": "Try again later"})),
        )
        .mount(&server)
        .await;

    let mut bridge = WidgetBridge::connect(backend_for(&server), config()).await;
    bridge.send_message("Do you ship abroad?").await.unwrap();

    let conversation = bridge.conversation();
    assert_eq!(conversation.len(), 3);
    assert_eq!(
        conversation.last().unwrap().content,
        "Sorry, I encountered an error: Try again later"
    );
}

#[tokio::test]
async fn widget_query_answers_with_sources() {
    init_logging();
    let server = MockServer::start().await;
    mount_init(&server, true, 2).await;
    Mock::given(method("POST"))
        .and(path("/widget/query"))
        .and(body_partial_json(serde_json::json!({"query": "Do you ship abroad?", "limit": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "answer": "Yes, to the EU.",
            "sources": [{"url": "https://shop.example.com/faq", "title": "FAQ", "score": 0.7}]
        })))
        .mount(&server)
        .await;

    let mut bridge = WidgetBridge::connect(backend_for(&server), config()).await;
    bridge.send_message("Do you ship abroad?").await.unwrap();

    let reply = bridge.conversation().last().unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "Yes, to the EU.");
    assert_eq!(reply.sources[0].title, "FAQ");
}

#[tokio::test]
async fn resumed_chat_replaces_greeting_with_history() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats/c1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [
                {"message_id": "m1", "role": "user", "content": "hi"},
                {"message_id": "m2", "role": "assistant", "content": "hello"}
            ]
        })))
        .mount(&server)
        .await;

    let chat = WidgetChat::open(
        backend_for(&server),
        Some(ChatSeed::Resume("c1".into())),
        None,
    )
    .await;

    assert_eq!(chat.chat_id(), Some("c1"));
    let ids: Vec<&str> = chat
        .conversation()
        .entries()
        .iter()
        .map(|e| e.message.id.as_str())
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert!(chat.transcript().contains("] You: hi\n\n["));
}

#[tokio::test]
async fn bootstrapped_chat_creates_a_chat_and_answers() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats"))
        .and(body_partial_json(serde_json::json!({"crawl_id": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "chat_id": "c9", "crawl_id": "r1", "message": "Chat created"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(serde_json::json!({"chat_id": "c9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "answer": "42", "sources": []
        })))
        .mount(&server)
        .await;

    let mut chat = WidgetChat::open(
        backend_for(&server),
        Some(ChatSeed::Bootstrap("r1".into())),
        Some("Welcome!"),
    )
    .await;
    assert_eq!(chat.chat_id(), Some("c9"));
    assert_eq!(chat.crawl_id(), Some("r1"));
    assert_eq!(chat.conversation().entries()[0].message.content, "Welcome!");

    chat.send_message("meaning?").await.unwrap();
    assert_eq!(chat.conversation().len(), 3);
    assert_eq!(chat.conversation().last().unwrap().content, "42");
    assert!(!chat.is_loading());
}

#[tokio::test]
async fn chat_without_seed_refuses_queries() {
    init_logging();
    let server = MockServer::start().await;

    let mut chat = WidgetChat::open(backend_for(&server), None, None).await;
    assert_eq!(chat.conversation().entries()[0].message.content, DEFAULT_GREETING);

    let err = chat.send_message("hello").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidState(_)));
    assert_eq!(chat.conversation().len(), 1);
}

#[tokio::test]
async fn recent_crawl_of_the_same_url_is_reused() {
    init_logging();
    let server = MockServer::start().await;
    let fresh = chrono::Utc::now() - chrono::Duration::minutes(10);
    let stale = chrono::Utc::now() - chrono::Duration::hours(3);
    Mock::given(method("GET"))
        .and(path("/crawls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"crawl_id": "old", "url": "https://shop.example.com", "created_at": stale.to_rfc3339(), "page_count": 9},
            {"crawl_id": "r5", "url": "https://shop.example.com", "created_at": fresh.to_rfc3339(), "page_count": 4}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let crawl_id = find_or_start_crawl(backend.as_ref(), "https://shop.example.com", 1)
        .await
        .unwrap();
    assert_eq!(crawl_id, "r5");
}

#[tokio::test]
async fn unknown_url_is_crawled_even_without_a_crawl_list() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crawls"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(body_partial_json(serde_json::json!({"url": "https://new.example.com", "max_depth": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true, "pages": [], "crawl_id": "r6", "chat_id": "c6", "message": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let crawl_id = find_or_start_crawl(backend.as_ref(), "https://new.example.com", 2)
        .await
        .unwrap();
    assert_eq!(crawl_id, "r6");
}

#[tokio::test]
async fn failed_crawl_surfaces_the_backend_detail() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crawls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": "Invalid URL"})),
        )
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let err = find_or_start_crawl(backend.as_ref(), "notaurl", 1)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid URL");
}
