//! Sitechat client: HTTP transport, crawl stream reader and the session
//! runtime that executes the core state machine's effects.
mod api;
mod backend;
mod config;
mod error;
mod ids;
mod persist;
mod sse;
mod store;
mod tracker;
mod transport;
mod widget;

pub use api::{
    ChatMessagesResponse, ChatTreeResponse, CrawlRecord, CreateChatRequest, CreateChatResponse,
    QueryRequest, QueryResponse, ScrapeRequest, ScrapeResponse, ScrapedPage, SummarizeRequest,
    SummarizeResponse, WidgetIndexRequest, WidgetInitResponse, WidgetPage, WidgetQueryRequest,
    WidgetQueryResponse, WidgetRefreshResponse,
};
pub use backend::{Backend, ReqwestBackend};
pub use config::{ClientSettings, RetryPolicy, StoreSettings, BASE_URL_ENV, DEFAULT_BASE_URL};
pub use error::{ClientError, GENERIC_FAILURE};
pub use ids::MessageIds;
pub use persist::{
    ensure_output_dir, AtomicFileWriter, CachedSession, PersistError, SessionCache,
    SESSION_FILENAME,
};
pub use sse::{scrape_events, FrameDecoder, ScrapeEventStream};
pub use store::{SessionStore, NO_CHAT_ID};
pub use transport::{request_with_retry, HttpTransport};
pub use widget::{
    find_or_start_crawl, ChatSeed, Conversation, TimedMessage, WidgetBridge, WidgetChat,
    WidgetConfig, CRAWL_REUSE_WINDOW, DEFAULT_GREETING,
};
