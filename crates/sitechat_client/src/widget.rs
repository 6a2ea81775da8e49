//! Embeddable widget sessions keyed by `(site_id, api_key)`.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use client_logging::{client_debug, client_info, client_warn};
use sitechat_core::{ChatId, CrawlId, Message, Role, WidgetStatus};

use crate::api::{CrawlRecord, QueryRequest, ScrapeRequest, WidgetPage};
use crate::backend::Backend;
use crate::ids::MessageIds;
use crate::ClientError;

pub const DEFAULT_GREETING: &str =
    "Hello! I'm your context-aware assistant. How can I help you today?";
const ERROR_REPLY_PREFIX: &str = "Sorry, I encountered an error: ";
const DEFAULT_QUERY_LIMIT: u32 = 5;
const DEFAULT_CRAWL_FAILURE: &str = "Failed to crawl website";

/// A stored crawl of the same URL younger than this is reused instead of recrawling.
pub const CRAWL_REUSE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// A message with the local time it was added.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedMessage {
    pub message: Message,
    pub at: DateTime<Local>,
}

/// Ordered widget conversation, starting with a greeting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    entries: Vec<TimedMessage>,
}

impl Conversation {
    pub fn with_greeting(greeting: &str) -> Self {
        let mut conversation = Self::default();
        conversation.push(Message::assistant("0", greeting, Vec::new()));
        conversation
    }

    pub fn push(&mut self, message: Message) {
        self.push_at(message, Local::now());
    }

    pub fn push_at(&mut self, message: Message, at: DateTime<Local>) {
        self.entries.push(TimedMessage { message, at });
    }

    /// Replaces the conversation with loaded history, unless it is empty.
    pub fn replace_with_history(&mut self, history: Vec<Message>) {
        if history.is_empty() {
            return;
        }
        let at = Local::now();
        self.entries = history
            .into_iter()
            .map(|message| TimedMessage { message, at })
            .collect();
    }

    pub fn entries(&self) -> &[TimedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|entry| &entry.message)
    }

    /// Plain-text export: `[HH:MM:SS] You|Assistant: content`, blank-line separated.
    pub fn transcript(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let sender = match entry.message.role {
                    Role::User => "You",
                    Role::Assistant => "Assistant",
                };
                format!(
                    "[{}] {}: {}",
                    entry.at.format("%H:%M:%S"),
                    sender,
                    entry.message.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct WidgetConfig {
    pub site_id: Option<String>,
    pub api_key: Option<String>,
    /// Pages the host declares for indexing.
    pub pages: Vec<WidgetPage>,
    pub initial_message: Option<String>,
    pub query_limit: Option<u32>,
}

impl WidgetConfig {
    fn credentials(&self) -> Option<(&str, &str)> {
        let site_id = self.site_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let api_key = self.api_key.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((site_id, api_key))
    }

    fn greeting(&self) -> &str {
        self.initial_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_GREETING)
    }
}

/// Initialization status and site-scoped querying for one embedded widget.
pub struct WidgetBridge {
    backend: Arc<dyn Backend>,
    config: WidgetConfig,
    status: WidgetStatus,
    conversation: Conversation,
    ids: MessageIds,
}

impl WidgetBridge {
    /// Initializes indexing for the declared pages when both credentials are set.
    ///
    /// Failures are recorded in [`WidgetBridge::status`], never returned.
    pub async fn connect(backend: Arc<dyn Backend>, config: WidgetConfig) -> Self {
        let conversation = Conversation::with_greeting(config.greeting());
        let mut bridge = Self {
            backend,
            config,
            status: WidgetStatus::new(),
            conversation,
            ids: MessageIds::new(),
        };
        bridge.initialize().await;
        bridge
    }

    async fn initialize(&mut self) {
        let Some((site_id, api_key)) = self.config.credentials() else {
            client_warn!("Widget has no site id or api key; skipping initialization");
            return;
        };
        self.status.begin();
        match self
            .backend
            .widget_init(site_id, api_key, &self.config.pages)
            .await
        {
            Ok(response) => {
                client_info!(
                    "Widget {} initialized ({} pages indexed)",
                    site_id,
                    response.indexed_page_count
                );
                self.status
                    .initialized(response.has_embeddings, response.indexed_page_count);
            }
            Err(err) => {
                client_warn!("Widget {} failed to initialize: {}", site_id, err);
                self.status.init_failed(err.to_string());
            }
        }
    }

    pub fn status(&self) -> &WidgetStatus {
        &self.status
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Re-indexes the declared pages; returns the new indexed page count.
    pub async fn refresh_embeddings(&mut self) -> Result<u64, ClientError> {
        let Some((site_id, api_key)) = self.config.credentials() else {
            return Err(ClientError::InvalidState("widget has no site id or api key"));
        };
        self.status.begin();
        match self
            .backend
            .widget_refresh(site_id, api_key, &self.config.pages)
            .await
        {
            Ok(response) => {
                self.status.refreshed(response.indexed_page_count);
                Ok(response.indexed_page_count)
            }
            Err(err) => {
                client_warn!("Widget {} refresh failed: {}", site_id, err);
                self.status.refresh_failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Asks a question against the site index. Request failures become an
    /// apologetic assistant turn.
    pub async fn send_message(&mut self, query: &str) -> Result<(), ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::InvalidState("query must not be empty"));
        }
        let Some((site_id, api_key)) = self.config.credentials() else {
            return Err(ClientError::InvalidState("widget has no site id or api key"));
        };
        let limit = self.config.query_limit.unwrap_or(DEFAULT_QUERY_LIMIT);

        self.conversation
            .push(Message::user(self.ids.next(), query));
        let reply = match self
            .backend
            .widget_query(site_id, api_key, query, limit)
            .await
        {
            Ok(response) => Message::assistant(self.ids.next(), response.answer, response.sources),
            Err(err) => {
                client_warn!("Widget query failed: {}", err);
                error_reply(self.ids.next(), &err)
            }
        };
        self.conversation.push(reply);
        Ok(())
    }
}

/// How a widget chat gets its chat id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSeed {
    /// Continue an existing chat and load its history.
    Resume(ChatId),
    /// Create a new chat over a finished crawl.
    Bootstrap(CrawlId),
}

/// Chat over one crawl from inside the widget.
pub struct WidgetChat {
    backend: Arc<dyn Backend>,
    chat_id: Option<ChatId>,
    crawl_id: Option<CrawlId>,
    conversation: Conversation,
    is_loading: bool,
    query_limit: u32,
    ids: MessageIds,
}

impl WidgetChat {
    /// Opens the chat from `seed`. Load and create failures are logged and
    /// leave the greeting in place; without a chat id queries are refused.
    pub async fn open(
        backend: Arc<dyn Backend>,
        seed: Option<ChatSeed>,
        initial_message: Option<&str>,
    ) -> Self {
        let greeting = initial_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_GREETING);
        let mut chat = Self {
            backend,
            chat_id: None,
            crawl_id: None,
            conversation: Conversation::with_greeting(greeting),
            is_loading: false,
            query_limit: DEFAULT_QUERY_LIMIT,
            ids: MessageIds::new(),
        };
        match seed {
            Some(ChatSeed::Resume(chat_id)) => chat.resume(chat_id).await,
            Some(ChatSeed::Bootstrap(crawl_id)) => chat.bootstrap(crawl_id).await,
            None => {}
        }
        chat
    }

    pub fn with_query_limit(mut self, limit: u32) -> Self {
        self.query_limit = limit;
        self
    }

    async fn resume(&mut self, chat_id: ChatId) {
        match self.backend.chat_messages(&chat_id).await {
            Ok(history) => self.conversation.replace_with_history(history),
            Err(err) => client_warn!("Failed to load history of chat {}: {}", chat_id, err),
        }
        self.chat_id = Some(chat_id);
    }

    async fn bootstrap(&mut self, crawl_id: CrawlId) {
        match self.backend.create_chat(&crawl_id).await {
            Ok(response) => {
                client_info!("Chat {} created for crawl {}", response.chat_id, crawl_id);
                self.chat_id = Some(response.chat_id);
                self.crawl_id = Some(crawl_id);
            }
            Err(err) => {
                client_warn!("Failed to create a chat for crawl {}: {}", crawl_id, err);
                self.crawl_id = Some(crawl_id);
            }
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn crawl_id(&self) -> Option<&str> {
        self.crawl_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn transcript(&self) -> String {
        self.conversation.transcript()
    }

    pub async fn send_message(&mut self, query: &str) -> Result<(), ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::InvalidState("query must not be empty"));
        }
        let chat_id = self
            .chat_id
            .clone()
            .ok_or(ClientError::InvalidState("chat not initialized"))?;

        self.conversation.push(Message::user(self.ids.next(), query));
        self.is_loading = true;
        let request = QueryRequest {
            chat_id,
            query: query.to_string(),
            limit: self.query_limit,
        };
        let reply = match self.backend.query(&request).await {
            Ok(response) => Message::assistant(self.ids.next(), response.answer, response.sources),
            Err(err) => {
                client_warn!("Widget chat query failed: {}", err);
                error_reply(self.ids.next(), &err)
            }
        };
        self.conversation.push(reply);
        self.is_loading = false;
        Ok(())
    }
}

/// Crawl id for `url`: a crawl of the same URL created within
/// [`CRAWL_REUSE_WINDOW`], else a fresh synchronous crawl.
///
/// An unavailable crawl list only means nothing can be reused.
pub async fn find_or_start_crawl(
    backend: &dyn Backend,
    url: &str,
    max_depth: u32,
) -> Result<CrawlId, ClientError> {
    match backend.list_crawls().await {
        Ok(crawls) => {
            if let Some(crawl) = recent_crawl(&crawls, url, Utc::now()) {
                client_info!("Reusing crawl {} of {}", crawl.crawl_id, url);
                return Ok(crawl.crawl_id.clone());
            }
        }
        Err(err) => client_debug!("Crawl list unavailable, not reusing: {}", err),
    }

    client_info!("Starting a new crawl of {}", url);
    let request = ScrapeRequest {
        url: url.to_string(),
        max_depth,
    };
    let response = backend.scrape(&request).await?;
    if !response.success {
        let message = response
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CRAWL_FAILURE.to_string());
        return Err(ClientError::Stream(message));
    }
    Ok(response.crawl_id)
}

fn recent_crawl<'a>(
    crawls: &'a [CrawlRecord],
    url: &str,
    now: DateTime<Utc>,
) -> Option<&'a CrawlRecord> {
    let window = chrono::Duration::from_std(CRAWL_REUSE_WINDOW).ok()?;
    crawls.iter().find(|crawl| {
        crawl.url == url
            && created_at(&crawl.created_at).is_some_and(|at| at > now - window)
    })
}

/// Parses RFC 3339, or a naive ISO timestamp taken as local time.
fn created_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

fn error_reply(id: String, err: &ClientError) -> Message {
    Message::assistant(id, format!("{ERROR_REPLY_PREFIX}{err}"), Vec::new())
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone, Utc};
    use sitechat_core::Message;

    use super::{created_at, recent_crawl, Conversation, DEFAULT_GREETING};
    use crate::api::CrawlRecord;

    fn record(crawl_id: &str, url: &str, created_at: &str) -> CrawlRecord {
        CrawlRecord {
            crawl_id: crawl_id.into(),
            url: url.into(),
            created_at: created_at.into(),
            page_count: 3,
        }
    }

    #[test]
    fn transcript_labels_senders_and_separates_turns() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap();
        let mut conversation = Conversation::default();
        conversation.push_at(Message::user("1", "What is this site?"), at);
        conversation.push_at(Message::assistant("2", "A **docs** site.", Vec::new()), at);

        assert_eq!(
            conversation.transcript(),
            "[09:03:07] You: What is this site?\n\n[09:03:07] Assistant: A **docs** site."
        );
    }

    #[test]
    fn empty_history_keeps_the_greeting() {
        let mut conversation = Conversation::with_greeting(DEFAULT_GREETING);
        conversation.replace_with_history(Vec::new());
        assert_eq!(conversation.len(), 1);

        conversation.replace_with_history(vec![Message::user("7", "hi")]);
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.last().unwrap().content, "hi");
    }

    #[test]
    fn only_a_recent_crawl_of_the_same_url_is_reused() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let crawls = vec![
            record("stale", "https://example.com", "2024-05-01T10:30:00Z"),
            record("other", "https://other.example", "2024-05-01T11:50:00Z"),
            record("garbled", "https://example.com", "yesterday"),
            record("fresh", "https://example.com", "2024-05-01T11:15:00+00:00"),
        ];

        let found = recent_crawl(&crawls, "https://example.com", now).map(|c| c.crawl_id.as_str());
        assert_eq!(found, Some("fresh"));
        assert!(recent_crawl(&crawls, "https://example.com/docs", now).is_none());
    }

    #[test]
    fn naive_timestamps_are_read_as_local_time() {
        let local = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(
            created_at("2024-05-01T09:30:00.123456").map(|at| at.timestamp()),
            Some(local.timestamp())
        );
        assert!(created_at("").is_none());
    }
}
