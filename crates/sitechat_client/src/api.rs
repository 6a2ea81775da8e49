//! Request and response bodies of the crawl/index backend.
use serde::{Deserialize, Serialize};
use sitechat_core::{ChatId, CrawlId, Message, PageTreeNode, Source};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub max_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScrapedPage {
    pub page_id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,
    #[serde(default)]
    pub pages: Vec<ScrapedPage>,
    pub crawl_id: CrawlId,
    pub chat_id: ChatId,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateChatRequest {
    pub crawl_id: CrawlId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateChatResponse {
    pub chat_id: ChatId,
    pub crawl_id: CrawlId,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatTreeResponse {
    pub chat_id: ChatId,
    #[serde(default)]
    pub crawl_id: Option<CrawlId>,
    #[serde(default)]
    pub tree: Vec<PageTreeNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatMessagesResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub chat_id: ChatId,
    pub query: String,
    pub limit: u32,
}

/// Answer to a retrieval query. `metadata` (model, chunk count, content
/// length) is informational only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub crawl_id: Option<CrawlId>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarizeRequest {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub crawl_id: Option<CrawlId>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A stored crawl as listed by `GET /crawls`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrawlRecord {
    pub crawl_id: CrawlId,
    pub url: String,
    /// ISO 8601, with or without an offset.
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub page_count: u64,
}

/// A page the widget host declares for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetPage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<std::collections::BTreeMap<String, String>>,
}

impl WidgetPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetIndexRequest<'a> {
    pub site_id: &'a str,
    pub api_key: &'a str,
    pub pages: &'a [WidgetPage],
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetInitResponse {
    pub has_embeddings: bool,
    #[serde(default)]
    pub indexed_page_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetRefreshResponse {
    #[serde(default)]
    pub indexed_page_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetQueryRequest<'a> {
    pub site_id: &'a str,
    pub api_key: &'a str,
    pub query: &'a str,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WidgetQueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}
