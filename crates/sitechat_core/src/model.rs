use serde::{Deserialize, Serialize};
use url::Url;

pub type ChatId = String;
pub type CrawlId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// Older backends store assistant turns as `"ai"`.
    #[serde(alias = "ai")]
    Assistant,
}

/// A citation attached to an assistant answer.
///
/// Order is backend-determined; the client never re-sorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "message_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sources: Vec<Source>,
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTreeNode {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub children: Vec<PageTreeNode>,
}

impl PageTreeNode {
    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(PageTreeNode::count).sum::<usize>()
    }
}

/// A row in the previous-sessions list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousChatSummary {
    #[serde(alias = "chat_id")]
    pub id: ChatId,
    #[serde(default)]
    pub crawl_id: Option<CrawlId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page_count: u64,
    pub created_at: String,
}

impl PreviousChatSummary {
    /// `title`, else the hostname of `url`, else "Unknown".
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        self.url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .and_then(|url| url.host_str().map(ToOwned::to_owned))
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Queued,
    Scraping,
    Indexing,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CrawlStatus::Completed | CrawlStatus::Failed | CrawlStatus::Cancelled
        )
    }
}

/// Polled snapshot of a background crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlProgress {
    #[serde(default)]
    pub crawl_id: CrawlId,
    pub status: CrawlStatus,
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub current_depth: u32,
    #[serde(default)]
    pub max_depth: u32,
    #[serde(default)]
    pub pages_indexed: u64,
    #[serde(default)]
    pub pages_pending: u64,
    #[serde(default)]
    pub pages_failed: u64,
    #[serde(default)]
    pub total_links_found: u64,
}

impl CrawlProgress {
    /// Placeholder entry for a crawl that has been registered but not polled yet.
    pub fn queued(crawl_id: impl Into<CrawlId>) -> Self {
        Self {
            crawl_id: crawl_id.into(),
            status: CrawlStatus::Queued,
            progress_percentage: 0.0,
            current_depth: 0,
            max_depth: 0,
            pages_indexed: 0,
            pages_pending: 0,
            pages_failed: 0,
            total_links_found: 0,
        }
    }

    /// Clamps values the backend may report out of range.
    pub fn normalized(mut self) -> Self {
        self.progress_percentage = self.progress_percentage.clamp(0.0, 100.0);
        if self.current_depth > self.max_depth {
            self.max_depth = self.current_depth;
        }
        self
    }
}

/// One `data:` frame of the streaming crawl endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapeProgress {
    pub stage: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub crawl_id: Option<CrawlId>,
    #[serde(default)]
    pub page_count: Option<u64>,
}

impl ScrapeProgress {
    pub fn is_error(&self) -> bool {
        self.stage == "error"
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
