use crate::{ChatId, CrawlId, CrawlStatus, SessionPhase};

/// Render-ready snapshot of [`crate::AppState`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub chat_id: Option<ChatId>,
    pub crawl_id: Option<CrawlId>,
    pub message_count: usize,
    pub stages: Vec<StageRow>,
    pub overall_progress: u8,
    pub page_count: usize,
    pub previous_chats: Vec<ChatRow>,
    pub active_crawls: Vec<CrawlRow>,
    pub busy: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRow {
    pub stage: String,
    pub message: String,
    pub progress: u8,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub id: ChatId,
    pub title: String,
    pub page_count: u64,
    pub created_at: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRow {
    pub crawl_id: CrawlId,
    pub status: CrawlStatus,
    pub progress_percentage: f64,
    pub pages_indexed: u64,
    /// `(current_depth, max_depth)`
    pub depth: (u32, u32),
}
