use crate::{ChatId, CrawlId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LoadTree { chat_id: ChatId, policy: LoadPolicy },
    LoadMessages { chat_id: ChatId, policy: LoadPolicy },
    /// Always best-effort.
    LoadPreviousChats,
    StartPolling,
    StopPolling,
    /// Untrack after the terminal grace period.
    ScheduleCrawlRemoval { crawl_id: CrawlId },
}

/// How a failed load is treated by the caller that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Failure propagates (chat switch rollback depends on it).
    Required,
    /// Failure is logged and swallowed.
    BestEffort,
}
