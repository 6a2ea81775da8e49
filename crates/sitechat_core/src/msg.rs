use crate::{ChatId, CrawlId, CrawlProgress, Message, PageTreeNode, PreviousChatSummary, ScrapeProgress, Source};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A foreground crawl is about to start.
    ScrapeStarted,
    /// One frame of the streaming crawl.
    ScrapeProgress(ScrapeProgress),
    /// The non-streaming crawl endpoint bound a session.
    ScrapeBound { chat_id: ChatId, crawl_id: CrawlId },
    /// The crawl finished with a bound chat; `deep` hands the crawl to the tracker.
    ScrapeCompleted { deep: bool },
    /// The crawl failed or was cancelled.
    ScrapeFailed,
    /// Page tree arrived for `chat_id`.
    TreeLoaded {
        chat_id: ChatId,
        crawl_id: Option<CrawlId>,
        tree: Vec<PageTreeNode>,
    },
    TreeLoadFailed { chat_id: ChatId },
    /// Message history arrived for `chat_id`.
    MessagesLoaded { chat_id: ChatId, messages: Vec<Message> },
    MessagesLoadFailed { chat_id: ChatId },
    /// Refresh of the previous-chat list was requested.
    ChatsRequested,
    ChatsLoaded(Vec<PreviousChatSummary>),
    ChatsLoadFailed,
    /// Optimistic switch to an existing chat (e.g. from a URL parameter or cache).
    ChatSelected { chat_id: ChatId },
    /// Both recovery loads for the switch succeeded.
    ChatSelectionCommitted { chat_id: ChatId },
    /// A recovery load failed; undo the switch.
    ChatSelectionRolledBack { chat_id: ChatId },
    /// User sent a query.
    MessageSubmitted { id: String, query: String },
    /// The query for `chat_id` was answered.
    AnswerReceived {
        chat_id: ChatId,
        id: String,
        answer: String,
        sources: Vec<Source>,
    },
    /// The query for `chat_id` failed; the error becomes an assistant turn.
    AnswerFailed { chat_id: ChatId, id: String, error: String },
    /// A summary of the active chat's crawl was requested.
    SummaryRequested,
    SummaryReceived {
        chat_id: ChatId,
        id: String,
        summary: String,
    },
    /// Summarizing failed; like a failed query, it becomes an assistant turn.
    SummaryFailed { chat_id: ChatId, id: String, error: String },
    /// Backend confirmed deletion of `chat_id`.
    ChatDeleted { chat_id: ChatId },
    /// Start tracking a background crawl.
    CrawlTracked { crawl_id: CrawlId },
    /// Poll result for a tracked crawl.
    CrawlProgressed(CrawlProgress),
    /// Status endpoint unreachable; stop tracking.
    CrawlPollFailed { crawl_id: CrawlId },
    /// Stop tracking (grace expiry, cancel, or caller request).
    CrawlUntracked { crawl_id: CrawlId },
    /// User-initiated new session.
    Reset,
    /// Fallback for placeholder wiring.
    NoOp,
}
