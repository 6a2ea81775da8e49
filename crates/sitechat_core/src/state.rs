use std::collections::{BTreeMap, BTreeSet};

use crate::view_model::{ChatRow, CrawlRow, SessionView, StageRow};
use crate::{
    ChatId, CrawlId, CrawlProgress, Message, PageTreeNode, PreviousChatSummary, ScrapeProgress,
    ScrapingStage, StageKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Scraping,
    Ready,
}

/// Rollback record for an optimistic chat switch.
///
/// Held while the recovery loads for `tentative` are in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSwitch {
    pub tentative: ChatId,
}

/// Client-side state of one crawl + chat session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    phase: SessionPhase,
    chat_id: Option<ChatId>,
    crawl_id: Option<CrawlId>,
    messages: Vec<Message>,
    is_loading: bool,
    stages: Vec<ScrapingStage>,
    progress_high_water: u8,
    page_tree: Vec<PageTreeNode>,
    is_loading_tree: bool,
    previous_chats: Vec<PreviousChatSummary>,
    is_loading_chats: bool,
    active_crawls: BTreeMap<CrawlId, CrawlProgress>,
    removal_scheduled: BTreeSet<CrawlId>,
    polling: bool,
    pending_switch: Option<ChatSwitch>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn crawl_id(&self) -> Option<&str> {
        self.crawl_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn scraping_stages(&self) -> &[ScrapingStage] {
        &self.stages
    }

    pub fn page_tree(&self) -> &[PageTreeNode] {
        &self.page_tree
    }

    pub fn previous_chats(&self) -> &[PreviousChatSummary] {
        &self.previous_chats
    }

    pub fn active_crawls(&self) -> &BTreeMap<CrawlId, CrawlProgress> {
        &self.active_crawls
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_loading_tree(&self) -> bool {
        self.is_loading_tree
    }

    pub fn is_loading_chats(&self) -> bool {
        self.is_loading_chats
    }

    pub fn pending_switch(&self) -> Option<&ChatSwitch> {
        self.pending_switch.as_ref()
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            chat_id: self.chat_id.clone(),
            crawl_id: self.crawl_id.clone(),
            message_count: self.messages.len(),
            stages: self
                .stages
                .iter()
                .map(|s| StageRow {
                    stage: s.stage.to_string(),
                    message: s.message.clone(),
                    progress: s.progress,
                    completed: s.completed,
                })
                .collect(),
            overall_progress: self.progress_high_water,
            page_count: self.page_tree.iter().map(PageTreeNode::count).sum(),
            previous_chats: self
                .previous_chats
                .iter()
                .map(|c| ChatRow {
                    id: c.id.clone(),
                    title: c.display_title(),
                    page_count: c.page_count,
                    created_at: c.created_at.clone(),
                    active: self.chat_id.as_deref() == Some(c.id.as_str()),
                })
                .collect(),
            active_crawls: self
                .active_crawls
                .values()
                .map(|p| CrawlRow {
                    crawl_id: p.crawl_id.clone(),
                    status: p.status,
                    progress_percentage: p.progress_percentage,
                    pages_indexed: p.pages_indexed,
                    depth: (p.current_depth, p.max_depth),
                })
                .collect(),
            busy: self.is_loading || self.is_loading_tree || self.phase == SessionPhase::Scraping,
            dirty: self.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Unbinds the current session; the crawl must adopt its own identifiers.
    pub(crate) fn begin_scrape(&mut self) {
        self.phase = SessionPhase::Scraping;
        self.chat_id = None;
        self.crawl_id = None;
        self.pending_switch = None;
        self.messages.clear();
        self.page_tree.clear();
        self.is_loading = false;
        self.is_loading_tree = false;
        self.stages.clear();
        self.progress_high_water = 0;
        self.mark_dirty();
    }

    /// Applies one stream frame: upserts its stage and adopts identifiers.
    ///
    /// Identifiers are only ever overwritten by a present value, never cleared.
    pub(crate) fn apply_scrape_progress(&mut self, event: ScrapeProgress) {
        let stage = StageKind::parse(&event.stage);
        let reported = event
            .progress
            .map(|p| p.min(100) as u8)
            .unwrap_or(self.progress_high_water);
        let progress = reported.max(self.progress_high_water);
        self.progress_high_water = progress;

        let entry = ScrapingStage {
            message: stage.display_text(&event.message),
            completed: stage.is_completed(),
            progress,
            stage,
        };
        match self.stages.iter_mut().find(|s| s.stage == entry.stage) {
            Some(existing) => *existing = entry,
            None => self.stages.push(entry),
        }

        if let Some(chat_id) = event.chat_id.filter(|id| !id.is_empty()) {
            self.chat_id = Some(chat_id);
        }
        if let Some(crawl_id) = event.crawl_id.filter(|id| !id.is_empty()) {
            self.crawl_id = Some(crawl_id);
        }
        self.mark_dirty();
    }

    pub(crate) fn bind_session(&mut self, chat_id: ChatId, crawl_id: CrawlId) {
        self.chat_id = Some(chat_id);
        self.crawl_id = Some(crawl_id);
        self.mark_dirty();
    }

    pub(crate) fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            self.phase = phase;
            self.mark_dirty();
        }
    }

    /// Drops identifiers adopted by a crawl that did not finish.
    pub(crate) fn abandon_scrape(&mut self) {
        self.phase = SessionPhase::Idle;
        self.chat_id = None;
        self.crawl_id = None;
        self.page_tree.clear();
        self.is_loading = false;
        self.is_loading_tree = false;
        self.mark_dirty();
    }

    pub(crate) fn set_loading_flags(&mut self, tree: bool, messages: bool, chats: bool) {
        self.is_loading_tree |= tree;
        self.is_loading |= messages;
        self.is_loading_chats |= chats;
        self.mark_dirty();
    }

    pub(crate) fn is_current(&self, chat_id: &str) -> bool {
        self.chat_id.as_deref() == Some(chat_id)
    }

    pub(crate) fn apply_tree(&mut self, crawl_id: Option<CrawlId>, tree: Vec<PageTreeNode>) {
        self.page_tree = tree;
        self.is_loading_tree = false;
        if let Some(crawl_id) = crawl_id.filter(|id| !id.is_empty()) {
            self.crawl_id = Some(crawl_id);
        }
        self.mark_dirty();
    }

    pub(crate) fn finish_tree_load(&mut self) {
        self.is_loading_tree = false;
        self.mark_dirty();
    }

    pub(crate) fn apply_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.is_loading = false;
        self.mark_dirty();
    }

    pub(crate) fn finish_messages_load(&mut self) {
        self.is_loading = false;
        self.mark_dirty();
    }

    pub(crate) fn apply_previous_chats(&mut self, chats: Vec<PreviousChatSummary>) {
        self.previous_chats = chats;
        self.is_loading_chats = false;
        self.mark_dirty();
    }

    pub(crate) fn finish_chats_load(&mut self) {
        self.is_loading_chats = false;
        self.mark_dirty();
    }

    pub(crate) fn remove_previous_chat(&mut self, chat_id: &str) {
        self.previous_chats.retain(|c| c.id != chat_id);
        self.mark_dirty();
    }

    /// Phase one of a chat switch: set the id tentatively and remember how to undo it.
    pub(crate) fn begin_switch(&mut self, chat_id: ChatId) {
        self.pending_switch = Some(ChatSwitch {
            tentative: chat_id.clone(),
        });
        self.chat_id = Some(chat_id);
        self.crawl_id = None;
        self.is_loading_tree = true;
        self.is_loading = true;
        self.mark_dirty();
    }

    /// Takes the rollback record if it still belongs to `chat_id`.
    pub(crate) fn take_switch(&mut self, chat_id: &str) -> Option<ChatSwitch> {
        match &self.pending_switch {
            Some(switch) if switch.tentative == chat_id => self.pending_switch.take(),
            _ => None,
        }
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.mark_dirty();
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
        self.mark_dirty();
    }

    /// Returns true if the crawl was newly added.
    pub(crate) fn track_crawl(&mut self, crawl_id: CrawlId) -> bool {
        if self.active_crawls.contains_key(&crawl_id) {
            return false;
        }
        self.active_crawls
            .insert(crawl_id.clone(), CrawlProgress::queued(crawl_id));
        self.mark_dirty();
        true
    }

    pub(crate) fn is_tracking(&self, crawl_id: &str) -> bool {
        self.active_crawls.contains_key(crawl_id)
    }

    pub(crate) fn update_crawl(&mut self, progress: CrawlProgress) {
        self.active_crawls
            .insert(progress.crawl_id.clone(), progress);
        self.mark_dirty();
    }

    /// Returns true the first time removal is scheduled for `crawl_id`.
    pub(crate) fn schedule_removal(&mut self, crawl_id: &str) -> bool {
        self.removal_scheduled.insert(crawl_id.to_string())
    }

    pub(crate) fn untrack_crawl(&mut self, crawl_id: &str) {
        self.removal_scheduled.remove(crawl_id);
        if self.active_crawls.remove(crawl_id).is_some() {
            self.mark_dirty();
        }
    }

    pub(crate) fn has_active_crawls(&self) -> bool {
        !self.active_crawls.is_empty()
    }

    pub(crate) fn set_polling(&mut self, polling: bool) {
        self.polling = polling;
    }

    /// Clears everything scoped to the current session. Previous chats survive.
    pub(crate) fn clear_session(&mut self) {
        let previous_chats = std::mem::take(&mut self.previous_chats);
        let is_loading_chats = self.is_loading_chats;
        *self = AppState {
            previous_chats,
            is_loading_chats,
            ..AppState::default()
        };
        self.mark_dirty();
    }
}
