use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use client_logging::{client_debug, client_info, client_warn};
use futures_util::future::join_all;
use futures_util::StreamExt;
use sitechat_core::{update, AppState, Effect, LoadPolicy, Msg, SessionPhase, SessionView};
use tokio_util::sync::CancellationToken;

use crate::api::{QueryRequest, ScrapeRequest, ScrapeResponse};
use crate::backend::Backend;
use crate::ids::MessageIds;
use crate::persist::{CachedSession, SessionCache};
use crate::{tracker, ClientError, StoreSettings};

pub const NO_CHAT_ID: &str = "stream ended without a chat id";
const DEFAULT_SCRAPE_FAILURE: &str = "Scraping failed";

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Inner {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) settings: StoreSettings,
    state: Mutex<AppState>,
    pub(crate) poller: Mutex<Option<CancellationToken>>,
    scrape: Mutex<Option<CancellationToken>>,
    ids: MessageIds,
    cache: Option<SessionCache>,
}

/// Runtime around the pure session state machine.
///
/// Every state change goes through [`sitechat_core::update`]; this type owns
/// the I/O the resulting effects ask for. Clones share the same session.
#[derive(Clone)]
pub struct SessionStore {
    pub(crate) inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>, settings: StoreSettings) -> Self {
        Self::build(backend, settings, None)
    }

    /// Like [`SessionStore::new`], remembering bound sessions in `cache`.
    pub fn with_cache(
        backend: Arc<dyn Backend>,
        settings: StoreSettings,
        cache: SessionCache,
    ) -> Self {
        Self::build(backend, settings, Some(cache))
    }

    fn build(
        backend: Arc<dyn Backend>,
        settings: StoreSettings,
        cache: Option<SessionCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                settings,
                state: Mutex::new(AppState::new()),
                poller: Mutex::new(None),
                scrape: Mutex::new(None),
                ids: MessageIds::new(),
                cache,
            }),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.inner.settings
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AppState {
        lock(&self.inner.state).clone()
    }

    pub fn view(&self) -> SessionView {
        lock(&self.inner.state).view()
    }

    pub fn chat_id(&self) -> Option<String> {
        lock(&self.inner.state).chat_id().map(ToOwned::to_owned)
    }

    /// True if state changed since the last call.
    pub fn consume_dirty(&self) -> bool {
        lock(&self.inner.state).consume_dirty()
    }

    /// Streams a crawl of `url`, adopting identifiers as frames arrive.
    ///
    /// On success the session is `Ready` and the page tree, history and
    /// previous-chat list have been loaded (each best-effort). With `deep`, the
    /// crawl id is then handed to the background tracker. Any failure returns
    /// the store to `Idle` with no session bound.
    pub async fn start_scrape_with_progress(
        &self,
        url: &str,
        max_depth: u32,
        deep: bool,
    ) -> Result<(), ClientError> {
        let request = ScrapeRequest {
            url: url.to_string(),
            max_depth,
        };
        let cancel = self.arm_scrape()?;
        client_info!("Starting streaming crawl of {} (depth {})", url, max_depth);
        self.apply(Msg::ScrapeStarted);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            outcome = self.consume_stream(&request) => outcome,
        };
        self.disarm_scrape();

        match outcome {
            Ok(()) => self.finish_scrape(deep).await,
            Err(err) => Err(self.fail_scrape(err)),
        }
    }

    /// Non-streaming crawl through `POST /scrape`.
    pub async fn start_scrape(
        &self,
        url: &str,
        max_depth: u32,
    ) -> Result<ScrapeResponse, ClientError> {
        let request = ScrapeRequest {
            url: url.to_string(),
            max_depth,
        };
        let cancel = self.arm_scrape()?;
        client_info!("Starting crawl of {} (depth {})", url, max_depth);
        self.apply(Msg::ScrapeStarted);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            outcome = self.inner.backend.scrape(&request) => outcome,
        };
        self.disarm_scrape();

        let response = match outcome {
            Ok(response) if response.success => response,
            Ok(response) => {
                let message = response
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SCRAPE_FAILURE.to_string());
                return Err(self.fail_scrape(ClientError::Stream(message)));
            }
            Err(err) => return Err(self.fail_scrape(err)),
        };

        self.apply(Msg::ScrapeBound {
            chat_id: response.chat_id.clone(),
            crawl_id: response.crawl_id.clone(),
        });
        self.finish_scrape(false).await?;
        Ok(response)
    }

    /// Aborts the crawl in flight, if any. Dropping the stream closes the connection.
    pub fn cancel_scrape(&self) -> bool {
        match lock(&self.inner.scrape).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_scraping(&self) -> bool {
        lock(&self.inner.scrape).is_some()
    }

    /// Switches to an existing chat: the id is visible immediately, and undone
    /// (full reset) if its page tree or history cannot be loaded.
    pub async fn set_chat_id(&self, chat_id: &str) -> Result<(), ClientError> {
        let effects = self.transition(Msg::ChatSelected {
            chat_id: chat_id.to_string(),
        });
        if effects.is_empty() {
            return Ok(());
        }

        match self.settle(effects).await {
            Ok(()) => {
                self.apply(Msg::ChatSelectionCommitted {
                    chat_id: chat_id.to_string(),
                });
                self.remember();
                Ok(())
            }
            Err(err) => {
                client_warn!("Chat {} could not be loaded, rolling back: {}", chat_id, err);
                self.apply(Msg::ChatSelectionRolledBack {
                    chat_id: chat_id.to_string(),
                });
                self.forget();
                Err(err)
            }
        }
    }

    /// Sends a query for the active chat.
    ///
    /// Only an empty query or a missing chat is an error. A failed request is
    /// recorded as an assistant message carrying the error text.
    pub async fn send_message(&self, query: &str) -> Result<(), ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::InvalidState("query must not be empty"));
        }
        let chat_id = self
            .chat_id()
            .ok_or(ClientError::InvalidState("no active chat"))?;

        self.apply(Msg::MessageSubmitted {
            id: self.inner.ids.next(),
            query: query.to_string(),
        });

        let request = QueryRequest {
            chat_id: chat_id.clone(),
            query: query.to_string(),
            limit: self.inner.settings.query_limit,
        };
        let msg = match self.inner.backend.query(&request).await {
            Ok(response) => {
                if let Some(metadata) = &response.metadata {
                    client_debug!("Query metadata for {}: {:?}", chat_id, metadata);
                }
                Msg::AnswerReceived {
                    chat_id,
                    id: self.inner.ids.next(),
                    answer: response.answer,
                    sources: response.sources,
                }
            }
            Err(err) => {
                client_warn!("Query for chat {} failed: {}", chat_id, err);
                Msg::AnswerFailed {
                    chat_id,
                    id: self.inner.ids.next(),
                    error: err.to_string(),
                }
            }
        };
        self.apply(msg);
        Ok(())
    }

    /// Asks the backend to summarize the active chat's crawl. The summary, or
    /// the failure, is appended as an assistant message.
    pub async fn summarize(&self) -> Result<(), ClientError> {
        let chat_id = self
            .chat_id()
            .ok_or(ClientError::InvalidState("no active chat"))?;
        self.apply(Msg::SummaryRequested);

        let msg = match self.inner.backend.summarize(&chat_id).await {
            Ok(response) => {
                if let Some(metadata) = &response.metadata {
                    client_debug!("Summary metadata for {}: {:?}", chat_id, metadata);
                }
                Msg::SummaryReceived {
                    chat_id,
                    id: self.inner.ids.next(),
                    summary: response.summary,
                }
            }
            Err(err) => {
                client_warn!("Summary for chat {} failed: {}", chat_id, err);
                Msg::SummaryFailed {
                    chat_id,
                    id: self.inner.ids.next(),
                    error: err.to_string(),
                }
            }
        };
        self.apply(msg);
        Ok(())
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        self.inner.backend.delete_chat(chat_id).await?;
        let was_active = self.chat_id().as_deref() == Some(chat_id);
        self.apply(Msg::ChatDeleted {
            chat_id: chat_id.to_string(),
        });
        if was_active {
            self.forget();
        }
        client_info!("Deleted chat {}", chat_id);
        Ok(())
    }

    /// Refreshes the previous-chat list. Failures are logged, not returned.
    pub async fn load_previous_chats(&self) -> Result<(), ClientError> {
        let effects = self.transition(Msg::ChatsRequested);
        self.settle(effects).await
    }

    /// Starts a new session: cancels any crawl in flight, stops polling and
    /// clears everything but the previous-chat list.
    pub fn reset(&self) {
        self.cancel_scrape();
        self.apply(Msg::Reset);
    }

    async fn consume_stream(&self, request: &ScrapeRequest) -> Result<(), ClientError> {
        let mut events = self.inner.backend.scrape_stream(request).await?;
        while let Some(event) = events.next().await {
            self.apply(Msg::ScrapeProgress(event?));
        }
        Ok(())
    }

    async fn finish_scrape(&self, deep: bool) -> Result<(), ClientError> {
        let effects = self.transition(Msg::ScrapeCompleted { deep });
        let bound = {
            let state = lock(&self.inner.state);
            state.phase() == SessionPhase::Ready && state.chat_id().is_some()
        };
        if !bound {
            return Err(ClientError::Stream(NO_CHAT_ID.to_string()));
        }
        self.remember();
        self.settle(effects).await
    }

    fn fail_scrape(&self, err: ClientError) -> ClientError {
        client_warn!("Crawl failed: {}", err);
        self.apply(Msg::ScrapeFailed);
        err
    }

    fn arm_scrape(&self) -> Result<CancellationToken, ClientError> {
        let mut slot = lock(&self.inner.scrape);
        if slot.is_some() {
            return Err(ClientError::InvalidState("a crawl is already in progress"));
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(token)
    }

    fn disarm_scrape(&self) {
        lock(&self.inner.scrape).take();
    }

    fn remember(&self) {
        let Some(cache) = &self.inner.cache else {
            return;
        };
        let session = {
            let state = lock(&self.inner.state);
            state.chat_id().map(|chat_id| CachedSession {
                chat_id: chat_id.to_string(),
                crawl_id: state.crawl_id().map(ToOwned::to_owned),
            })
        };
        if let Some(session) = session {
            if let Err(err) = cache.save(&session) {
                client_warn!("Failed to cache session {}: {}", session.chat_id, err);
            }
        }
    }

    fn forget(&self) {
        if let Some(cache) = &self.inner.cache {
            if let Err(err) = cache.clear() {
                client_warn!("Failed to clear cached session: {}", err);
            }
        }
    }

    /// Runs `msg` through the state machine and returns its effects unexecuted.
    pub(crate) fn transition(&self, msg: Msg) -> Vec<Effect> {
        let mut guard = lock(&self.inner.state);
        let state = std::mem::take(&mut *guard);
        let (state, effects) = update(state, msg);
        *guard = state;
        effects
    }

    /// Transition plus effects; loads it triggers run in the background.
    pub(crate) fn apply(&self, msg: Msg) {
        let effects = self.transition(msg);
        let loads = self.perform(effects);
        if !loads.is_empty() {
            self.spawn_loads(loads);
        }
    }

    /// Executes `effects` and waits for every load among them to finish.
    ///
    /// Returns the first failure of a [`LoadPolicy::Required`] load.
    pub(crate) async fn settle(&self, effects: Vec<Effect>) -> Result<(), ClientError> {
        let loads = self.perform(effects);
        self.run_loads(loads).await
    }

    /// Executes the non-load effects immediately and returns the loads.
    fn perform(&self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut loads = Vec::new();
        for effect in effects {
            match effect {
                Effect::StartPolling => tracker::start_polling(self),
                Effect::StopPolling => tracker::stop_polling(self),
                Effect::ScheduleCrawlRemoval { crawl_id } => {
                    tracker::schedule_removal(self, crawl_id)
                }
                load => loads.push(load),
            }
        }
        loads
    }

    fn spawn_loads(&self, loads: Vec<Effect>) {
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(err) = store.run_loads(loads).await {
                client_warn!("Background load failed: {}", err);
            }
        });
    }

    async fn run_loads(&self, loads: Vec<Effect>) -> Result<(), ClientError> {
        let outcomes = join_all(loads.into_iter().map(|load| self.run_load(load))).await;
        outcomes.into_iter().collect()
    }

    async fn run_load(&self, effect: Effect) -> Result<(), ClientError> {
        let backend = &self.inner.backend;
        match effect {
            Effect::LoadTree { chat_id, policy } => match backend.chat_tree(&chat_id).await {
                Ok(response) => {
                    self.apply(Msg::TreeLoaded {
                        chat_id,
                        crawl_id: response.crawl_id,
                        tree: response.tree,
                    });
                    Ok(())
                }
                Err(err) => {
                    self.apply(Msg::TreeLoadFailed {
                        chat_id: chat_id.clone(),
                    });
                    load_failed("page tree", &chat_id, policy, err)
                }
            },
            Effect::LoadMessages { chat_id, policy } => {
                match backend.chat_messages(&chat_id).await {
                    Ok(messages) => {
                        self.apply(Msg::MessagesLoaded { chat_id, messages });
                        Ok(())
                    }
                    Err(err) => {
                        self.apply(Msg::MessagesLoadFailed {
                            chat_id: chat_id.clone(),
                        });
                        load_failed("messages", &chat_id, policy, err)
                    }
                }
            }
            Effect::LoadPreviousChats => match backend.list_chats().await {
                Ok(chats) => {
                    self.apply(Msg::ChatsLoaded(chats));
                    Ok(())
                }
                Err(err) => {
                    self.apply(Msg::ChatsLoadFailed);
                    load_failed("previous chats", "-", LoadPolicy::BestEffort, err)
                }
            },
            other => {
                self.perform(vec![other]);
                Ok(())
            }
        }
    }
}

fn load_failed(
    what: &str,
    chat_id: &str,
    policy: LoadPolicy,
    err: ClientError,
) -> Result<(), ClientError> {
    match policy {
        LoadPolicy::Required => Err(err),
        LoadPolicy::BestEffort => {
            client_warn!("Failed to load {} for {}: {}", what, chat_id, err);
            Ok(())
        }
    }
}
