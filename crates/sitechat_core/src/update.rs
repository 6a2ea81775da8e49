use crate::{AppState, Effect, LoadPolicy, Message, Msg, SessionPhase};

pub const SUMMARY_HEADING: &str = "**Page Summary:**";

/// Pure update function: applies a message to state and returns any effects.
///
/// Results that arrive for a chat that is no longer current are dropped, since
/// independent flows interleave between awaits.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::ScrapeStarted => {
            state.begin_scrape();
            Vec::new()
        }
        Msg::ScrapeProgress(event) => {
            if state.phase() == SessionPhase::Scraping {
                state.apply_scrape_progress(event);
            }
            Vec::new()
        }
        Msg::ScrapeBound { chat_id, crawl_id } => {
            if state.phase() == SessionPhase::Scraping {
                state.bind_session(chat_id, crawl_id);
            }
            Vec::new()
        }
        Msg::ScrapeCompleted { deep } => complete_scrape(&mut state, deep),
        Msg::ScrapeFailed => {
            if state.phase() == SessionPhase::Scraping {
                state.abandon_scrape();
            }
            Vec::new()
        }
        Msg::TreeLoaded {
            chat_id,
            crawl_id,
            tree,
        } => {
            if state.is_current(&chat_id) {
                state.apply_tree(crawl_id, tree);
            }
            Vec::new()
        }
        Msg::TreeLoadFailed { chat_id } => {
            if state.is_current(&chat_id) {
                state.finish_tree_load();
            }
            Vec::new()
        }
        Msg::MessagesLoaded { chat_id, messages } => {
            if state.is_current(&chat_id) {
                state.apply_messages(messages);
            }
            Vec::new()
        }
        Msg::MessagesLoadFailed { chat_id } => {
            if state.is_current(&chat_id) {
                state.finish_messages_load();
            }
            Vec::new()
        }
        Msg::ChatsRequested => {
            state.set_loading_flags(false, false, true);
            vec![Effect::LoadPreviousChats]
        }
        Msg::ChatsLoaded(chats) => {
            state.apply_previous_chats(chats);
            Vec::new()
        }
        Msg::ChatsLoadFailed => {
            state.finish_chats_load();
            Vec::new()
        }
        Msg::ChatSelected { chat_id } => {
            if state.is_current(&chat_id) {
                return (state, Vec::new());
            }
            state.begin_switch(chat_id.clone());
            vec![
                Effect::LoadTree {
                    chat_id: chat_id.clone(),
                    policy: LoadPolicy::Required,
                },
                Effect::LoadMessages {
                    chat_id,
                    policy: LoadPolicy::Required,
                },
            ]
        }
        Msg::ChatSelectionCommitted { chat_id } => {
            if state.take_switch(&chat_id).is_some() && state.is_current(&chat_id) {
                state.set_phase(SessionPhase::Ready);
            }
            Vec::new()
        }
        Msg::ChatSelectionRolledBack { chat_id } => {
            // A newer switch or crawl owns the session now; leave it alone.
            if state.take_switch(&chat_id).is_some() && state.is_current(&chat_id) {
                reset(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::MessageSubmitted { id, query } => {
            if state.chat_id().is_some() {
                state.push_message(Message::user(id, query));
                state.set_loading(true);
            }
            Vec::new()
        }
        Msg::AnswerReceived {
            chat_id,
            id,
            answer,
            sources,
        } => {
            if state.is_current(&chat_id) {
                state.push_message(Message::assistant(id, answer, sources));
                state.set_loading(false);
            }
            Vec::new()
        }
        Msg::AnswerFailed { chat_id, id, error } => {
            if state.is_current(&chat_id) {
                state.push_message(Message::assistant(id, format!("Error: {error}"), Vec::new()));
                state.set_loading(false);
            }
            Vec::new()
        }
        Msg::SummaryRequested => {
            if state.chat_id().is_some() {
                state.set_loading(true);
            }
            Vec::new()
        }
        Msg::SummaryReceived {
            chat_id,
            id,
            summary,
        } => {
            if state.is_current(&chat_id) {
                let content = format!("{SUMMARY_HEADING}\n\n{summary}");
                state.push_message(Message::assistant(id, content, Vec::new()));
                state.set_loading(false);
            }
            Vec::new()
        }
        Msg::SummaryFailed { chat_id, id, error } => {
            if state.is_current(&chat_id) {
                let content = format!("Error generating summary: {error}");
                state.push_message(Message::assistant(id, content, Vec::new()));
                state.set_loading(false);
            }
            Vec::new()
        }
        Msg::ChatDeleted { chat_id } => {
            state.remove_previous_chat(&chat_id);
            if state.is_current(&chat_id) {
                reset(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::CrawlTracked { crawl_id } => {
            if state.track_crawl(crawl_id) && !state.is_polling() {
                state.set_polling(true);
                vec![Effect::StartPolling]
            } else {
                Vec::new()
            }
        }
        Msg::CrawlProgressed(progress) => crawl_progressed(&mut state, progress),
        Msg::CrawlPollFailed { crawl_id } | Msg::CrawlUntracked { crawl_id } => {
            state.untrack_crawl(&crawl_id);
            stop_polling_if_idle(&mut state)
        }
        Msg::Reset => reset(&mut state),
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn complete_scrape(state: &mut AppState, deep: bool) -> Vec<Effect> {
    if state.phase() != SessionPhase::Scraping {
        return Vec::new();
    }
    let Some(chat_id) = state.chat_id().map(ToOwned::to_owned) else {
        state.abandon_scrape();
        return Vec::new();
    };

    state.set_phase(SessionPhase::Ready);
    state.set_loading_flags(true, true, true);
    let mut effects = vec![
        Effect::LoadTree {
            chat_id: chat_id.clone(),
            policy: LoadPolicy::BestEffort,
        },
        Effect::LoadMessages {
            chat_id,
            policy: LoadPolicy::BestEffort,
        },
        Effect::LoadPreviousChats,
    ];

    if deep {
        if let Some(crawl_id) = state.crawl_id().map(ToOwned::to_owned) {
            if state.track_crawl(crawl_id) && !state.is_polling() {
                state.set_polling(true);
                effects.push(Effect::StartPolling);
            }
        }
    }
    effects
}

fn crawl_progressed(state: &mut AppState, progress: crate::CrawlProgress) -> Vec<Effect> {
    // Untracked while the poll was in flight.
    if !state.is_tracking(&progress.crawl_id) {
        return Vec::new();
    }
    let progress = progress.normalized();
    let crawl_id = progress.crawl_id.clone();
    let terminal = progress.status.is_terminal();
    state.update_crawl(progress);

    let mut effects = Vec::new();
    if terminal && state.schedule_removal(&crawl_id) {
        effects.push(Effect::ScheduleCrawlRemoval {
            crawl_id: crawl_id.clone(),
        });
        if state.crawl_id() == Some(crawl_id.as_str()) {
            if let Some(chat_id) = state.chat_id().map(ToOwned::to_owned) {
                state.set_loading_flags(true, false, false);
                effects.push(Effect::LoadTree {
                    chat_id,
                    policy: LoadPolicy::BestEffort,
                });
            }
        }
    }
    effects
}

fn stop_polling_if_idle(state: &mut AppState) -> Vec<Effect> {
    if !state.has_active_crawls() && state.is_polling() {
        state.set_polling(false);
        vec![Effect::StopPolling]
    } else {
        Vec::new()
    }
}

fn reset(state: &mut AppState) -> Vec<Effect> {
    let was_polling = state.is_polling();
    state.clear_session();
    if was_polling {
        vec![Effect::StopPolling]
    } else {
        Vec::new()
    }
}
