use pretty_assertions::assert_eq;
use sitechat_core::{
    update, AppState, Effect, LoadPolicy, Message, Msg, PageTreeNode, PreviousChatSummary, Role,
    SessionPhase, Source, SUMMARY_HEADING,
};

fn init_logging() {
    client_logging::initialize_for_tests();
}

fn select(state: AppState, chat_id: &str) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::ChatSelected {
            chat_id: chat_id.to_string(),
        },
    )
}

fn bound(chat_id: &str, crawl_id: &str) -> AppState {
    let (state, _) = update(AppState::new(), Msg::ScrapeStarted);
    let (state, _) = update(
        state,
        Msg::ScrapeBound {
            chat_id: chat_id.into(),
            crawl_id: crawl_id.into(),
        },
    );
    let (state, _) = update(state, Msg::ScrapeCompleted { deep: false });
    state
}

fn leaf(url: &str) -> PageTreeNode {
    PageTreeNode {
        url: url.into(),
        title: url.into(),
        children: Vec::new(),
    }
}

fn chat_summary(id: &str) -> PreviousChatSummary {
    PreviousChatSummary {
        id: id.into(),
        crawl_id: None,
        url: Some(format!("https://{id}.example.com")),
        title: None,
        page_count: 3,
        created_at: "2024-05-01T10:00:00Z".into(),
    }
}

#[test]
fn chat_selection_sets_id_eagerly_and_requires_both_loads() {
    init_logging();
    let (state, effects) = select(AppState::new(), "c1");

    assert_eq!(state.chat_id(), Some("c1"));
    assert!(state.is_loading_tree());
    assert!(state.is_loading());
    assert_eq!(
        effects,
        vec![
            Effect::LoadTree {
                chat_id: "c1".into(),
                policy: LoadPolicy::Required,
            },
            Effect::LoadMessages {
                chat_id: "c1".into(),
                policy: LoadPolicy::Required,
            },
        ]
    );
    assert_eq!(state.pending_switch().map(|s| s.tentative.as_str()), Some("c1"));
}

#[test]
fn selecting_current_chat_is_noop() {
    init_logging();
    let state = bound("c1", "r1");
    let (next, effects) = select(state.clone(), "c1");
    assert!(effects.is_empty());
    assert_eq!(next, state);
}

#[test]
fn committed_selection_becomes_ready_and_adopts_crawl() {
    init_logging();
    let (state, _) = select(AppState::new(), "c1");
    let (state, _) = update(
        state,
        Msg::TreeLoaded {
            chat_id: "c1".into(),
            crawl_id: Some("r1".into()),
            tree: vec![leaf("https://a")],
        },
    );
    let (state, _) = update(
        state,
        Msg::MessagesLoaded {
            chat_id: "c1".into(),
            messages: vec![Message::assistant("m1", "summary", Vec::new())],
        },
    );
    let (state, effects) = update(state, Msg::ChatSelectionCommitted { chat_id: "c1".into() });

    assert!(effects.is_empty());
    assert_eq!(state.phase(), SessionPhase::Ready);
    assert_eq!(state.crawl_id(), Some("r1"));
    assert_eq!(state.page_tree().len(), 1);
    assert_eq!(state.messages().len(), 1);
    assert!(state.pending_switch().is_none());
}

#[test]
fn rolled_back_selection_resets_session() {
    init_logging();
    let (state, _) = update(AppState::new(), Msg::ChatsLoaded(vec![chat_summary("c1")]));
    let (state, _) = select(state, "nonexistent");
    let (state, _) = update(
        state,
        Msg::TreeLoadFailed {
            chat_id: "nonexistent".into(),
        },
    );
    let (state, effects) = update(
        state,
        Msg::ChatSelectionRolledBack {
            chat_id: "nonexistent".into(),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.chat_id(), None);
    assert_eq!(state.crawl_id(), None);
    assert_eq!(state.phase(), SessionPhase::Idle);
    assert!(state.messages().is_empty());
    assert!(state.page_tree().is_empty());
    // The session list is not session-scoped.
    assert_eq!(state.previous_chats().len(), 1);
}

#[test]
fn rollback_does_not_clobber_a_newer_selection() {
    init_logging();
    let (state, _) = select(AppState::new(), "old");
    let (state, _) = select(state, "new");
    let (state, _) = update(state, Msg::ChatSelectionRolledBack { chat_id: "old".into() });

    assert_eq!(state.chat_id(), Some("new"));
    assert!(state.pending_switch().is_some());
}

#[test]
fn stale_loads_are_dropped() {
    init_logging();
    let state = bound("c2", "r2");
    let (state, _) = update(
        state,
        Msg::TreeLoaded {
            chat_id: "c1".into(),
            crawl_id: Some("r1".into()),
            tree: vec![leaf("https://stale")],
        },
    );
    assert!(state.page_tree().is_empty());
    assert_eq!(state.crawl_id(), Some("r2"));
}

#[test]
fn message_round_trip_appends_in_order() {
    init_logging();
    let state = bound("c1", "r1");
    let (state, _) = update(
        state,
        Msg::MessageSubmitted {
            id: "1".into(),
            query: "What is this site?".into(),
        },
    );
    assert!(state.is_loading());

    let sources = vec![
        Source {
            url: "https://a".into(),
            title: "A".into(),
            score: 0.4,
        },
        Source {
            url: "https://b".into(),
            title: "B".into(),
            score: 0.9,
        },
    ];
    let (state, _) = update(
        state,
        Msg::AnswerReceived {
            chat_id: "c1".into(),
            id: "2".into(),
            answer: "A documentation site.".into(),
            sources: sources.clone(),
        },
    );

    let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    // Backend order is preserved, not re-sorted by score.
    assert_eq!(state.messages()[1].sources, sources);
    assert!(!state.is_loading());
}

#[test]
fn failed_answer_becomes_assistant_turn() {
    init_logging();
    let state = bound("c1", "r1");
    let (state, _) = update(
        state,
        Msg::MessageSubmitted {
            id: "1".into(),
            query: "x".into(),
        },
    );
    let (state, _) = update(
        state,
        Msg::AnswerFailed {
            chat_id: "c1".into(),
            id: "2".into(),
            error: "model overloaded".into(),
        },
    );

    assert_eq!(state.messages().len(), 2);
    assert_eq!(state.messages()[1].role, Role::Assistant);
    assert_eq!(state.messages()[1].content, "Error: model overloaded");
}

#[test]
fn summary_is_appended_as_assistant_turn() {
    init_logging();
    let (state, _) = update(bound("c1", "r1"), Msg::SummaryRequested);
    assert!(state.is_loading());
    let (state, _) = update(
        state,
        Msg::SummaryReceived {
            chat_id: "c1".into(),
            id: "5".into(),
            summary: "A site about widgets.".into(),
        },
    );
    let (state, _) = update(
        state,
        Msg::SummaryFailed {
            chat_id: "c1".into(),
            id: "6".into(),
            error: "Chat not found".into(),
        },
    );

    let summary = format!("{SUMMARY_HEADING}\n\nA site about widgets.");
    let contents: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![summary.as_str(), "Error generating summary: Chat not found"]
    );
    assert!(state.messages().iter().all(|m| m.role == Role::Assistant));
    assert!(!state.is_loading());
}

#[test]
fn summary_request_without_chat_is_ignored() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::SummaryRequested);
    assert!(effects.is_empty());
    assert!(!state.is_loading());
}

#[test]
fn answer_for_previous_chat_is_dropped() {
    init_logging();
    let state = bound("c2", "r2");
    let (state, _) = update(
        state,
        Msg::AnswerReceived {
            chat_id: "c1".into(),
            id: "9".into(),
            answer: "late".into(),
            sources: Vec::new(),
        },
    );
    assert!(state.messages().is_empty());
}

#[test]
fn deleting_active_chat_resets_and_stops_polling() {
    init_logging();
    let state = bound("c1", "r1");
    let (state, _) = update(state, Msg::ChatsLoaded(vec![chat_summary("c1"), chat_summary("c2")]));
    let (state, effects) = update(state, Msg::CrawlTracked { crawl_id: "r1".into() });
    assert_eq!(effects, vec![Effect::StartPolling]);

    let (state, effects) = update(state, Msg::ChatDeleted { chat_id: "c1".into() });
    assert_eq!(effects, vec![Effect::StopPolling]);
    assert_eq!(state.chat_id(), None);
    assert!(state.active_crawls().is_empty());
    let ids: Vec<&str> = state.previous_chats().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2"]);
}

#[test]
fn deleting_other_chat_keeps_session() {
    init_logging();
    let state = bound("c1", "r1");
    let (state, _) = update(state, Msg::ChatsLoaded(vec![chat_summary("c1"), chat_summary("c2")]));
    let (state, effects) = update(state, Msg::ChatDeleted { chat_id: "c2".into() });
    assert!(effects.is_empty());
    assert_eq!(state.chat_id(), Some("c1"));
    assert_eq!(state.previous_chats().len(), 1);
}

#[test]
fn view_reports_display_titles() {
    init_logging();
    let state = bound("c1", "r1");
    let (state, _) = update(state, Msg::ChatsLoaded(vec![chat_summary("c1")]));
    let view = state.view();
    assert_eq!(view.previous_chats[0].title, "c1.example.com");
    assert!(view.previous_chats[0].active);
}
