use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use client_logging::{client_info, client_warn};
use sitechat_client::{
    find_or_start_crawl, Backend, ChatSeed, ClientSettings, ReqwestBackend, SessionCache,
    SessionStore, StoreSettings, WidgetBridge, WidgetChat, WidgetConfig, WidgetPage,
};
use sitechat_core::{Role, StageRow, WidgetPhase};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{persistence, render};
use crate::cli::{Cli, Commands, CrawlArgs, WidgetArgs, WidgetChatArgs};

const RENDER_INTERVAL: Duration = Duration::from_millis(75);
const HISTORY_PREVIEW: usize = 6;
/// Exit status for termination by SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

pub async fn run(cli: Cli) -> Result<()> {
    let settings = ClientSettings::with_base_url(&cli.api_url);
    client_info!("Using backend at {}", settings.base_url);
    let backend: Arc<dyn Backend> = Arc::new(
        ReqwestBackend::new(settings).with_context(|| format!("invalid api url {}", cli.api_url))?,
    );
    let cache = persistence::session_cache(&cli.state_dir);
    let store = SessionStore::with_cache(backend.clone(), StoreSettings::default(), cache.clone());
    handle_interrupts(store.clone());

    match cli.command {
        Commands::Crawl(args) => crawl(&store, args).await,
        Commands::Resume { chat_id } => resume(&store, &cache, chat_id).await,
        Commands::Chats => list_chats(&store).await,
        Commands::Delete { chat_id } => {
            store
                .delete_chat(&chat_id)
                .await
                .with_context(|| format!("could not delete chat {chat_id}"))?;
            println!("Deleted chat {chat_id}");
            Ok(())
        }
        Commands::Widget(args) => widget(backend, args).await,
        Commands::WidgetChat(args) => {
            let depth = args.depth.unwrap_or(store.settings().default_max_depth);
            widget_chat(backend, args, depth).await
        }
    }
}

async fn crawl(store: &SessionStore, args: CrawlArgs) -> Result<()> {
    let depth = args.depth.unwrap_or(store.settings().default_max_depth);
    let (done_tx, watcher) = watch_progress(store.clone());

    let outcome = if args.sync {
        store.start_scrape(&args.url, depth).await.map(|response| {
            client_info!("Crawl returned {} pages", response.pages.len());
        })
    } else {
        store
            .start_scrape_with_progress(&args.url, depth, args.deep)
            .await
    };

    let _ = done_tx.send(());
    let _ = watcher.await;
    outcome.with_context(|| format!("crawl of {} failed", args.url))?;

    println!("{}", render::session_summary(&store.view()));
    if args.deep {
        println!("Deep crawl continues in the background; /crawls shows its progress.");
    }
    if args.no_chat {
        return Ok(());
    }
    chat_loop(store).await
}

async fn resume(store: &SessionStore, cache: &SessionCache, chat_id: Option<String>) -> Result<()> {
    let Some(chat_id) = persistence::resume_target(cache, chat_id) else {
        bail!("no chat id given and no cached session to resume");
    };
    store
        .set_chat_id(&chat_id)
        .await
        .with_context(|| format!("chat {chat_id} could not be opened"))?;

    println!("{}", render::session_summary(&store.view()));
    let state = store.state();
    let messages = state.messages();
    for message in &messages[messages.len().saturating_sub(HISTORY_PREVIEW)..] {
        println!("{}\n", render::message_block(message));
    }
    chat_loop(store).await
}

async fn list_chats(store: &SessionStore) -> Result<()> {
    store.load_previous_chats().await?;
    for line in render::chat_table(&store.view().previous_chats) {
        println!("{line}");
    }
    Ok(())
}

async fn chat_loop(store: &SessionStore) -> Result<()> {
    println!("Ask a question, or /help for commands.");
    let mut prompt = Prompt::new();
    while let Some(line) = prompt.next().await? {
        match line.as_str() {
            "/quit" | "/exit" => break,
            "/help" => println!("/summary  /chats  /crawls  /cancel <crawl id>  /reset  /quit"),
            "/summary" => {
                store.summarize().await?;
                print_last_reply(store);
            }
            "/reset" => {
                store.reset();
                println!("Session cleared.");
                break;
            }
            "/chats" => {
                store.load_previous_chats().await?;
                for row in render::chat_table(&store.view().previous_chats) {
                    println!("{row}");
                }
            }
            "/crawls" => {
                let view = store.view();
                if view.active_crawls.is_empty() {
                    println!("No background crawls");
                }
                for row in &view.active_crawls {
                    println!("{}", render::crawl_line(row));
                }
            }
            command if command.starts_with("/cancel ") => {
                let crawl_id = command.trim_start_matches("/cancel ").trim();
                match store.cancel_crawl(crawl_id).await {
                    Ok(()) => println!("Cancelled crawl {crawl_id}"),
                    Err(err) => println!("Stopped tracking crawl {crawl_id} ({err})"),
                }
            }
            query => {
                store.send_message(query).await?;
                print_last_reply(store);
            }
        }
    }
    Ok(())
}

fn print_last_reply(store: &SessionStore) {
    let state = store.state();
    if let Some(message) = state
        .messages()
        .last()
        .filter(|message| message.role == Role::Assistant)
    {
        println!("{}\n", render::message_block(message));
    }
}

async fn widget(backend: Arc<dyn Backend>, args: WidgetArgs) -> Result<()> {
    let config = WidgetConfig {
        site_id: args.site_id,
        api_key: args.api_key,
        pages: args.pages.into_iter().map(WidgetPage::new).collect(),
        ..WidgetConfig::default()
    };
    let mut bridge = WidgetBridge::connect(backend, config).await;
    println!("{}", render::widget_status(bridge.status()));

    if args.refresh {
        match bridge.refresh_embeddings().await {
            Ok(count) => println!("Indexed {count} pages"),
            Err(err) => println!("Refresh failed: {err}"),
        }
    }
    match bridge.status().phase() {
        WidgetPhase::Ready => {}
        WidgetPhase::NeedsEmbeddings => {
            bail!("the site has no embeddings yet; rerun with --refresh")
        }
        _ => bail!("{}", render::widget_status(bridge.status())),
    }

    if let Some(greeting) = bridge.conversation().last() {
        println!("{}\n", render::message_block(greeting));
    }
    let mut prompt = Prompt::new();
    while let Some(line) = prompt.next().await? {
        if line == "/quit" || line == "/exit" {
            break;
        }
        bridge.send_message(&line).await?;
        if let Some(reply) = bridge.conversation().last() {
            println!("{}\n", render::message_block(reply));
        }
    }

    if let Some(path) = args.transcript {
        let written = persistence::save_transcript(&path, &bridge.conversation().transcript())?;
        println!("Transcript saved to {}", written.display());
    }
    Ok(())
}

async fn widget_chat(backend: Arc<dyn Backend>, args: WidgetChatArgs, depth: u32) -> Result<()> {
    let seed = match (args.chat_id, args.crawl_id, args.url) {
        (Some(chat_id), _, _) => Some(ChatSeed::Resume(chat_id)),
        (None, Some(crawl_id), _) => Some(ChatSeed::Bootstrap(crawl_id)),
        (None, None, Some(url)) => {
            let crawl_id = find_or_start_crawl(backend.as_ref(), &url, depth)
                .await
                .with_context(|| format!("could not crawl {url}"))?;
            Some(ChatSeed::Bootstrap(crawl_id))
        }
        (None, None, None) => None,
    };
    let mut chat = WidgetChat::open(backend, seed, args.greeting.as_deref()).await;
    if chat.chat_id().is_none() {
        bail!("no chat available; pass --chat-id, --crawl-id of a finished crawl, or --url");
    }

    for entry in chat.conversation().entries() {
        println!("{}\n", render::message_block(&entry.message));
    }
    let mut prompt = Prompt::new();
    while let Some(line) = prompt.next().await? {
        if line == "/quit" || line == "/exit" {
            break;
        }
        chat.send_message(&line).await?;
        if let Some(reply) = chat.conversation().last() {
            println!("{}\n", render::message_block(reply));
        }
    }

    if let Some(path) = args.transcript {
        let written = persistence::save_transcript(&path, &chat.transcript())?;
        println!("Transcript saved to {}", written.display());
    }
    Ok(())
}

/// Prints stage rows as they change, throttled to the render interval.
fn watch_progress(store: SessionStore) -> (oneshot::Sender<()>, JoinHandle<()>) {
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let mut printed: Vec<StageRow> = Vec::new();
        let mut ticker = tokio::time::interval(RENDER_INTERVAL);
        loop {
            let finished = tokio::select! {
                _ = &mut done_rx => true,
                _ = ticker.tick() => false,
            };
            if store.consume_dirty() || finished {
                let view = store.view();
                for row in render::changed_stages(&printed, &view.stages) {
                    println!("{}", render::stage_line(row));
                }
                printed = view.stages;
            }
            if finished {
                break;
            }
        }
    });
    (done_tx, handle)
}

/// Ctrl-C cancels a crawl in flight; otherwise it ends the process.
///
/// Registering the listener replaces the default SIGINT action for the whole
/// process, so the handler stays installed until exit.
fn handle_interrupts(store: SessionStore) {
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                client_warn!("Cannot listen for Ctrl-C: {}", err);
                return;
            }
            if store.cancel_scrape() {
                client_warn!("Crawl interrupted by user");
                continue;
            }
            client_info!("Interrupted, exiting");
            std::process::exit(INTERRUPTED_EXIT);
        }
    });
}

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next non-empty trimmed line, or `None` at end of input.
    async fn next(&mut self) -> Result<Option<String>> {
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line.trim().to_string())),
                None => return Ok(None),
            }
        }
    }
}
