use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sitechat_client::{BASE_URL_ENV, DEFAULT_BASE_URL};

use crate::platform::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "sitechat")]
#[command(about = "Crawl a site and chat with what was indexed", long_about = None)]
pub struct Cli {
    /// Backend base URL
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL, global = true)]
    pub api_url: String,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogDestination::File, global = true)]
    pub log: LogDestination,

    /// Directory holding the cached session
    #[arg(long, default_value = ".", global = true)]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Crawl a URL, then chat about it
    Crawl(CrawlArgs),
    /// Continue a previous chat (the cached one if no id is given)
    Resume {
        chat_id: Option<String>,
    },
    /// List previous chats
    Chats,
    /// Delete a chat
    Delete {
        chat_id: String,
    },
    /// Talk to a site through its embedded widget credentials
    Widget(WidgetArgs),
    /// Widget chat over an existing chat or a finished crawl
    WidgetChat(WidgetChatArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    pub url: String,

    /// Link depth to follow
    #[arg(short, long)]
    pub depth: Option<u32>,

    /// Keep crawling in the background after the first pass
    #[arg(long)]
    pub deep: bool,

    /// Use the non-streaming crawl endpoint
    #[arg(long, conflicts_with = "deep")]
    pub sync: bool,

    /// Exit after the crawl instead of opening the chat
    #[arg(long)]
    pub no_chat: bool,
}

#[derive(Debug, Args)]
pub struct WidgetArgs {
    #[arg(long, env = "SITECHAT_SITE_ID")]
    pub site_id: Option<String>,

    #[arg(long, env = "SITECHAT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Page to index (repeatable)
    #[arg(long = "page")]
    pub pages: Vec<String>,

    /// Re-index the pages before chatting
    #[arg(long)]
    pub refresh: bool,

    /// Save the conversation here on exit
    #[arg(long)]
    pub transcript: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct WidgetChatArgs {
    /// Resume this chat
    #[arg(long, conflicts_with = "crawl_id")]
    pub chat_id: Option<String>,

    /// Create a chat over this crawl
    #[arg(long, conflicts_with = "url")]
    pub crawl_id: Option<String>,

    /// Create a chat over this site, reusing a crawl from the last hour
    #[arg(long, conflicts_with = "chat_id")]
    pub url: Option<String>,

    /// Link depth when `--url` needs a new crawl
    #[arg(short, long, requires = "url")]
    pub depth: Option<u32>,

    /// Greeting shown before the first question
    #[arg(long)]
    pub greeting: Option<String>,

    /// Save the conversation here on exit
    #[arg(long)]
    pub transcript: Option<PathBuf>,
}
