//! Sitechat core: pure session state machine and view-model helpers.
mod effect;
mod model;
mod msg;
mod stage;
mod state;
mod update;
mod view_model;
mod widget;

pub use effect::{Effect, LoadPolicy};
pub use model::{
    ChatId, CrawlId, CrawlProgress, CrawlStatus, Message, PageTreeNode, PreviousChatSummary,
    Role, ScrapeProgress, Source,
};
pub use msg::Msg;
pub use stage::{ScrapingStage, StageKind};
pub use state::{AppState, ChatSwitch, SessionPhase};
pub use update::{update, SUMMARY_HEADING};
pub use view_model::{ChatRow, CrawlRow, SessionView, StageRow};
pub use widget::{WidgetPhase, WidgetStatus, NO_EMBEDDINGS_HINT};
