//! Initialization status of an embedded widget keyed by `(site_id, api_key)`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetPhase {
    /// Missing credentials; nothing was requested.
    #[default]
    Unconfigured,
    Initializing,
    /// Embeddings exist; queries can be served.
    Ready,
    /// Initialized but nothing indexed yet; the host must call refresh.
    NeedsEmbeddings,
    Failed,
}

pub const NO_EMBEDDINGS_HINT: &str = "No embeddings found. Call refreshEmbeddings() to create them.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WidgetStatus {
    phase: WidgetPhase,
    is_initializing: bool,
    error: Option<String>,
    has_embeddings: bool,
    indexed_page_count: u64,
    initialized: bool,
}

impl WidgetStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> WidgetPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == WidgetPhase::Ready
    }

    pub fn is_initializing(&self) -> bool {
        self.is_initializing
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_embeddings(&self) -> bool {
        self.has_embeddings
    }

    pub fn indexed_page_count(&self) -> u64 {
        self.indexed_page_count
    }

    /// An init or refresh request is in flight.
    pub fn begin(&mut self) {
        self.is_initializing = true;
        self.error = None;
        if self.phase == WidgetPhase::Unconfigured {
            self.phase = WidgetPhase::Initializing;
        }
    }

    pub fn initialized(&mut self, has_embeddings: bool, indexed_page_count: u64) {
        self.is_initializing = false;
        self.initialized = true;
        self.has_embeddings = has_embeddings;
        self.indexed_page_count = indexed_page_count;
        if has_embeddings {
            self.phase = WidgetPhase::Ready;
            self.error = None;
        } else {
            self.phase = WidgetPhase::NeedsEmbeddings;
            self.error = Some(NO_EMBEDDINGS_HINT.to_string());
        }
    }

    pub fn init_failed(&mut self, error: impl Into<String>) {
        self.is_initializing = false;
        self.initialized = false;
        self.has_embeddings = false;
        self.indexed_page_count = 0;
        self.phase = WidgetPhase::Failed;
        self.error = Some(error.into());
    }

    pub fn refreshed(&mut self, indexed_page_count: u64) {
        self.is_initializing = false;
        self.initialized = true;
        self.has_embeddings = true;
        self.indexed_page_count = indexed_page_count;
        self.phase = WidgetPhase::Ready;
        self.error = None;
    }

    /// A failed refresh never leaves the widget ready.
    pub fn refresh_failed(&mut self, error: impl Into<String>) {
        self.is_initializing = false;
        self.phase = if self.initialized {
            WidgetPhase::NeedsEmbeddings
        } else {
            WidgetPhase::Failed
        };
        self.error = Some(error.into());
    }
}
