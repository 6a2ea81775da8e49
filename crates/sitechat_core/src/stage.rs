use std::fmt;

/// Backend pipeline stage names reported by the streaming crawl endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    Initializing,
    CacheFound,
    ChatFound,
    ChatCreated,
    Loaded,
    Scraping,
    Scraped,
    Storing,
    Stored,
    Embedding,
    Embedded,
    Summarizing,
    DeepScraping,
    Complete,
    Error,
    /// A stage this client does not know yet; displayed with the backend's own text.
    Unknown(String),
}

impl StageKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "initializing" => StageKind::Initializing,
            "cache_found" => StageKind::CacheFound,
            "chat_found" => StageKind::ChatFound,
            "chat_created" => StageKind::ChatCreated,
            "loaded" => StageKind::Loaded,
            "scraping" => StageKind::Scraping,
            "scraped" => StageKind::Scraped,
            "storing" => StageKind::Storing,
            "stored" => StageKind::Stored,
            "embedding" => StageKind::Embedding,
            "embedded" => StageKind::Embedded,
            "summarizing" => StageKind::Summarizing,
            "deep_scraping" => StageKind::DeepScraping,
            "complete" => StageKind::Complete,
            "error" => StageKind::Error,
            other => StageKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StageKind::Initializing => "initializing",
            StageKind::CacheFound => "cache_found",
            StageKind::ChatFound => "chat_found",
            StageKind::ChatCreated => "chat_created",
            StageKind::Loaded => "loaded",
            StageKind::Scraping => "scraping",
            StageKind::Scraped => "scraped",
            StageKind::Storing => "storing",
            StageKind::Stored => "stored",
            StageKind::Embedding => "embedding",
            StageKind::Embedded => "embedded",
            StageKind::Summarizing => "summarizing",
            StageKind::DeepScraping => "deep_scraping",
            StageKind::Complete => "complete",
            StageKind::Error => "error",
            StageKind::Unknown(raw) => raw,
        }
    }

    /// User-facing text for this stage.
    ///
    /// Stages whose text carries counts (`scraped`, `embedded`, `deep_scraping`)
    /// prefer the backend message; unknown stages always use it.
    pub fn display_text(&self, backend_message: &str) -> String {
        let fixed = match self {
            StageKind::Initializing => "Starting scrape process...",
            StageKind::CacheFound => "Found existing data for this URL",
            StageKind::ChatFound => "Using existing chat session",
            StageKind::ChatCreated => "Chat session created",
            StageKind::Loaded => "Loading cached data...",
            StageKind::Scraping => "Scraping website pages...",
            StageKind::Scraped => {
                return prefer_backend(backend_message, "Pages scraped successfully")
            }
            StageKind::Storing => "Storing page data...",
            StageKind::Stored => "Pages stored successfully",
            StageKind::Embedding => "Generating embeddings...",
            StageKind::Embedded => return prefer_backend(backend_message, "Embeddings generated"),
            StageKind::Summarizing => "Generating AI summary...",
            StageKind::DeepScraping => {
                return prefer_backend(backend_message, "Starting deep scrape...")
            }
            StageKind::Complete => "Scraping completed!",
            StageKind::Error | StageKind::Unknown(_) => return backend_message.to_string(),
        };
        fixed.to_string()
    }

    /// Stages that mark a finished step of the pipeline.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            StageKind::CacheFound
                | StageKind::ChatFound
                | StageKind::ChatCreated
                | StageKind::Loaded
                | StageKind::Scraped
                | StageKind::Stored
                | StageKind::Embedded
                | StageKind::Complete
        )
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn prefer_backend(backend_message: &str, fallback: &str) -> String {
    if backend_message.trim().is_empty() {
        fallback.to_string()
    } else {
        backend_message.to_string()
    }
}

/// One row of the foreground crawl's progress list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapingStage {
    pub stage: StageKind,
    pub message: String,
    pub progress: u8,
    pub completed: bool,
}
