use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const BASE_URL_ENV: &str = "SITECHAT_API_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    /// Per-attempt deadline.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_jitter: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the zero-based `attempt` failed, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    /// Deadline for opening the crawl stream; reading it has no deadline.
    pub stream_open_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            stream_open_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Defaults, with the base URL taken from `SITECHAT_API_URL` when set.
    pub fn from_env() -> Self {
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::with_base_url(url.trim()),
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub poll_interval: Duration,
    /// How long a terminal crawl stays visible before it is untracked.
    pub terminal_grace: Duration,
    pub query_limit: u32,
    pub default_max_depth: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            terminal_grace: Duration::from_secs(2),
            query_limit: 5,
            default_max_depth: 1,
        }
    }
}
