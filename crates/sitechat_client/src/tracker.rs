//! Background crawl tracking.
//!
//! Crawls that outlive the foreground stream are polled on a fixed interval
//! while at least one is tracked. A crawl whose status request fails is
//! dropped rather than retried, and a crawl that reaches a terminal status
//! stays visible for the grace period before it is untracked.
use std::collections::BTreeMap;

use client_logging::{client_debug, client_info, client_warn};
use futures_util::future::join_all;
use sitechat_core::{CrawlId, CrawlProgress, Msg};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::store::{lock, SessionStore};
use crate::ClientError;

impl SessionStore {
    /// Tracks `crawl_id`; the first tracked crawl starts the polling loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_active_crawl(&self, crawl_id: &str) {
        self.apply(Msg::CrawlTracked {
            crawl_id: crawl_id.to_string(),
        });
    }

    /// Untracks `crawl_id`; polling stops once nothing is tracked.
    pub fn remove_active_crawl(&self, crawl_id: &str) {
        self.apply(Msg::CrawlUntracked {
            crawl_id: crawl_id.to_string(),
        });
    }

    /// Asks the backend to cancel, then untracks whatever it answered.
    pub async fn cancel_crawl(&self, crawl_id: &str) -> Result<(), ClientError> {
        let outcome = self.inner.backend.cancel_crawl(crawl_id).await;
        if let Err(err) = &outcome {
            client_warn!("Cancel request for crawl {} failed: {}", crawl_id, err);
        }
        self.remove_active_crawl(crawl_id);
        outcome
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller).is_some()
    }

    pub fn active_crawls(&self) -> BTreeMap<CrawlId, CrawlProgress> {
        self.state().active_crawls().clone()
    }
}

pub(crate) fn start_polling(store: &SessionStore) {
    let token = CancellationToken::new();
    if let Some(previous) = lock(&store.inner.poller).replace(token.clone()) {
        previous.cancel();
    }
    client_info!(
        "Polling background crawls every {:?}",
        store.inner.settings.poll_interval
    );
    tokio::spawn(poll_loop(store.clone(), token));
}

pub(crate) fn stop_polling(store: &SessionStore) {
    if let Some(token) = lock(&store.inner.poller).take() {
        token.cancel();
        client_info!("Stopped polling background crawls");
    }
}

pub(crate) fn schedule_removal(store: &SessionStore, crawl_id: CrawlId) {
    let store = store.clone();
    let grace = store.inner.settings.terminal_grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        client_debug!("Grace period over for crawl {}", crawl_id);
        store.apply(Msg::CrawlUntracked { crawl_id });
    });
}

async fn poll_loop(store: SessionStore, cancel: CancellationToken) {
    let period = store.inner.settings.poll_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let tracked: Vec<CrawlId> = store.state().active_crawls().keys().cloned().collect();
        if tracked.is_empty() {
            continue;
        }

        let backend = store.inner.backend.clone();
        let polls = tracked.into_iter().map(|crawl_id| {
            let backend = backend.clone();
            async move {
                let result = backend.crawl_progress(&crawl_id).await;
                (crawl_id, result)
            }
        });

        let mut follow_up = Vec::new();
        for (crawl_id, result) in join_all(polls).await {
            let msg = match result {
                Ok(mut progress) => {
                    progress.crawl_id = crawl_id;
                    Msg::CrawlProgressed(progress)
                }
                Err(err) => {
                    client_warn!("Dropping crawl {}: status request failed: {}", crawl_id, err);
                    Msg::CrawlPollFailed { crawl_id }
                }
            };
            follow_up.extend(store.transition(msg));
        }

        if let Err(err) = store.settle(follow_up).await {
            client_warn!("Refresh after crawl update failed: {}", err);
        }
    }
}
