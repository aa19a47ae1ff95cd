//! Canvas lifecycle: the once-per-session auto-expiry gate.

use crate::clock::Clock;
use crate::config::CanvasConfig;
use crate::store::CanvasStore;
use crate::stroke::Timestamp;
use crate::sync::SyncEngine;
use std::time::Duration;

/// Outcome of [`LifecyclePolicy::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// The canvas is younger than the expiry window.
    Fresh,
    /// The canvas was older than the window and a reset was issued.
    Expired,
    /// This session already ran its check.
    AlreadyChecked,
    /// The metadata could not be read; nothing was done.
    Unavailable,
}

/// Clears the canvas when it is older than the expiry window. Evaluated once
/// per session, not on a timer.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    expiry: Duration,
    checked: bool,
}

impl LifecyclePolicy {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            checked: false,
        }
    }

    pub fn from_config(config: &CanvasConfig) -> Self {
        Self::new(config.expiry())
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn has_checked(&self) -> bool {
        self.checked
    }

    /// A canvas that was never reset counts as reset at the epoch.
    pub fn is_expired(&self, last_reset: Option<Timestamp>, now: Timestamp) -> bool {
        now.since(last_reset.unwrap_or(Timestamp::EPOCH)) > self.expiry
    }

    /// Read the reset time and clear the canvas (keeping the prompt) if it
    /// has expired. Only the first call per policy does anything.
    pub async fn check<S: CanvasStore>(
        &mut self,
        engine: &SyncEngine<S>,
        clock: &impl Clock,
    ) -> ExpiryCheck {
        if self.checked {
            return ExpiryCheck::AlreadyChecked;
        }
        self.checked = true;

        let meta = match engine.read_meta().await {
            Ok(meta) => meta,
            Err(err) => {
                log::error!("Could not read canvas metadata: {}", err);
                return ExpiryCheck::Unavailable;
            }
        };
        let last_reset = meta.and_then(|m| m.last_reset);
        let now = clock.now();
        if !self.is_expired(last_reset, now) {
            return ExpiryCheck::Fresh;
        }

        log::info!(
            "Canvas expired ({:?} since last reset), clearing",
            now.since(last_reset.unwrap_or(Timestamp::EPOCH))
        );
        engine.reset(false).await;
        ExpiryCheck::Expired
    }
}
