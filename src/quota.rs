//! Quota guard for turn generation
//!
//! Invoked by the turn engine before any reply generation, so a denied
//! call never reaches the speech or language services.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::error::{MeetError, Result};

#[async_trait]
pub trait QuotaGuard: Send + Sync {
    /// Allow or deny one more generated turn for this meet. Denial is
    /// `QuotaExceeded`; an allowed call is counted immediately.
    async fn check(&self, meet_code: &str) -> Result<()>;
}

/// Fixed-window quota: at most `max_turns` generated system turns per
/// meet within a rolling `window`.
pub struct FixedWindowQuota {
    max_turns: usize,
    window: Duration,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl FixedWindowQuota {
    pub fn new(max_turns: usize, window: Duration) -> Self {
        Self {
            max_turns,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, meet_code: &str, now: Instant) -> Result<()> {
        let mut hits = self
            .hits
            .lock()
            .map_err(|e| MeetError::Storage(format!("quota lock poisoned: {e}")))?;

        // Drop timestamps outside the window everywhere and evict meets
        // left with none, so finished meets do not accumulate forever.
        hits.retain(|_, stamps| {
            stamps.retain(|t| now.duration_since(*t) < self.window);
            !stamps.is_empty()
        });

        let entry = hits.entry(meet_code.to_string()).or_default();

        if entry.len() >= self.max_turns {
            warn!("Quota reached for meet {}", meet_code);
            return Err(MeetError::QuotaExceeded);
        }

        entry.push(now);
        Ok(())
    }
}

#[async_trait]
impl QuotaGuard for FixedWindowQuota {
    async fn check(&self, meet_code: &str) -> Result<()> {
        self.check_at(meet_code, Instant::now())
    }
}
