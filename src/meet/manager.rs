use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use super::{generate_meet_code, Clock, Meet};
use crate::error::{MeetError, Result};
use crate::store::{InsertMeet, MeetStore};

/// How many fresh codes to try when creation hits the unique constraint.
/// Collisions are already vanishingly rare at 9 symbols; repeated hits
/// mean something else is wrong.
const MAX_CODE_ATTEMPTS: usize = 5;

/// Owns the meet lifecycle: create an unstarted meet, start it (opening
/// its fixed window exactly once), end it with a recorded reason.
pub struct MeetManager {
    store: Arc<dyn MeetStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    code_length: usize,
}

impl MeetManager {
    pub fn new(
        store: Arc<dyn MeetStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        code_length: usize,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            code_length,
        }
    }

    /// Create an unstarted meet owned by `owner_id`. The code is
    /// regenerated only when the store reports a uniqueness collision,
    /// never on other failures.
    pub async fn create(&self, owner_id: &str) -> Result<Meet> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let meet = Meet {
                meet_code: generate_meet_code(self.code_length),
                owner_id: owner_id.to_string(),
                started_at: None,
                ends_at: None,
                end_reason: None,
                created_at: self.clock.now(),
            };

            match self.store.insert_meet(&meet).await? {
                InsertMeet::Created => {
                    info!("Created meet {} for owner {}", meet.meet_code, owner_id);
                    return Ok(meet);
                }
                InsertMeet::CodeTaken => {
                    warn!("Meet code collision, regenerating");
                }
            }
        }

        Err(MeetError::Storage(
            "could not generate a unique meet code".into(),
        ))
    }

    /// Open the meet window: `ends_at = now + window`, set atomically
    /// with `started_at`. Starting an already-started meet is a no-op
    /// success, so a replayed start can never extend the window.
    pub async fn start(&self, owner_id: &str, meet_code: &str) -> Result<()> {
        let meet = self
            .store
            .find_meet(owner_id, meet_code)
            .await?
            .ok_or(MeetError::NotFound)?;

        if meet.started_at.is_some() {
            warn!("Meet {} already started, leaving window untouched", meet_code);
            return Ok(());
        }

        let now = self.clock.now();
        let updated = self
            .store
            .set_window(owner_id, meet_code, now, now + self.window)
            .await?;
        if !updated {
            // The store only writes an unset window, so losing the write
            // means another start got there first; re-read to tell that
            // no-op apart from a vanished meet.
            let meet = self
                .store
                .find_meet(owner_id, meet_code)
                .await?
                .ok_or(MeetError::NotFound)?;
            if meet.started_at.is_some() {
                warn!("Meet {} started concurrently, leaving window untouched", meet_code);
                return Ok(());
            }
            return Err(MeetError::NotFound);
        }

        info!("Started meet {} for owner {}", meet_code, owner_id);
        Ok(())
    }

    /// Record an end reason. Ending repeatedly is allowed; the last
    /// reason wins.
    pub async fn end(&self, owner_id: &str, meet_code: &str, reason: &str) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(MeetError::Validation("end reason must not be empty".into()));
        }

        let updated = self.store.set_end_reason(owner_id, meet_code, reason).await?;
        if !updated {
            return Err(MeetError::NotFound);
        }

        info!("Ended meet {} for owner {}: {}", meet_code, owner_id, reason);
        Ok(())
    }
}
