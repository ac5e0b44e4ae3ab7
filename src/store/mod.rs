//! Persistence traits for meets, turns and user lookup
//!
//! The engine and manager only see these traits; the sqlite module
//! provides the production implementation. Tests substitute fakes.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::meet::{Meet, Speaker, Turn};

/// Outcome of inserting a freshly generated meet record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMeet {
    Created,
    /// The generated code collided with an existing meet; the caller
    /// regenerates and retries. Any other failure is a storage error.
    CodeTaken,
}

#[async_trait]
pub trait MeetStore: Send + Sync {
    async fn insert_meet(&self, meet: &Meet) -> Result<InsertMeet>;

    async fn find_meet(&self, owner_id: &str, meet_code: &str) -> Result<Option<Meet>>;

    /// Set the meet window, but only if it has never been set: a window
    /// that is already open must not move. Returns false if no matching
    /// unstarted meet exists.
    async fn set_window(
        &self,
        owner_id: &str,
        meet_code: &str,
        started_at: chrono::DateTime<chrono::Utc>,
        ends_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool>;

    /// Record an end reason. Returns false if no matching meet exists.
    async fn set_end_reason(&self, owner_id: &str, meet_code: &str, reason: &str) -> Result<bool>;
}

#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Append a turn, but only if the latest persisted turn's speaker
    /// matches `expected_last` (`None` means the conversation must be
    /// empty). A mismatch fails with `OutOfOrderTurn` and persists
    /// nothing; this check is the authority when concurrent writers
    /// race for the same meet.
    async fn append_turn(&self, turn: &Turn, expected_last: Option<Speaker>) -> Result<()>;

    /// Full conversation history for a meet, oldest first.
    async fn history(&self, meet_code: &str) -> Result<Vec<Turn>>;

    /// Speaker of the most recent turn, if any turn exists.
    async fn last_speaker(&self, meet_code: &str) -> Result<Option<Speaker>>;
}

/// Authenticated user context, owned by the identity service. The core
/// only ever reads it to resolve a session token to an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub verified: bool,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<User>>;
}
