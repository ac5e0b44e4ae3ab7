//! Meet lifecycle and conversation turn management
//!
//! This module provides:
//! - The `Meet` and `Turn` records and the derived `MeetPhase` state machine
//! - `MeetManager` for the create/start/end lifecycle
//! - `TurnEngine` for orchestrating conversation turns across the
//!   speech transcoder, reply generator and stores

mod code;
mod engine;
mod manager;

pub use code::generate_meet_code;
pub use engine::{SpokenUtterance, TurnEngine};
pub use manager::MeetManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    System,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Speaker::User),
            "system" => Some(Speaker::System),
            _ => None,
        }
    }
}

/// A timed interview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meet {
    /// Unique meet code the client uses for all calls
    pub meet_code: String,

    /// Owner (authenticated user) who created the meet
    pub owner_id: String,

    /// When the meet was started; None until `start` is called
    pub started_at: Option<DateTime<Utc>>,

    /// When the window closes; set together with `started_at`
    pub ends_at: Option<DateTime<Utc>>,

    /// Reason recorded by an explicit `end`; None otherwise
    pub end_reason: Option<String>,

    /// When the meet record was created
    pub created_at: DateTime<Utc>,
}

/// Meet state derived from its timestamps. Never stored: recomputing it
/// from the window keeps a stale flag from drifting out of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetPhase {
    /// `start` has not been called yet
    Unopened,
    /// Window is open: started and `now < ends_at`
    Open,
    /// Window has closed: `now >= ends_at`
    Expired,
}

impl Meet {
    /// Derive the phase of this meet at `now`. Every consumer goes
    /// through this one function so expiry checks cannot diverge.
    pub fn phase(&self, now: DateTime<Utc>) -> MeetPhase {
        match (self.started_at, self.ends_at) {
            (Some(_), Some(ends_at)) if now < ends_at => MeetPhase::Open,
            (Some(_), Some(_)) => MeetPhase::Expired,
            _ => MeetPhase::Unopened,
        }
    }
}

/// One utterance in a meet's linear conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub meet_code: String,
    pub owner_id: String,
    pub speaker: Speaker,
    /// Transcript or generated text; audio is never persisted
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Time source used for phase derivation and window stamps. One shared
/// implementation per process; tests substitute a fixed clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
