use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use super::{Clock, Meet, MeetPhase, Speaker, Turn};
use crate::error::{MeetError, Result};
use crate::quota::QuotaGuard;
use crate::reply::{ReplyGenerator, Utterance};
use crate::speech::SpeechTranscoder;
use crate::store::{MeetStore, TurnStore};

/// A generated system turn: the text that was persisted and its
/// synthesized audio for playback. Audio is never persisted.
#[derive(Debug, Clone)]
pub struct SpokenUtterance {
    pub text: String,
    pub audio: Vec<u8>,
}

/// Orchestrates conversation turns for a meet. Owns no persistent state
/// itself: meet state is derived from the meet store, turn order from
/// the turn store, and the adapters are stateless.
///
/// Turn-producing operations on one meet are serialized through a
/// per-meet async lock held for the whole operation, so a racing caller
/// waits instead of burning speech/reply service calls on a turn that
/// would be rejected. The turn store re-checks the expected predecessor
/// on append as the final authority.
pub struct TurnEngine {
    meets: Arc<dyn MeetStore>,
    turns: Arc<dyn TurnStore>,
    speech: Arc<dyn SpeechTranscoder>,
    replies: Arc<dyn ReplyGenerator>,
    quota: Arc<dyn QuotaGuard>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TurnEngine {
    pub fn new(
        meets: Arc<dyn MeetStore>,
        turns: Arc<dyn TurnStore>,
        speech: Arc<dyn SpeechTranscoder>,
        replies: Arc<dyn ReplyGenerator>,
        quota: Arc<dyn QuotaGuard>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            meets,
            turns,
            speech,
            replies,
            quota,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open the conversation: generate the interviewer's opening
    /// utterance, synthesize it, persist it as the first (system) turn.
    /// Fails with `AlreadyOpened` if any turn already exists.
    pub async fn open_conversation(
        &self,
        owner_id: &str,
        meet_code: &str,
    ) -> Result<SpokenUtterance> {
        let lock = self.lock_for(meet_code)?;
        let _guard = lock.lock().await;

        self.open_meet(owner_id, meet_code).await?;

        if self.turns.last_speaker(meet_code).await?.is_some() {
            return Err(MeetError::AlreadyOpened);
        }

        self.quota.check(meet_code).await?;

        let spoken = self.generate_system_turn(owner_id, meet_code, &[]).await;
        match &spoken {
            // A concurrent opener slipped in between the check and the
            // append; for an opening turn that means already opened.
            Err(MeetError::OutOfOrderTurn) => Err(MeetError::AlreadyOpened),
            _ => spoken,
        }
    }

    /// Transcribe and persist one user utterance. The user may only
    /// speak right after a system turn. No reply is generated here;
    /// `advance_turn` is the explicit follow-up.
    pub async fn submit_user_turn(
        &self,
        owner_id: &str,
        meet_code: &str,
        audio: &[u8],
    ) -> Result<()> {
        let lock = self.lock_for(meet_code)?;
        let _guard = lock.lock().await;

        self.open_meet(owner_id, meet_code).await?;

        match self.turns.last_speaker(meet_code).await? {
            Some(Speaker::System) => {}
            _ => return Err(MeetError::OutOfOrderTurn),
        }

        let transcript = self.speech.speech_to_text(audio).await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(MeetError::Transcription(
                "transcription produced no text".into(),
            ));
        }

        let turn = Turn {
            meet_code: meet_code.to_string(),
            owner_id: owner_id.to_string(),
            speaker: Speaker::User,
            content: transcript.to_string(),
            created_at: self.clock.now(),
        };
        self.turns.append_turn(&turn, Some(Speaker::System)).await?;

        info!("Recorded user turn for meet {}", meet_code);
        Ok(())
    }

    /// Generate the next system utterance from the full conversation
    /// history. Only valid right after a user turn.
    pub async fn advance_turn(&self, owner_id: &str, meet_code: &str) -> Result<SpokenUtterance> {
        let lock = self.lock_for(meet_code)?;
        let _guard = lock.lock().await;

        self.open_meet(owner_id, meet_code).await?;

        match self.turns.last_speaker(meet_code).await? {
            Some(Speaker::User) => {}
            _ => return Err(MeetError::OutOfOrderTurn),
        }

        self.quota.check(meet_code).await?;

        // The generator is stateless: full history goes with every call.
        let history: Vec<Utterance> = self
            .turns
            .history(meet_code)
            .await?
            .into_iter()
            .map(|turn| Utterance {
                speaker: turn.speaker,
                text: turn.content,
            })
            .collect();

        self.generate_system_turn(owner_id, meet_code, &history).await
    }

    // ── helpers ────────────────────────────────────────────────────────

    /// Resolve the meet and require its window to be open. Expiry is
    /// evaluated lazily here on every operation; nothing expires meets
    /// in the background.
    async fn open_meet(&self, owner_id: &str, meet_code: &str) -> Result<Meet> {
        let meet = self
            .meets
            .find_meet(owner_id, meet_code)
            .await?
            .ok_or(MeetError::NotFound)?;

        match meet.phase(self.clock.now()) {
            MeetPhase::Unopened => Err(MeetError::SessionNotStarted),
            MeetPhase::Expired => Err(MeetError::SessionExpired),
            MeetPhase::Open => Ok(meet),
        }
    }

    /// Generate, synthesize and persist one system turn. The turn is
    /// written only after both adapter calls succeed, so a failed
    /// generation leaves no partial state behind.
    async fn generate_system_turn(
        &self,
        owner_id: &str,
        meet_code: &str,
        history: &[Utterance],
    ) -> Result<SpokenUtterance> {
        let text = self.replies.next_utterance(history).await?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(MeetError::Generation("generator returned no text".into()));
        }

        let audio = self.speech.text_to_speech(&text).await?;

        let expected_last = if history.is_empty() {
            None
        } else {
            Some(Speaker::User)
        };
        let turn = Turn {
            meet_code: meet_code.to_string(),
            owner_id: owner_id.to_string(),
            speaker: Speaker::System,
            content: text.clone(),
            created_at: self.clock.now(),
        };
        self.turns.append_turn(&turn, expected_last).await?;

        info!("Recorded system turn for meet {}", meet_code);
        Ok(SpokenUtterance { text, audio })
    }

    fn lock_for(&self, meet_code: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| MeetError::Storage(format!("lock registry poisoned: {e}")))?;

        // Evict locks nobody holds anymore, otherwise the registry
        // grows by one entry per meet ever seen. A held lock keeps an
        // Arc clone outside the map.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Ok(Arc::clone(
            locks
                .entry(meet_code.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        ))
    }
}
