use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use voxmeet::{
    Clock, Meet, MeetError, MeetManager, QuotaGuard, ReplyGenerator, Speaker, SpeechTranscoder,
    SqliteStore, TurnEngine, TurnStore, Utterance,
};

// ============================================================================
// Fakes
// ============================================================================

/// Settable clock shared by the manager and the engine.
struct FakeClock(Mutex<DateTime<Utc>>);

impl FakeClock {
    fn at(epoch_secs: i64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc.timestamp_opt(epoch_secs, 0).unwrap())))
    }

    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Speech transcoder with a scripted transcript and call counters.
struct FakeSpeech {
    transcript: Mutex<String>,
    fail_synthesis: AtomicBool,
    stt_calls: AtomicUsize,
    tts_calls: AtomicUsize,
}

impl FakeSpeech {
    fn new(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: Mutex::new(transcript.to_string()),
            fail_synthesis: AtomicBool::new(false),
            stt_calls: AtomicUsize::new(0),
            tts_calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> (usize, usize) {
        (
            self.stt_calls.load(Ordering::SeqCst),
            self.tts_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl SpeechTranscoder for FakeSpeech {
    async fn speech_to_text(&self, _audio: &[u8]) -> Result<String, MeetError> {
        self.stt_calls.fetch_add(1, Ordering::SeqCst);
        let transcript = self.transcript.lock().unwrap().clone();
        if transcript.is_empty() {
            return Err(MeetError::Transcription("no speech recognized".into()));
        }
        Ok(transcript)
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, MeetError> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_synthesis.load(Ordering::SeqCst) {
            return Err(MeetError::Generation("synthesis unavailable".into()));
        }
        Ok(format!("mp3:{text}").into_bytes())
    }
}

/// Reply generator that pops scripted replies and records the history
/// length of every call.
struct ScriptedReplies {
    replies: Mutex<VecDeque<String>>,
    fail_next: AtomicBool,
    history_lens: Mutex<Vec<usize>>,
}

impl ScriptedReplies {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            fail_next: AtomicBool::new(false),
            history_lens: Mutex::new(Vec::new()),
        })
    }

    fn history_lens(&self) -> Vec<usize> {
        self.history_lens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedReplies {
    async fn next_utterance(&self, history: &[Utterance]) -> Result<String, MeetError> {
        self.history_lens.lock().unwrap().push(history.len());
        if self.fail_next.load(Ordering::SeqCst) {
            return Err(MeetError::Generation("generator unavailable".into()));
        }
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Could you tell me more?".to_string()))
    }
}

/// Quota that allows a fixed number of checks, then denies.
struct CountingQuota {
    allowed: usize,
    checks: AtomicUsize,
}

impl CountingQuota {
    fn new(allowed: usize) -> Arc<Self> {
        Arc::new(Self {
            allowed,
            checks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl QuotaGuard for CountingQuota {
    async fn check(&self, _meet_code: &str) -> Result<(), MeetError> {
        if self.checks.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(MeetError::QuotaExceeded);
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: Arc<SqliteStore>,
    clock: Arc<FakeClock>,
    speech: Arc<FakeSpeech>,
    replies: Arc<ScriptedReplies>,
    manager: MeetManager,
    engine: TurnEngine,
}

fn harness_with_quota(quota: Arc<dyn QuotaGuard>) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let clock = FakeClock::at(1_000_000);
    let speech = FakeSpeech::new("hello");
    let replies = ScriptedReplies::new(&[
        "Welcome! Tell me about yourself.",
        "What interests you about this role?",
        "How do you handle deadlines?",
        "What is your biggest strength?",
    ]);

    let manager = MeetManager::new(store.clone(), clock.clone(), Duration::minutes(10), 9);
    let engine = TurnEngine::new(
        store.clone(),
        store.clone(),
        speech.clone(),
        replies.clone(),
        quota,
        clock.clone(),
    );

    Harness {
        store,
        clock,
        speech,
        replies,
        manager,
        engine,
    }
}

fn harness() -> Harness {
    harness_with_quota(CountingQuota::new(usize::MAX))
}

impl Harness {
    async fn started_meet(&self) -> Meet {
        let meet = self.manager.create("owner-1").await.unwrap();
        self.manager.start("owner-1", &meet.meet_code).await.unwrap();
        meet
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn open_before_start_fails_not_started() {
    let h = harness();
    let meet = h.manager.create("owner-1").await.unwrap();

    let err = h
        .engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::SessionNotStarted));
    assert_eq!(h.speech.calls(), (0, 0));
}

#[tokio::test]
async fn open_returns_one_system_turn_and_is_not_repeatable() {
    let h = harness();
    let meet = h.started_meet().await;

    let opened = h
        .engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();
    assert_eq!(opened.text, "Welcome! Tell me about yourself.");
    assert_eq!(opened.audio, b"mp3:Welcome! Tell me about yourself.");

    // The generator saw an empty history for the opener.
    assert_eq!(h.replies.history_lens(), vec![0]);

    let history = h.store.history(&meet.meet_code).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].speaker, Speaker::System);

    let err = h
        .engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::AlreadyOpened));
    assert_eq!(h.store.history(&meet.meet_code).await.unwrap().len(), 1);
}

#[tokio::test]
async fn user_cannot_speak_before_or_twice_in_a_row() {
    let h = harness();
    let meet = h.started_meet().await;

    // No turn exists yet: not the user's turn.
    let err = h
        .engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::OutOfOrderTurn));

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();
    h.engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap();

    // Last turn is now the user's own: rejected again.
    let err = h
        .engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::OutOfOrderTurn));
}

#[tokio::test]
async fn full_exchange_alternates_speakers_and_feeds_history() {
    let h = harness();
    let meet = h.started_meet().await;

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();
    h.engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap();

    let history = h.store.history(&meet.meet_code).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].speaker, Speaker::User);
    assert_eq!(history[1].content, "hello");

    let reply = h
        .engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap();
    assert_eq!(reply.text, "What interests you about this role?");

    // Opener saw 0 turns, the advance saw the full 2-turn history.
    assert_eq!(h.replies.history_lens(), vec![0, 2]);

    // Alternation invariant: ordered turns alternate starting with system.
    let history = h.store.history(&meet.meet_code).await.unwrap();
    assert_eq!(history.len(), 3);
    for (i, turn) in history.iter().enumerate() {
        let expected = if i % 2 == 0 {
            Speaker::System
        } else {
            Speaker::User
        };
        assert_eq!(turn.speaker, expected, "turn {i} out of order");
    }
}

#[tokio::test]
async fn advance_requires_a_pending_user_turn() {
    let h = harness();
    let meet = h.started_meet().await;

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();

    // Last turn is the system's own opener.
    let err = h
        .engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::OutOfOrderTurn));
}

#[tokio::test]
async fn window_expiry_is_evaluated_lazily_per_call() {
    let h = harness();
    let meet = h.started_meet().await;

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();
    h.engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap();

    // One second before the window closes the call still succeeds.
    h.clock.advance(Duration::minutes(10) - Duration::seconds(1));
    h.engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap();

    h.engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap();

    // Two seconds later the window has closed; `end` was never called.
    h.clock.advance(Duration::seconds(2));
    let err = h
        .engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::SessionExpired));

    let err = h
        .engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::SessionExpired));
}

#[tokio::test]
async fn quota_denial_blocks_before_any_adapter_call() {
    // Opener plus three advances are allowed; the fourth advance is not.
    let h = harness_with_quota(CountingQuota::new(4));
    let meet = h.started_meet().await;

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();

    for _ in 0..3 {
        h.engine
            .submit_user_turn("owner-1", &meet.meet_code, b"opus")
            .await
            .unwrap();
        h.engine
            .advance_turn("owner-1", &meet.meet_code)
            .await
            .unwrap();
    }

    h.engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap();

    let turns_before = h.store.history(&meet.meet_code).await.unwrap().len();
    let (stt_before, tts_before) = h.speech.calls();
    let generator_calls_before = h.replies.history_lens().len();

    let err = h
        .engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::QuotaExceeded));

    // Nothing was generated, synthesized or persisted.
    assert_eq!(h.replies.history_lens().len(), generator_calls_before);
    assert_eq!(h.speech.calls(), (stt_before, tts_before));
    assert_eq!(
        h.store.history(&meet.meet_code).await.unwrap().len(),
        turns_before
    );
}

#[tokio::test]
async fn failed_generation_persists_nothing() {
    let h = harness();
    let meet = h.started_meet().await;

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();
    h.engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap();

    h.replies.fail_next.store(true, Ordering::SeqCst);
    let err = h
        .engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::Generation(_)));
    assert_eq!(h.store.history(&meet.meet_code).await.unwrap().len(), 2);

    // Same guarantee when synthesis fails after generation succeeded.
    h.replies.fail_next.store(false, Ordering::SeqCst);
    h.speech.fail_synthesis.store(true, Ordering::SeqCst);
    let err = h
        .engine
        .advance_turn("owner-1", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::Generation(_)));
    assert_eq!(h.store.history(&meet.meet_code).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_transcription_fails_and_persists_nothing() {
    let h = harness();
    let meet = h.started_meet().await;

    h.engine
        .open_conversation("owner-1", &meet.meet_code)
        .await
        .unwrap();

    h.speech.transcript.lock().unwrap().clear();
    let err = h
        .engine
        .submit_user_turn("owner-1", &meet.meet_code, b"opus")
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::Transcription(_)));
    assert_eq!(h.store.history(&meet.meet_code).await.unwrap().len(), 1);
}

#[tokio::test]
async fn owner_mismatch_is_not_found() {
    let h = harness();
    let meet = h.started_meet().await;

    let err = h
        .engine
        .open_conversation("owner-2", &meet.meet_code)
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::NotFound));
}
