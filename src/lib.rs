pub mod config;
pub mod error;
pub mod http;
pub mod meet;
pub mod quota;
pub mod reply;
pub mod speech;
pub mod store;

pub use config::Config;
pub use error::MeetError;
pub use http::{create_router, AppState, CurrentUser};
pub use meet::{
    Clock, Meet, MeetManager, MeetPhase, Speaker, SpokenUtterance, SystemClock, Turn, TurnEngine,
};
pub use quota::{FixedWindowQuota, QuotaGuard};
pub use reply::{OpenAiReplyGenerator, ReplyConfig, ReplyGenerator, Utterance};
pub use speech::{GoogleSpeech, SpeechConfig, SpeechTranscoder};
pub use store::{InsertMeet, MeetStore, SqliteStore, TurnStore, User, UserDirectory};
