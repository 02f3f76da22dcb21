//! Multi-turn conversations on top of the analysis engine

mod manager;
mod session;
mod store;

pub use manager::{DialogError, DialogManager, TurnPolicy};
pub use session::{ConversationSession, Turn, DEFAULT_MAX_TURNS};
pub use store::{
    SessionHandle, SessionStore, SessionStoreConfig, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_MAX_SESSIONS,
};
