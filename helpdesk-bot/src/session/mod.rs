//! Per-user conversation sessions.
//!
//! Sessions live only in memory and are discarded once a transcript is
//! saved. `history` is never trimmed; only the prompt sent to the model is
//! bounded, via [`window::windowed`].

pub mod store;
pub mod types;
pub mod window;

pub use store::{SessionGuard, SessionStore};
pub use types::{HistoryEntry, HistoryRole, MessageRole, PromptMessage, Session};
pub use window::windowed;
