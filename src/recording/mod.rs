//! Workout lifecycle: start, resume, finish and discard.

pub mod session;
pub mod types;

pub use session::SessionOrchestrator;
pub use types::{SessionError, SessionState, Workout};
