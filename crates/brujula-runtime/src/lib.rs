//! Brujula Runtime - the session boundary adapter
//!
//! Owns one conversation per session id, serializes turns per session,
//! applies turn deltas atomically, and exposes the two boundary channels:
//! an ordered token stream and a one-shot turn outcome. Provider failures
//! are converted here into a user-visible apology; broken orchestrator
//! invariants surface as internal errors, never silently.

mod handle;
mod session;
mod starter;

pub use handle::{TurnHandle, TurnOutcome};
pub use session::{APOLOGY_MESSAGE, SessionRuntime};
pub use starter::{StarterQuestion, default_starters};
