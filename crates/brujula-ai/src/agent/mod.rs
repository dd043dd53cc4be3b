//! Agent module - conversation state and the turn orchestrator

mod orchestrator;
mod state;
mod stream;

pub use orchestrator::{
    MAX_TOOL_ROUNDS, SUMMARIZE_THRESHOLD, TOOL_MESSAGE_TAG, TurnOrchestrator,
};
pub use state::{ConversationState, TurnDelta, UsedDocument};
pub use stream::{ChannelEmitter, NullEmitter, TokenEmitter, ToolCallAccumulator};
