//! Tools module - model-callable tool implementations
//!
//! Tools implement the `Tool` trait and are handed to the turn orchestrator
//! through a `ToolRegistry`. The only built-in tool is the retrieval adapter.

mod registry;
mod retriever;
mod traits;

pub use registry::ToolRegistry;
pub use retriever::{
    NO_RESULTS_MESSAGE, RETRIEVER_TOOL_NAME, RetrievalTool, RetrievedPassage, Retriever,
};
pub use traits::{Tool, ToolOutput, ToolSchema};
