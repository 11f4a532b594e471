//! Public types for the Muninn API.

mod event;
mod message;
mod params;
mod response;
mod tool;

pub use event::{EventStream, StreamError, StreamEvent};
pub use message::{Message, Role};
pub use params::CallParameters;
pub use response::{FinishReason, GenerateResult, Usage};
pub use tool::{ToolCall, ToolCallDelta, ToolChoice, ToolDefinition};
