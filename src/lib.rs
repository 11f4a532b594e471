//! Muninn - composable middleware for LLM generate and stream calls
//!
//! Muninn wraps any [`LanguageModel`] in a stack of middleware: response
//! caching with stream capture and replay, reasoning-tag extraction,
//! retry with exponential backoff, default call settings, simulated
//! streaming, and structured logging. A coarser request/response layer
//! adds context injection, content filtering, and conversation-level error
//! handling on top.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use muninn::middleware::{LoggingConfig, ReasoningConfig};
//! use muninn::providers::RecordedModel;
//! use muninn::types::{CallParameters, Message, StreamEvent, FinishReason};
//! use muninn::{CacheConfig, CacheStore, Pipeline, RetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let model = Arc::new(RecordedModel::new(
//!         "demo",
//!         vec![
//!             StreamEvent::text("<think>the user greets me</think>Hello!"),
//!             StreamEvent::finish(FinishReason::Stop),
//!         ],
//!     ));
//!
//!     let cache = CacheConfig::new();
//!     let pipeline = Pipeline::builder(model)
//!         .logging(LoggingConfig::new())
//!         .retry(RetryConfig::new())
//!         .reasoning(ReasoningConfig::new())
//!         .caching(Arc::new(CacheStore::from_config(&cache)), cache)
//!         .build();
//!
//!     let result = pipeline
//!         .generate(CallParameters::new(vec![Message::user("hi")]))
//!         .await?;
//!
//!     println!("{}", result.text);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod conversation;
pub mod error;
pub mod middleware;
pub mod phase;
pub mod pipeline;
pub mod providers;
pub mod reasoning;
pub mod retry;
pub mod stream;
pub mod telemetry;
pub mod tools;
pub mod traits;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStore};
pub use error::{ErrorClass, MuninnError, Result};
pub use phase::CallPhase;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig};
pub use retry::{RetryConfig, RetryContext, with_retry};
pub use traits::{LanguageModel, RawCall, StreamResult};
pub use version::{PKG_VERSION, version_string};
