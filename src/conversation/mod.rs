//! Request/response middleware.
//!
//! A coarser chain than [`crate::middleware`]: layers see the whole
//! message list before the call and the whole [`GenerateResult`] after
//! it, never individual stream events.
//!
//! Layers run in declaration order on the way in (`before_request`) and in
//! reverse on the way out (`after_response`). When the call fails, each
//! layer's `on_error` is offered the error, innermost first; the first
//! layer to return `Ok` recovers the call, and the recovered result still
//! flows through every `after_response`. Put the error handler first if
//! it should have the last word on failures.
//!
//! `on_error` covers failures of the model call only. An error returned
//! by a layer's own `before_request` or `after_response` ends the call
//! and reaches the caller unchanged, since re-running the model cannot
//! repair it.

mod context;
mod error_handler;
mod filter;

pub use context::ContextInjection;
pub use error_handler::ErrorHandler;
pub use filter::ContentFilter;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::types::{GenerateResult, Message};
use crate::{MuninnError, Result};

/// Re-runs the failed model call with the same prepared messages.
pub struct RunAgain<'a> {
    run: Box<dyn Fn() -> BoxFuture<'a, Result<GenerateResult>> + Send + Sync + 'a>,
}

impl<'a> RunAgain<'a> {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> BoxFuture<'a, Result<GenerateResult>> + Send + Sync + 'a,
    {
        Self { run: Box::new(run) }
    }

    pub async fn call(&self) -> Result<GenerateResult> {
        (self.run)().await
    }
}

/// Context handed to [`ConversationMiddleware::on_error`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorMetadata {
    /// Messages that were sent with the failed call.
    pub messages: Vec<Message>,
    /// Name of the layer being asked.
    pub layer: String,
    pub values: BTreeMap<String, serde_json::Value>,
}

/// One request/response layer.
#[async_trait]
pub trait ConversationMiddleware: Send + Sync {
    /// Layer name for logging/debugging.
    fn name(&self) -> &str;

    /// Rewrite the outgoing messages.
    async fn before_request(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        Ok(messages)
    }

    /// Rewrite the completed response.
    async fn after_response(&self, response: GenerateResult) -> Result<GenerateResult> {
        Ok(response)
    }

    /// Recover from a failed call, or return the error (possibly another one).
    async fn on_error(
        &self,
        error: MuninnError,
        _run_again: &RunAgain<'_>,
        _metadata: &ErrorMetadata,
    ) -> Result<GenerateResult> {
        Err(error)
    }
}

/// Ordered request/response layers. Built once, reused for every call.
#[derive(Clone, Default)]
pub struct ConversationChain {
    layers: Vec<Arc<dyn ConversationMiddleware>>,
}

impl ConversationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer (inside the ones already added).
    pub fn layer(mut self, layer: Arc<dyn ConversationMiddleware>) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names, outermost first.
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Apply every `before_request` in order.
    pub async fn prepare(&self, mut messages: Vec<Message>) -> Result<Vec<Message>> {
        for layer in &self.layers {
            messages = layer.before_request(messages).await?;
        }
        Ok(messages)
    }

    /// Run `handler` through the chain.
    ///
    /// `handler` performs the model call for the prepared messages and may
    /// be invoked again by an `on_error` recovery. Errors from the layers'
    /// own hooks are returned without consulting `on_error`.
    pub async fn execute<F, Fut>(&self, messages: Vec<Message>, handler: F) -> Result<GenerateResult>
    where
        F: Fn(Vec<Message>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<GenerateResult>> + Send,
    {
        let messages = self.prepare(messages).await?;

        let mut response = match handler(messages.clone()).await {
            Ok(response) => response,
            Err(error) => self.recover(error, &messages, &handler).await?,
        };

        for layer in self.layers.iter().rev() {
            response = layer.after_response(response).await?;
        }
        Ok(response)
    }

    async fn recover<F, Fut>(
        &self,
        mut error: MuninnError,
        messages: &[Message],
        handler: &F,
    ) -> Result<GenerateResult>
    where
        F: Fn(Vec<Message>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<GenerateResult>> + Send,
    {
        let run_again = RunAgain::new(|| Box::pin(handler(messages.to_vec())));
        for layer in self.layers.iter().rev() {
            let metadata = ErrorMetadata {
                messages: messages.to_vec(),
                layer: layer.name().to_string(),
                values: BTreeMap::new(),
            };
            match layer.on_error(error, &run_again, &metadata).await {
                Ok(response) => return Ok(response),
                Err(e) => error = e,
            }
        }
        Err(error)
    }
}

impl std::fmt::Debug for ConversationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationChain")
            .field("layers", &self.names())
            .finish()
    }
}
