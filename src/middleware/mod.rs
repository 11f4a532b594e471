//! Language-model middleware.
//!
//! A [`LanguageModelMiddleware`] intercepts `generate` and `stream` calls
//! on their way to the model. Each unit decides whether and how to call
//! `next` (the rest of the chain); the defaults pass straight through, so
//! a unit only overrides the capabilities it cares about.
//!
//! [`wrap_model`] folds an ordered list of units around a model. The first
//! unit is the outermost. Every layer is itself a [`LanguageModel`], so the
//! result can be wrapped again or handed to anything expecting a model.
//!
//! The pipeline builder ([`Pipeline`](crate::Pipeline)) applies the units
//! in a fixed order, outermost to innermost:
//!
//! 1. [`LoggingMiddleware`] sees one outcome per top-level call, cached or not.
//! 2. [`RetryMiddleware`] re-enters the whole inner chain on transient errors.
//! 3. [`DefaultSettingsMiddleware`] finalises params before anything keys on them.
//! 4. [`ExtractReasoningMiddleware`] splits tagged reasoning out of the text.
//! 5. [`SimulateStreamingMiddleware`] serves streams from `generate`.
//! 6. [`CachingMiddleware`] sits next to the model so only real calls are cached.

mod caching;
mod defaults;
mod logging;
mod reasoning;
mod retry;
mod simulate;

pub use caching::CachingMiddleware;
pub use defaults::{DefaultSettings, DefaultSettingsMiddleware};
pub use logging::{LoggingConfig, LoggingMiddleware};
pub use reasoning::{ExtractReasoningMiddleware, ReasoningConfig};
pub use retry::RetryMiddleware;
pub use simulate::SimulateStreamingMiddleware;

use std::sync::Arc;

use async_trait::async_trait;

use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, GenerateResult};
use crate::Result;

/// One interceptor around the model call.
#[async_trait]
pub trait LanguageModelMiddleware: Send + Sync {
    /// Middleware name for logging/debugging.
    fn name(&self) -> &str;

    /// Intercept a non-streaming call.
    async fn wrap_generate(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<GenerateResult> {
        next.do_generate(params).await
    }

    /// Intercept a streaming call.
    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        next.do_stream(params).await
    }
}

/// A model with one middleware applied.
pub struct Layered {
    middleware: Arc<dyn LanguageModelMiddleware>,
    inner: Arc<dyn LanguageModel>,
}

impl Layered {
    pub fn new(middleware: Arc<dyn LanguageModelMiddleware>, inner: Arc<dyn LanguageModel>) -> Self {
        Self { middleware, inner }
    }

    /// Name of the applied middleware.
    pub fn middleware_name(&self) -> &str {
        self.middleware.name()
    }
}

#[async_trait]
impl LanguageModel for Layered {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn do_generate(&self, params: &CallParameters) -> Result<GenerateResult> {
        self.middleware.wrap_generate(params, &self.inner).await
    }

    async fn do_stream(&self, params: &CallParameters) -> Result<StreamResult> {
        self.middleware.wrap_stream(params, &self.inner).await
    }
}

/// Wrap `model` in `middlewares`, first element outermost.
///
/// An empty list returns the model unchanged.
pub fn wrap_model(
    model: Arc<dyn LanguageModel>,
    middlewares: Vec<Arc<dyn LanguageModelMiddleware>>,
) -> Arc<dyn LanguageModel> {
    middlewares
        .into_iter()
        .rev()
        .fold(model, |inner, middleware| {
            Arc::new(Layered::new(middleware, inner)) as Arc<dyn LanguageModel>
        })
}
