//! Builder for assembling pipelines

use std::sync::Arc;

use super::config::{PipelineConfig, RetryScope};
use crate::cache::{CacheConfig, CacheStore};
use crate::conversation::{
    ContentFilter, ContextInjection, ConversationChain, ConversationMiddleware, ErrorHandler,
};
use crate::middleware::{
    CachingMiddleware, DefaultSettings, DefaultSettingsMiddleware, ExtractReasoningMiddleware,
    LanguageModelMiddleware, LoggingConfig, LoggingMiddleware, ReasoningConfig, RetryMiddleware,
    SimulateStreamingMiddleware, wrap_model,
};
use crate::retry::RetryConfig;
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, GenerateResult};
use crate::Result;

/// A model wrapped in the configured middleware, plus the request/response
/// layer.
///
/// Cheap to clone; clones share the wrapped model and the cache store.
#[derive(Clone)]
pub struct Pipeline {
    model: Arc<dyn LanguageModel>,
    layers: Vec<Arc<dyn LanguageModelMiddleware>>,
    conversation: ConversationChain,
    cache: Option<Arc<CacheStore>>,
}

impl Pipeline {
    /// Create a new builder around `model`.
    pub fn builder(model: Arc<dyn LanguageModel>) -> PipelineBuilder {
        PipelineBuilder::new(model)
    }

    /// Build a pipeline from declarative configuration.
    ///
    /// When caching is enabled and no `store` is given, a store sized from
    /// the config is created. Disabled sections add nothing.
    pub fn from_config(
        model: Arc<dyn LanguageModel>,
        config: &PipelineConfig,
        store: Option<Arc<CacheStore>>,
    ) -> Result<Self> {
        let mut builder = PipelineBuilder::new(model);

        if config.logging.enabled {
            builder = builder.logging(config.logging.logging_config());
        }
        if config.error_handling.enabled {
            let retry = config.error_handling.retry_config();
            builder = match config.error_handling.scope {
                RetryScope::Model => builder.retry(retry),
                RetryScope::Conversation => builder.error_handler(retry),
            };
        }
        if let Some(defaults) = &config.default_settings {
            builder = builder.default_settings(defaults.clone());
        }
        if config.reasoning.enabled {
            builder = builder.reasoning(config.reasoning.reasoning_config());
        }
        if config.simulation.enabled {
            builder = builder.simulate_streaming();
        }
        if config.caching.enabled {
            let cache_config = config.caching.cache_config();
            let store =
                store.unwrap_or_else(|| Arc::new(CacheStore::from_config(&cache_config)));
            builder = builder.caching(store, cache_config);
        }
        if config.context_injection.enabled {
            builder = builder.context_injection(config.context_injection.context.clone());
        }
        if config.content_filtering.enabled {
            builder = builder.content_filter(ContentFilter::new(
                &config.content_filtering.patterns,
                &config.content_filtering.replacements,
            )?);
        }

        Ok(builder.build())
    }

    /// Non-streaming call through the full chain.
    ///
    /// `params.messages` pass through every `before_request`, the model call
    /// runs through the middleware stack, and the result passes through
    /// every `after_response`.
    pub async fn generate(&self, params: CallParameters) -> Result<GenerateResult> {
        let template = &params;
        self.conversation
            .execute(params.messages.clone(), |messages| {
                let call = CallParameters {
                    messages,
                    ..template.clone()
                };
                let model = self.model.clone();
                async move { model.do_generate(&call).await }
            })
            .await
    }

    /// Streaming call.
    ///
    /// Only `before_request` applies; response-level layers do not see
    /// individual events.
    pub async fn stream(&self, mut params: CallParameters) -> Result<StreamResult> {
        params.messages = self.conversation.prepare(params.messages).await?;
        self.model.do_stream(&params).await
    }

    /// The wrapped model. Calls on it skip the request/response layer.
    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Middleware names, outermost first.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub fn conversation(&self) -> &ConversationChain {
        &self.conversation
    }

    /// The cache store, when caching is enabled.
    pub fn cache_store(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model.name())
            .field("layers", &self.layer_names())
            .field("conversation", &self.conversation)
            .finish()
    }
}

/// Builder for [`Pipeline`].
///
/// Setters may be called in any order; [`build`](Self::build) always
/// composes the model layers outermost to innermost as logging, retry,
/// default settings, reasoning, simulated streaming, caching. The
/// request/response layer is error handler, context injection, content
/// filter, then any custom layers in the order added.
pub struct PipelineBuilder {
    model: Arc<dyn LanguageModel>,
    logging: Option<LoggingConfig>,
    retry: Option<RetryConfig>,
    default_settings: Option<DefaultSettings>,
    reasoning: Option<ReasoningConfig>,
    simulate_streaming: bool,
    caching: Option<(Arc<CacheStore>, CacheConfig)>,
    error_handler: Option<RetryConfig>,
    context_injection: Option<String>,
    content_filter: Option<ContentFilter>,
    conversation_layers: Vec<Arc<dyn ConversationMiddleware>>,
}

impl PipelineBuilder {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            logging: None,
            retry: None,
            default_settings: None,
            reasoning: None,
            simulate_streaming: false,
            caching: None,
            error_handler: None,
            context_injection: None,
            content_filter: None,
            conversation_layers: Vec::new(),
        }
    }

    /// Log every call and record request metrics.
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Retry transient failures around the model call.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Fill unset call settings.
    pub fn default_settings(mut self, settings: DefaultSettings) -> Self {
        self.default_settings = Some(settings);
        self
    }

    /// Split tagged reasoning from visible text.
    pub fn reasoning(mut self, config: ReasoningConfig) -> Self {
        self.reasoning = Some(config);
        self
    }

    /// Serve streams from `generate`.
    pub fn simulate_streaming(mut self) -> Self {
        self.simulate_streaming = true;
        self
    }

    /// Cache responses in `store`.
    pub fn caching(mut self, store: Arc<CacheStore>, config: CacheConfig) -> Self {
        self.caching = Some((store, config));
        self
    }

    /// Retry rate-limited `generate` calls at the conversation level.
    pub fn error_handler(mut self, config: RetryConfig) -> Self {
        self.error_handler = Some(config);
        self
    }

    /// Add fixed context to the system prompt.
    pub fn context_injection(mut self, context: impl Into<String>) -> Self {
        self.context_injection = Some(context.into());
        self
    }

    /// Filter completed responses.
    pub fn content_filter(mut self, filter: ContentFilter) -> Self {
        self.content_filter = Some(filter);
        self
    }

    /// Append a custom request/response layer.
    pub fn conversation_layer(mut self, layer: Arc<dyn ConversationMiddleware>) -> Self {
        self.conversation_layers.push(layer);
        self
    }

    pub fn build(self) -> Pipeline {
        let mut layers: Vec<Arc<dyn LanguageModelMiddleware>> = Vec::new();
        if let Some(config) = self.logging {
            layers.push(Arc::new(LoggingMiddleware::new(config)));
        }
        if let Some(config) = self.retry {
            layers.push(Arc::new(RetryMiddleware::new(config)));
        }
        if let Some(settings) = self.default_settings {
            layers.push(Arc::new(DefaultSettingsMiddleware::new(settings)));
        }
        if let Some(config) = self.reasoning {
            layers.push(Arc::new(ExtractReasoningMiddleware::new(config)));
        }
        if self.simulate_streaming {
            layers.push(Arc::new(SimulateStreamingMiddleware::new()));
        }
        let cache = match self.caching {
            Some((store, config)) => {
                layers.push(Arc::new(CachingMiddleware::new(store.clone(), config)));
                Some(store)
            }
            None => None,
        };

        let mut conversation = ConversationChain::new();
        if let Some(config) = self.error_handler {
            conversation = conversation.layer(Arc::new(ErrorHandler::new(config)));
        }
        if let Some(context) = self.context_injection {
            conversation = conversation.layer(Arc::new(ContextInjection::new(context)));
        }
        if let Some(filter) = self.content_filter {
            conversation = conversation.layer(Arc::new(filter));
        }
        for layer in self.conversation_layers {
            conversation = conversation.layer(layer);
        }

        Pipeline {
            model: wrap_model(self.model, layers.clone()),
            layers,
            conversation,
            cache,
        }
    }
}
