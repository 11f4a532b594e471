use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LanguageModelMiddleware;
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, GenerateResult};
use crate::Result;

/// Settings applied to calls that leave them unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Deep-merged under the call's own provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<serde_json::Value>,
}

impl DefaultSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn provider_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.provider_metadata = Some(metadata);
        self
    }

    /// Fill unset fields of `params`. Values set by the caller always win.
    pub fn apply(&self, params: &CallParameters) -> CallParameters {
        let mut params = params.clone();
        if params.temperature.is_none() {
            params.temperature = self.temperature;
        }
        if params.max_tokens.is_none() {
            params.max_tokens = self.max_tokens;
        }
        if let Some(defaults) = &self.provider_metadata {
            params.provider_metadata = Some(match params.provider_metadata.take() {
                Some(own) => merge_json(defaults.clone(), own),
                None => defaults.clone(),
            });
        }
        params
    }
}

/// Merge `overlay` onto `base`; objects merge key by key, anything else is replaced.
fn merge_json(base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Injects [`DefaultSettings`] before the call reaches inner layers.
pub struct DefaultSettingsMiddleware {
    settings: DefaultSettings,
}

impl DefaultSettingsMiddleware {
    pub fn new(settings: DefaultSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl LanguageModelMiddleware for DefaultSettingsMiddleware {
    fn name(&self) -> &str {
        "default-settings"
    }

    async fn wrap_generate(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<GenerateResult> {
        next.do_generate(&self.settings.apply(params)).await
    }

    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        next.do_stream(&self.settings.apply(params)).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Message;

    #[test]
    fn fills_only_unset_fields() {
        let defaults = DefaultSettings::new().temperature(0.2).max_tokens(256);
        let params = CallParameters::new(vec![Message::user("hi")]).temperature(0.9);
        let applied = defaults.apply(&params);
        assert_eq!(applied.temperature, Some(0.9));
        assert_eq!(applied.max_tokens, Some(256));
    }

    #[test]
    fn provider_metadata_deep_merges() {
        let defaults = DefaultSettings::new().provider_metadata(json!({
            "openai": {"user": "default", "store": false},
            "anthropic": {"cache": true}
        }));
        let params = CallParameters::default().provider_metadata(json!({
            "openai": {"user": "alice"}
        }));
        let applied = defaults.apply(&params);
        assert_eq!(
            applied.provider_metadata,
            Some(json!({
                "openai": {"user": "alice", "store": false},
                "anthropic": {"cache": true}
            }))
        );
    }

    #[test]
    fn non_object_overlay_replaces() {
        assert_eq!(merge_json(json!({"a": 1}), json!("x")), json!("x"));
    }
}
