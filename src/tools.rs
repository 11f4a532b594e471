//! Tool execution boundary.
//!
//! The pipeline does not run tools itself. A [`ToolExecutor`] validates a
//! model's tool call against the tool's schema, hands it to a
//! [`ToolDispatcher`], and returns a [`ToolExecution`] record that the
//! caller persists however it likes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{Message, ToolCall, ToolDefinition};
use crate::{MuninnError, Result};

/// Checks tool arguments against the tool's parameter schema.
pub trait ToolValidator: Send + Sync {
    /// `Err(MuninnError::ToolValidation)` when `params` do not fit `schema`.
    fn validate(&self, schema: &Value, params: &Value) -> Result<()>;
}

/// Runs a validated tool call.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, category: &str, name: &str, params: Value) -> Result<Value>;
}

/// Minimal schema check: an object schema's arguments must be an object
/// containing every `required` property, and no property outside
/// `properties` when `additionalProperties` is `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldsValidator;

impl ToolValidator for RequiredFieldsValidator {
    fn validate(&self, schema: &Value, params: &Value) -> Result<()> {
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Ok(());
        }
        let Some(args) = params.as_object() else {
            return Err(MuninnError::ToolValidation(
                "arguments must be a JSON object".to_string(),
            ));
        };

        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);
        for field in required {
            if !args.contains_key(field) {
                return Err(MuninnError::ToolValidation(format!(
                    "missing required field '{field}'"
                )));
            }
        }

        if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
            let properties = schema.get("properties").and_then(Value::as_object);
            if let Some(extra) = args
                .keys()
                .find(|key| !properties.is_some_and(|p| p.contains_key(*key)))
            {
                return Err(MuninnError::ToolValidation(format!(
                    "unexpected field '{extra}'"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    /// Arguments failed to parse or validate; the tool never ran.
    Rejected,
    /// The dispatcher returned an error.
    Failed,
}

/// Record of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: Uuid,
    /// Id of the model's tool call this answers.
    pub call_id: String,
    pub category: String,
    pub name: String,
    pub duration: Duration,
    pub status: ExecutionStatus,
    /// Tool output on success, `{"error": ...}` otherwise.
    pub output: Value,
}

impl ToolExecution {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Tool-result message to send back to the model.
    pub fn to_message(&self) -> Message {
        Message::tool_result(self.call_id.clone(), self.output.to_string())
    }
}

/// Validates then dispatches tool calls.
#[derive(Clone)]
pub struct ToolExecutor {
    validator: Arc<dyn ToolValidator>,
    dispatcher: Arc<dyn ToolDispatcher>,
}

impl ToolExecutor {
    pub fn new(validator: Arc<dyn ToolValidator>, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            validator,
            dispatcher,
        }
    }

    /// Executor using [`RequiredFieldsValidator`].
    pub fn with_dispatcher(dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self::new(Arc::new(RequiredFieldsValidator), dispatcher)
    }

    /// Execute `call` against `tool`.
    ///
    /// Never fails: rejected arguments and dispatcher errors are reported
    /// in the returned record.
    pub async fn execute(&self, category: &str, tool: &ToolDefinition, call: &ToolCall) -> ToolExecution {
        let id = Uuid::new_v4();
        let start = Instant::now();

        let outcome = match self.prepare(tool, call) {
            Ok(params) => self
                .dispatcher
                .dispatch(category, &call.name, params)
                .await
                .map_err(|e| (ExecutionStatus::Failed, e)),
            Err(e) => Err((ExecutionStatus::Rejected, e)),
        };
        let duration = start.elapsed();

        let (status, output) = match outcome {
            Ok(output) => {
                debug!(%id, category, tool = %call.name, ?duration, "tool executed");
                (ExecutionStatus::Success, output)
            }
            Err((status, error)) => {
                warn!(%id, category, tool = %call.name, ?status, %error, "tool execution failed");
                (status, serde_json::json!({ "error": error.to_string() }))
            }
        };

        ToolExecution {
            id,
            call_id: call.id.clone(),
            category: category.to_string(),
            name: call.name.clone(),
            duration,
            status,
            output,
        }
    }

    fn prepare(&self, tool: &ToolDefinition, call: &ToolCall) -> Result<Value> {
        if tool.name != call.name {
            return Err(MuninnError::ToolValidation(format!(
                "call for '{}' does not match tool '{}'",
                call.name, tool.name
            )));
        }
        let params: Value = if call.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            call.parse_arguments()
                .map_err(|e| MuninnError::ToolValidation(format!("arguments are not JSON: {e}")))?
        };
        self.validator.validate(&tool.parameters, &params)?;
        Ok(params)
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(
            RequiredFieldsValidator
                .validate(&schema(), &json!({"city": "Oslo"}))
                .is_ok()
        );
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = RequiredFieldsValidator
            .validate(&schema(), &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("city"));
    }

    #[test]
    fn rejects_unexpected_field() {
        let err = RequiredFieldsValidator
            .validate(&schema(), &json!({"city": "Oslo", "units": "c"}))
            .unwrap_err();
        assert!(err.to_string().contains("units"));
    }

    #[test]
    fn rejects_non_object_arguments() {
        assert!(RequiredFieldsValidator.validate(&schema(), &json!([1])).is_err());
    }

    #[test]
    fn non_object_schema_is_unchecked() {
        assert!(
            RequiredFieldsValidator
                .validate(&json!({"type": "string"}), &json!(3))
                .is_ok()
        );
    }
}
