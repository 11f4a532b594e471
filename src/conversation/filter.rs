use async_trait::async_trait;
use regex::Regex;

use super::ConversationMiddleware;
use crate::types::GenerateResult;
use crate::{MuninnError, Result};

/// Replacement used when a pattern has no matching entry in `replacements`.
pub const DEFAULT_REPLACEMENT: &str = "***";

/// Pattern substitution over completed responses.
///
/// Patterns apply in order; pattern `i` is replaced with `replacements[i]`,
/// or [`DEFAULT_REPLACEMENT`] when the list is shorter. Reasoning text is
/// filtered the same way as the visible text.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    rules: Vec<(Regex, String)>,
}

impl ContentFilter {
    /// Compile the rules. Invalid patterns are a configuration error.
    pub fn new<P, R>(patterns: &[P], replacements: &[R]) -> Result<Self>
    where
        P: AsRef<str>,
        R: AsRef<str>,
    {
        let rules = patterns
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                let regex = Regex::new(pattern.as_ref()).map_err(|e| {
                    MuninnError::Configuration(format!(
                        "invalid content filter pattern {:?}: {e}",
                        pattern.as_ref()
                    ))
                })?;
                let replacement = replacements
                    .get(i)
                    .map_or(DEFAULT_REPLACEMENT, |r| r.as_ref())
                    .to_string();
                Ok((regex, replacement))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule to `text`.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (regex, replacement) in &self.rules {
            out = regex.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }
}

#[async_trait]
impl ConversationMiddleware for ContentFilter {
    fn name(&self) -> &str {
        "content-filter"
    }

    async fn after_response(&self, mut response: GenerateResult) -> Result<GenerateResult> {
        response.text = self.apply(&response.text);
        response.reasoning = response.reasoning.map(|r| self.apply(&r));
        Ok(response)
    }
}
