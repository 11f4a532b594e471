use async_trait::async_trait;

use super::ConversationMiddleware;
use crate::Result;
use crate::types::Message;

/// Adds fixed context to the system prompt of every request.
///
/// Appended to a leading system message when the request has one,
/// otherwise inserted as a new system message at the front.
#[derive(Debug, Clone)]
pub struct ContextInjection {
    context: String,
}

impl ContextInjection {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn inject(&self, mut messages: Vec<Message>) -> Vec<Message> {
        if self.context.is_empty() {
            return messages;
        }
        match messages.first_mut() {
            Some(first) if first.is_system() => {
                if !first.content.is_empty() {
                    first.content.push_str("\n\n");
                }
                first.content.push_str(&self.context);
            }
            _ => messages.insert(0, Message::system(self.context.clone())),
        }
        messages
    }
}

#[async_trait]
impl ConversationMiddleware for ContextInjection {
    fn name(&self) -> &str {
        "context-injection"
    }

    async fn before_request(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        Ok(self.inject(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_leading_system_message() {
        let layer = ContextInjection::new("Today is Tuesday.");
        let out = layer.inject(vec![Message::system("Be brief."), Message::user("hi")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "Be brief.\n\nToday is Tuesday.");
    }

    #[test]
    fn prepends_when_no_system_message() {
        let layer = ContextInjection::new("ctx");
        let out = layer.inject(vec![Message::user("hi")]);
        assert_eq!(out, vec![Message::system("ctx"), Message::user("hi")]);
    }

    #[test]
    fn system_message_later_in_list_is_not_leading() {
        let layer = ContextInjection::new("ctx");
        let out = layer.inject(vec![Message::user("hi"), Message::system("late")]);
        assert_eq!(out[0], Message::system("ctx"));
        assert_eq!(out[2].content, "late");
    }

    #[test]
    fn empty_context_is_identity() {
        let layer = ContextInjection::new("");
        let input = vec![Message::user("hi")];
        assert_eq!(layer.inject(input.clone()), input);
    }
}
