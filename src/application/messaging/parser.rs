//! Message parser - derives a message's content from its component chain

use crate::domain::entities::{Content, Message};

/// Classifies incoming messages as commands or plain text
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Fill in `message.content` from the text of its chain
    pub fn parse(&self, mut message: Message) -> Message {
        message.content = self.parse_text(&message.plain_text());
        message
    }

    pub fn parse_text(&self, text: &str) -> Content {
        let text = text.trim();
        if text.is_empty() {
            return Content::Empty;
        }

        // Either / or the custom prefix starts a command
        let body = text.strip_prefix('/').or_else(|| {
            if self.command_prefix.is_empty() {
                None
            } else {
                text.strip_prefix(self.command_prefix.as_str())
            }
        });
        let Some(body) = body else {
            return Content::Text(text.to_string());
        };

        let mut parts = body.split_whitespace();
        let Some(head) = parts.next() else {
            return Content::Text(text.to_string());
        };
        // Telegram appends the bot's username in groups: /jm@some_bot
        let name = head.split('@').next().unwrap_or(head).to_string();
        let args = parts.map(String::from).collect();

        Content::Command { name, args }
    }
}
