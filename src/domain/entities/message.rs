use super::component::{plain_text, Component};
use super::{Notice, User};
use chrono::{DateTime, Utc};

/// The conversation a message belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Private { user_id: String },
    Group { group_id: String },
}

impl ChatRef {
    pub fn private(user_id: impl Into<String>) -> Self {
        ChatRef::Private { user_id: user_id.into() }
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        ChatRef::Group { group_id: group_id.into() }
    }

    /// Platform id of the conversation
    pub fn id(&self) -> &str {
        match self {
            ChatRef::Private { user_id } => user_id,
            ChatRef::Group { group_id } => group_id,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            ChatRef::Group { group_id } => Some(group_id),
            ChatRef::Private { .. } => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ChatRef::Group { .. })
    }
}

/// Message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Command { name: String, args: Vec<String> },
    Empty,
}

impl Content {
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Content::Command { .. })
    }
}

/// Represents an incoming message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub chat: ChatRef,
    pub sender: Option<User>,
    /// Id of the bot account that received the message
    pub self_id: String,
    pub content: Content,
    pub chain: Vec<Component>,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    /// Set when the message stands for an account event instead of chat
    pub notice: Option<Notice>,
    pub raw: Option<serde_json::Value>,
}

impl Message {
    pub fn new(chat: ChatRef, chain: Vec<Component>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat,
            sender: None,
            self_id: String::new(),
            content: Content::Empty,
            chain,
            timestamp: Utc::now(),
            platform: "unknown".to_string(),
            notice: None,
            raw: None,
        }
    }

    pub fn from_text(chat: ChatRef, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut msg = Self::new(chat, vec![Component::Text(text.clone())]);
        msg.content = Content::Text(text);
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender(mut self, user: User) -> Self {
        self.sender = Some(user);
        self
    }

    pub fn with_self_id(mut self, self_id: impl Into<String>) -> Self {
        self.self_id = self_id.into();
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Sender id, or an empty string for anonymous messages
    pub fn sender_id(&self) -> &str {
        self.sender.as_ref().map(|u| u.id.as_str()).unwrap_or("")
    }

    pub fn sender_is_admin(&self) -> bool {
        self.sender.as_ref().is_some_and(|u| u.is_admin)
    }

    /// Text of the chain with every other component dropped
    pub fn plain_text(&self) -> String {
        plain_text(&self.chain)
    }

    /// Ids of all mentioned users, in order
    pub fn mentions(&self) -> Vec<&str> {
        self.chain
            .iter()
            .filter_map(|c| match c {
                Component::At { user_id } => Some(user_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Target of the poke when the chain starts with a poke notice
    pub fn poke_target(&self) -> Option<&str> {
        match self.chain.first() {
            Some(Component::Poke { target_id }) => Some(target_id),
            _ => None,
        }
    }
}
