//! Frames exchanged with the gscore core

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content item; `data` is a string except for `node` lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl GsMessage {
    pub fn new(kind: &str, data: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            data: Value::String(data.into()),
        }
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    /// `data` as text; numbers are rendered, anything else is `None`
    pub fn data_str(&self) -> Option<String> {
        match &self.data {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Empty strings, empty lists and null carry nothing
    pub fn is_empty(&self) -> bool {
        match &self.data {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub nickname: String,
    pub avatar: String,
}

/// Bot → core: a message a user sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceive {
    pub bot_id: String,
    pub bot_self_id: String,
    pub msg_id: String,
    /// `group` or `direct`
    pub user_type: String,
    pub group_id: Option<String>,
    pub user_id: String,
    pub sender: Sender,
    pub content: Vec<GsMessage>,
    /// 1 for admins, 6 for everyone else
    pub user_pm: u8,
}

/// Core → bot: a reply (or a log line when `bot_id` is `AstrBot`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSend {
    pub bot_id: String,
    pub bot_self_id: String,
    pub msg_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub content: Option<Vec<GsMessage>>,
}
