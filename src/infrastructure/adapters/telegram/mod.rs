//! Telegram adapter

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::application::messaging::MessageDispatcher;
use crate::domain::entities::{
    ChatRef, Component, FileSource, ImageSource, Message as ChatMessage, User as ChatUser,
};
use crate::domain::traits::{Bot, BotInfo};

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMember {
    user: User,
}

impl User {
    /// First and last name, falling back to the username
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.username.clone().unwrap_or_default()
        } else {
            full
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct MessageResult {
    message_id: i64,
}

/// Telegram bot adapter using long polling
pub struct TelegramAdapter {
    token: String,
    client: Client,
    info: BotInfo,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: Client::new(),
            info: BotInfo {
                id: "unknown".to_string(),
                name: "plugbot".to_string(),
                username: "plugbot".to_string(),
                platform: "telegram".to_string(),
            },
        }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BotError> {
        let status = response.status();
        let data: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        match data.result {
            Some(result) if data.ok => Ok(result),
            _ => Err(BotError::Network(format!(
                "Telegram API error {}: {}",
                status,
                data.description.unwrap_or_default()
            ))),
        }
    }

    /// Fetch bot info from Telegram API
    pub async fn fetch_bot_info(&mut self) -> Result<(), BotError> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let me: User = Self::read_response(response).await?;
        self.info = BotInfo {
            id: me.id.to_string(),
            name: me.first_name.unwrap_or_else(|| "plugbot".to_string()),
            username: me.username.unwrap_or_default(),
            platform: "telegram".to_string(),
        };

        Ok(())
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64, timeout: i64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: i64,
            allowed_updates: Vec<String>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout,
            allowed_updates: vec!["message".to_string()],
        };

        let response = self
            .client
            .post(self.api_url("getUpdates"))
            .timeout(Duration::from_secs(timeout.max(0) as u64 + 10))
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        Self::read_response(response).await
    }

    /// POST a JSON body to `method` and decode its result
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, BotError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;
        Self::read_response(response).await
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update]) -> Option<i64> {
        updates.iter().map(|u| u.update_id + 1).max()
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest<'a> {
            chat_id: &'a str,
            text: &'a str,
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let sent: MessageResult = Self::read_response(response).await?;
        Ok(sent.message_id.to_string())
    }

    async fn send_photo_url(&self, chat_id: &str, url: &str) -> Result<String, BotError> {
        #[derive(Serialize)]
        struct SendPhotoRequest<'a> {
            chat_id: &'a str,
            photo: &'a str,
        }

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .json(&SendPhotoRequest { chat_id, photo: url })
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let sent: MessageResult = Self::read_response(response).await?;
        Ok(sent.message_id.to_string())
    }

    /// Upload raw bytes with `sendPhoto` or `sendDocument`
    async fn upload(
        &self,
        method: &str,
        field: &str,
        chat_id: &str,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<String, BotError> {
        let size = bytes.len();
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field.to_string(), Part::bytes(bytes).file_name(file_name.clone()));

        tracing::debug!(method, file = %file_name, size, "uploading");
        let response = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let sent: MessageResult = Self::read_response(response).await?;
        Ok(sent.message_id.to_string())
    }

    async fn send_image(&self, chat_id: &str, source: &ImageSource) -> Result<String, BotError> {
        match source {
            ImageSource::Url(url) => self.send_photo_url(chat_id, url).await,
            ImageSource::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image.jpg".to_string());
                self.upload("sendPhoto", "photo", chat_id, name, bytes).await
            }
            ImageSource::Base64(data) => {
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|e| BotError::Parse(format!("invalid base64 image: {}", e)))?;
                self.upload("sendPhoto", "photo", chat_id, "image.jpg".to_string(), bytes)
                    .await
            }
        }
    }

    async fn send_file(&self, chat_id: &str, name: &str, source: &FileSource) -> Result<String, BotError> {
        match source {
            FileSource::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                self.upload("sendDocument", "document", chat_id, name.to_string(), bytes)
                    .await
            }
            FileSource::Url(url) => {
                #[derive(Serialize)]
                struct SendDocumentRequest<'a> {
                    chat_id: &'a str,
                    document: &'a str,
                }

                let response = self
                    .client
                    .post(self.api_url("sendDocument"))
                    .json(&SendDocumentRequest { chat_id, document: url })
                    .send()
                    .await
                    .map_err(|e| BotError::Network(e.to_string()))?;
                let sent: MessageResult = Self::read_response(response).await?;
                Ok(sent.message_id.to_string())
            }
        }
    }

    /// Poll for updates until `shutdown` fires, dispatching each message on its own task
    pub async fn run(
        self: Arc<Self>,
        dispatcher: Arc<MessageDispatcher>,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        tracing::info!(username = %self.info.username, "Telegram bot started");
        let mut offset: i64 = 0;

        loop {
            let updates = tokio::select! {
                _ = shutdown.cancelled() => break,
                updates = self.get_updates(offset, 30) => updates,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to get updates");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
                    }
                }
            };

            if let Some(next) = Self::get_next_offset(&updates) {
                offset = next;
            }

            for update in updates {
                let Some(msg) = update.message.as_ref() else {
                    continue;
                };
                let Some(message) = convert_message(msg, &self.info) else {
                    continue;
                };

                dispatcher.spawn(message, self.clone());
            }
        }

        tracing::info!("Telegram bot stopped");
        Ok(())
    }
}

/// Convert a Telegram message into a chat message; group chats have negative ids
pub fn convert_message(msg: &Message, info: &BotInfo) -> Option<ChatMessage> {
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }

    let mut text = msg.text.clone().or_else(|| msg.caption.clone())?;
    let is_group = msg.chat.id < 0;
    if is_group && !info.username.is_empty() && !text.starts_with('/') {
        let mention = format!("@{}", info.username);
        text = text.replace(&mention, "").trim().to_string();
    }
    if text.trim().is_empty() {
        return None;
    }

    let chat = if is_group {
        ChatRef::group(msg.chat.id.to_string())
    } else {
        ChatRef::private(msg.chat.id.to_string())
    };

    let mut sender = ChatUser::new(from.id.to_string());
    if let Some(username) = &from.username {
        sender = sender.with_username(username.clone());
    }
    if let Some(first) = &from.first_name {
        sender = sender.with_name(first.clone(), from.last_name.clone());
    }

    Some(
        ChatMessage::new(chat, vec![Component::Text(text)])
            .with_id(msg.message_id.to_string())
            .with_sender(sender)
            .with_self_id(info.id.clone())
            .with_platform("telegram"),
    )
}

/// Render text-like components; media is sent separately
fn render_text(component: &Component, out: &mut String) {
    match component {
        Component::Text(t) => out.push_str(t),
        Component::At { user_id } => {
            out.push('@');
            out.push_str(user_id);
        }
        Component::Reply { chain, .. } => {
            for c in chain {
                render_text(c, out);
            }
        }
        Component::Face { .. } | Component::Poke { .. } => {}
        Component::Image(_) | Component::File { .. } | Component::Nodes(_) => {}
    }
}

#[async_trait]
impl Bot for TelegramAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!(username = %self.info.username, "Starting Telegram bot");
        Ok(())
    }

    async fn send_chain(&self, chat: &ChatRef, chain: &[Component]) -> Result<String, BotError> {
        let chat_id = chat.id();
        let mut last_id = String::new();
        let mut text = String::new();

        // Flatten node groups into one sequence of bubbles
        let mut pending: Vec<&Component> = Vec::new();
        for component in chain {
            match component {
                Component::Nodes(nodes) => pending.extend(nodes.iter().flat_map(|n| n.chain.iter())),
                other => pending.push(other),
            }
        }

        for component in pending {
            match component {
                Component::Image(source) => {
                    if !text.trim().is_empty() {
                        last_id = self.send_text(chat_id, &text).await?;
                    }
                    text.clear();
                    last_id = self.send_image(chat_id, source).await?;
                }
                Component::File { name, source } => {
                    if !text.trim().is_empty() {
                        last_id = self.send_text(chat_id, &text).await?;
                    }
                    text.clear();
                    last_id = self.send_file(chat_id, name, source).await?;
                }
                other => render_text(other, &mut text),
            }
        }

        if !text.trim().is_empty() {
            last_id = self.send_text(chat_id, &text).await?;
        }
        Ok(last_id)
    }

    async fn user_name(&self, user_id: &str, group_id: Option<&str>) -> Result<String, BotError> {
        let name = match group_id {
            Some(group_id) => {
                let member: ChatMember = self
                    .call("getChatMember", &serde_json::json!({ "chat_id": group_id, "user_id": user_id }))
                    .await?;
                member.user.display_name()
            }
            None => {
                let chat: Chat = self.call("getChat", &serde_json::json!({ "chat_id": user_id })).await?;
                chat.first_name.or(chat.username).unwrap_or_default()
            }
        };
        Ok(name)
    }

    async fn group_name(&self, group_id: &str) -> Result<String, BotError> {
        let chat: Chat = self.call("getChat", &serde_json::json!({ "chat_id": group_id })).await?;
        Ok(chat.title.unwrap_or_default())
    }

    async fn leave_group(&self, group_id: &str) -> Result<(), BotError> {
        let left: bool = self.call("leaveChat", &serde_json::json!({ "chat_id": group_id })).await?;
        if !left {
            return Err(BotError::Rejected(format!("leaveChat refused for {}", group_id)));
        }
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> BotInfo {
        BotInfo {
            id: "99".into(),
            name: "plugbot".into(),
            username: "plug_bot".into(),
            platform: "telegram".into(),
        }
    }

    fn update(json: &str) -> Message {
        let update: Update = serde_json::from_str(json).unwrap();
        update.message.unwrap()
    }

    #[test]
    fn test_group_message_strips_mention() {
        let msg = update(
            r#"{"update_id":1,"message":{"message_id":5,"from":{"id":7,"is_bot":false,"username":"alice","first_name":"Alice"},"chat":{"id":-100},"text":"@plug_bot hello"}}"#,
        );
        let message = convert_message(&msg, &info()).unwrap();
        assert_eq!(message.chat, ChatRef::group("-100"));
        assert_eq!(message.plain_text(), "hello");
        assert_eq!(message.sender_id(), "7");
        assert_eq!(message.self_id, "99");
    }

    #[test]
    fn test_private_command_and_skips() {
        let msg = update(
            r#"{"update_id":2,"message":{"message_id":6,"from":{"id":7},"chat":{"id":7},"text":"/jm 123"}}"#,
        );
        let message = convert_message(&msg, &info()).unwrap();
        assert_eq!(message.chat, ChatRef::private("7"));

        let bot = update(r#"{"update_id":3,"message":{"message_id":7,"from":{"id":8,"is_bot":true},"chat":{"id":7},"text":"hi"}}"#);
        assert!(convert_message(&bot, &info()).is_none());

        let sticker = update(r#"{"update_id":4,"message":{"message_id":8,"from":{"id":7},"chat":{"id":7}}}"#);
        assert!(convert_message(&sticker, &info()).is_none());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let user: User = serde_json::from_str(r#"{"id":1,"first_name":"Ada","last_name":"Lovelace"}"#).unwrap();
        assert_eq!(user.display_name(), "Ada Lovelace");
        let user: User = serde_json::from_str(r#"{"id":2,"username":"ada"}"#).unwrap();
        assert_eq!(user.display_name(), "ada");
    }

    #[test]
    fn test_next_offset() {
        let updates: Vec<Update> =
            serde_json::from_str(r#"[{"update_id":10},{"update_id":12}]"#).unwrap();
        assert_eq!(TelegramAdapter::get_next_offset(&updates), Some(13));
        assert_eq!(TelegramAdapter::get_next_offset(&[]), None);
    }

    #[test]
    fn test_render_text_flattens_reply() {
        let mut out = String::new();
        for c in [
            Component::Reply {
                id: "1".into(),
                chain: vec![Component::text("quoted ")],
            },
            Component::at("5"),
            Component::Face { id: 2 },
            Component::text(" hi"),
        ] {
            render_text(&c, &mut out);
        }
        assert_eq!(out, "quoted @5 hi");
    }
}
