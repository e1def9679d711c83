//! Console adapter for development/testing
//!
//! Each stdin line becomes a message. A few lines are interpreted locally:
//! `:group <id>` and `:private` switch the simulated chat,
//! `:poke <user_id>` injects a poke notice aimed at that user, and
//! `:request <user_id> [comment]` / `:invite <group_id> <user_id>` inject a
//! friend request or group invitation.
//!
//! Account operations act on an in-memory roster of the groups seen so far.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::application::messaging::MessageDispatcher;
use crate::domain::entities::{
    ChatRef, Component, FileSource, FriendInfo, GroupInfo, HistoryEntry, ImageSource, LikeRecord, Message,
    Notice, User,
};
use crate::domain::traits::{Bot, BotInfo};

/// What a console line asks for
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleInput {
    SwitchChat(ChatRef),
    Poke(String),
    Notice(Notice),
    Text(String),
    Nothing,
}

pub fn parse_line(line: &str, user_id: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Nothing;
    }
    if line == ":private" {
        return ConsoleInput::SwitchChat(ChatRef::private(user_id));
    }
    if let Some(group) = line.strip_prefix(":group ") {
        return ConsoleInput::SwitchChat(ChatRef::group(group.trim()));
    }
    if let Some(target) = line.strip_prefix(":poke ") {
        return ConsoleInput::Poke(target.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix(":request ") {
        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let user_id = parts.next().unwrap_or_default().to_string();
        let comment = parts.next().unwrap_or_default().trim().to_string();
        return ConsoleInput::Notice(Notice::FriendRequest {
            flag: format!("console-friend-{}", user_id),
            user_id,
            comment,
        });
    }
    if let Some(rest) = line.strip_prefix(":invite ") {
        let mut parts = rest.split_whitespace();
        if let (Some(group_id), Some(user_id)) = (parts.next(), parts.next()) {
            return ConsoleInput::Notice(Notice::GroupInvite {
                user_id: user_id.to_string(),
                group_id: group_id.to_string(),
                comment: String::new(),
                flag: format!("console-group-{}", group_id),
            });
        }
    }
    ConsoleInput::Text(line.to_string())
}

/// Messages kept per console session for history lookups
const HISTORY_LIMIT: usize = 100;

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    user_id: String,
    chat: Mutex<ChatRef>,
    groups: Mutex<Vec<String>>,
    history: Mutex<Vec<(ChatRef, HistoryEntry)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConsoleAdapter {
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            info: BotInfo {
                id: "console".to_string(),
                name: "plugbot".to_string(),
                username: "console".to_string(),
                platform: "console".to_string(),
            },
            chat: Mutex::new(ChatRef::private(user_id.clone())),
            groups: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            user_id,
        }
    }

    fn current_chat(&self) -> ChatRef {
        lock(&self.chat).clone()
    }

    fn set_chat(&self, chat: ChatRef) {
        if let Some(group_id) = chat.group_id() {
            self.join(group_id);
        }
        *lock(&self.chat) = chat;
    }

    fn join(&self, group_id: &str) {
        let mut groups = lock(&self.groups);
        if !groups.iter().any(|g| g == group_id) {
            groups.push(group_id.to_string());
        }
    }

    fn remember(&self, chat: &ChatRef, chain: &[Component]) {
        let mut history = lock(&self.history);
        history.push((
            chat.clone(),
            HistoryEntry {
                sender_id: self.user_id.clone(),
                sender_name: "console".to_string(),
                chain: chain.to_vec(),
            },
        ));
        if history.len() > HISTORY_LIMIT {
            history.remove(0);
        }
    }

    /// Turn a console line into a message, or `None` when it was a local directive
    pub fn to_message(&self, line: &str) -> Option<Message> {
        let chain = match parse_line(line, &self.user_id) {
            ConsoleInput::Nothing => return None,
            ConsoleInput::SwitchChat(chat) => {
                println!("[console] now chatting in {:?}", chat);
                self.set_chat(chat);
                return None;
            }
            ConsoleInput::Poke(target) => vec![Component::Poke { target_id: target }],
            ConsoleInput::Notice(notice) => return Some(self.notice_message(notice)),
            ConsoleInput::Text(text) => vec![Component::Text(text)],
        };

        let chat = self.current_chat();
        self.remember(&chat, &chain);
        Some(
            Message::new(chat, chain)
                .with_sender(User::new(self.user_id.clone()).with_username("console"))
                .with_self_id(self.info.id.clone())
                .with_platform("console"),
        )
    }

    fn notice_message(&self, notice: Notice) -> Message {
        let (chat, sender) = match &notice {
            Notice::FriendRequest { user_id, .. } | Notice::GroupInvite { user_id, .. } => {
                (ChatRef::private(user_id.clone()), user_id.clone())
            }
            Notice::AdminChanged { group_id, .. } => (ChatRef::group(group_id.clone()), String::new()),
            Notice::Muted { group_id, operator_id, .. }
            | Notice::Kicked { group_id, operator_id }
            | Notice::Invited { group_id, operator_id } => (ChatRef::group(group_id.clone()), operator_id.clone()),
        };
        Message::new(chat, Vec::new())
            .with_sender(User::new(sender))
            .with_self_id(self.info.id.clone())
            .with_platform("console")
            .with_notice(notice)
    }

    /// Read stdin until EOF or `shutdown`, dispatching each message on its own task
    pub async fn run(
        self: Arc<Self>,
        dispatcher: Arc<MessageDispatcher>,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        println!(
            "plugbot console. Type a message, ':poke <id>', ':group <id>', ':private', \
             ':request <id> [comment]' or ':invite <group> <id>'."
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            let Some(message) = self.to_message(&line) else {
                continue;
            };

            dispatcher.spawn(message, self.clone());
        }
        Ok(())
    }
}

fn describe(component: &Component) -> String {
    match component {
        Component::Text(t) => t.clone(),
        Component::At { user_id } => format!("@{}", user_id),
        Component::Image(ImageSource::Url(url)) => format!("[image {}]", url),
        Component::Image(ImageSource::Path(path)) => format!("[image {}]", path.display()),
        Component::Image(ImageSource::Base64(data)) => format!("[image base64, {} chars]", data.len()),
        Component::File { name, source: FileSource::Path(path) } => {
            format!("[file {} at {}]", name, path.display())
        }
        Component::File { name, source: FileSource::Url(url) } => format!("[file {} at {}]", name, url),
        Component::Reply { id, .. } => format!("[reply to {}] ", id),
        Component::Nodes(nodes) => nodes
            .iter()
            .map(|n| {
                let body = n.chain.iter().map(describe).collect::<String>();
                match &n.sender {
                    Some((user_id, name)) => format!("{}({}): {}", name, user_id, body),
                    None => body,
                }
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
        Component::Face { id } => format!("[face {}]", id),
        Component::Poke { target_id } => format!("[poke {}]", target_id),
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!("Starting console bot (dev mode)");
        Ok(())
    }

    async fn send_chain(&self, chat: &ChatRef, chain: &[Component]) -> Result<String, BotError> {
        let text: String = chain.iter().map(describe).collect();
        println!("[BOT -> {}] {}", chat.id(), text);
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn poke(&self, chat: &ChatRef, user_id: &str) -> Result<(), BotError> {
        println!("[BOT -> {}] 👉 pokes {}", chat.id(), user_id);
        Ok(())
    }

    async fn user_name(&self, user_id: &str, _group_id: Option<&str>) -> Result<String, BotError> {
        Ok(user_id.to_string())
    }

    async fn group_name(&self, group_id: &str) -> Result<String, BotError> {
        Ok(format!("console group {}", group_id))
    }

    async fn group_list(&self) -> Result<Vec<GroupInfo>, BotError> {
        Ok(lock(&self.groups)
            .iter()
            .map(|id| GroupInfo {
                group_id: id.clone(),
                name: format!("console group {}", id),
            })
            .collect())
    }

    async fn friend_list(&self) -> Result<Vec<FriendInfo>, BotError> {
        Ok(vec![FriendInfo {
            user_id: self.user_id.clone(),
            nickname: "console".to_string(),
        }])
    }

    async fn group_members(&self, _group_id: &str) -> Result<Vec<String>, BotError> {
        Ok(vec![self.info.id.clone(), self.user_id.clone()])
    }

    async fn leave_group(&self, group_id: &str) -> Result<(), BotError> {
        lock(&self.groups).retain(|g| g != group_id);
        println!("[BOT] leaves group {}", group_id);
        Ok(())
    }

    async fn delete_friend(&self, user_id: &str) -> Result<(), BotError> {
        println!("[BOT] deletes friend {}", user_id);
        Ok(())
    }

    async fn answer_friend_request(&self, flag: &str, approve: bool, remark: &str) -> Result<(), BotError> {
        println!("[BOT] friend request {}: approve={} remark={:?}", flag, approve, remark);
        Ok(())
    }

    async fn answer_group_invite(&self, flag: &str, approve: bool, reason: &str) -> Result<(), BotError> {
        println!("[BOT] group invite {}: approve={} reason={:?}", flag, approve, reason);
        if approve {
            if let Some(group_id) = flag.strip_prefix("console-group-") {
                self.join(group_id);
            }
        }
        Ok(())
    }

    async fn message_history(&self, chat: &ChatRef, count: usize) -> Result<Vec<HistoryEntry>, BotError> {
        let history = lock(&self.history);
        let matching: Vec<HistoryEntry> = history
            .iter()
            .filter(|(c, _)| c == chat)
            .map(|(_, entry)| entry.clone())
            .collect();
        let skip = matching.len().saturating_sub(count);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn send_like(&self, user_id: &str, times: u32) -> Result<(), BotError> {
        println!("[BOT] likes {} x{}", user_id, times);
        Ok(())
    }

    async fn profile_likes(&self) -> Result<Vec<LikeRecord>, BotError> {
        Ok(Vec::new())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
