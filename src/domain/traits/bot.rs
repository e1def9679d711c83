use async_trait::async_trait;
use crate::domain::entities::{ChatRef, Component, FriendInfo, GroupInfo, HistoryEntry, LikeRecord};
use crate::application::errors::BotError;

/// Bot trait - abstraction for messaging platform adapters
///
/// Only sending is mandatory. Account operations default to
/// [`BotError::Unsupported`] so plugins can tell the user instead of failing.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Start the bot and begin listening for messages
    async fn start(&self) -> Result<(), BotError>;

    /// Send a message chain to a chat, returning the platform message id
    async fn send_chain(&self, chat: &ChatRef, chain: &[Component]) -> Result<String, BotError>;

    /// Send a plain text message to a chat
    async fn send_message(&self, chat: &ChatRef, text: &str) -> Result<String, BotError> {
        self.send_chain(chat, &[Component::text(text)]).await
    }

    /// Poke a user, inside `chat` when it is a group
    async fn poke(&self, chat: &ChatRef, user_id: &str) -> Result<(), BotError> {
        let _ = (chat, user_id);
        Err(BotError::Unsupported("poke".to_string()))
    }

    /// Display name of a user, preferring their card in `group_id`
    async fn user_name(&self, user_id: &str, group_id: Option<&str>) -> Result<String, BotError> {
        let _ = (user_id, group_id);
        Err(BotError::Unsupported("user_name".to_string()))
    }

    async fn group_name(&self, group_id: &str) -> Result<String, BotError> {
        let _ = group_id;
        Err(BotError::Unsupported("group_name".to_string()))
    }

    /// Groups the bot has joined
    async fn group_list(&self) -> Result<Vec<GroupInfo>, BotError> {
        Err(BotError::Unsupported("group_list".to_string()))
    }

    async fn friend_list(&self) -> Result<Vec<FriendInfo>, BotError> {
        Err(BotError::Unsupported("friend_list".to_string()))
    }

    /// Ids of every member of a group
    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, BotError> {
        let _ = group_id;
        Err(BotError::Unsupported("group_members".to_string()))
    }

    async fn leave_group(&self, group_id: &str) -> Result<(), BotError> {
        let _ = group_id;
        Err(BotError::Unsupported("leave_group".to_string()))
    }

    async fn delete_friend(&self, user_id: &str) -> Result<(), BotError> {
        let _ = user_id;
        Err(BotError::Unsupported("delete_friend".to_string()))
    }

    /// Accept or decline a friend request, optionally naming the new friend
    async fn answer_friend_request(&self, flag: &str, approve: bool, remark: &str) -> Result<(), BotError> {
        let _ = (flag, approve, remark);
        Err(BotError::Unsupported("answer_friend_request".to_string()))
    }

    /// Accept or decline a group invitation, with an optional reason
    async fn answer_group_invite(&self, flag: &str, approve: bool, reason: &str) -> Result<(), BotError> {
        let _ = (flag, approve, reason);
        Err(BotError::Unsupported("answer_group_invite".to_string()))
    }

    /// The latest `count` messages of a chat, oldest first
    async fn message_history(&self, chat: &ChatRef, count: usize) -> Result<Vec<HistoryEntry>, BotError> {
        let _ = (chat, count);
        Err(BotError::Unsupported("message_history".to_string()))
    }

    /// Like a user's profile `times` times
    ///
    /// A refusal by the platform (daily limit, privacy) is [`BotError::Rejected`].
    async fn send_like(&self, user_id: &str, times: u32) -> Result<(), BotError> {
        let _ = (user_id, times);
        Err(BotError::Unsupported("send_like".to_string()))
    }

    /// Users who liked the bot's own profile
    async fn profile_likes(&self) -> Result<Vec<LikeRecord>, BotError> {
        Err(BotError::Unsupported("profile_likes".to_string()))
    }

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
    pub username: String,
    /// Platform name reported to plugins (e.g. `telegram`, `console`)
    pub platform: String,
}
