use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::application::errors::BotError;
use crate::domain::entities::{ChatRef, Component, FriendInfo, GroupInfo, HistoryEntry, LikeRecord};
use crate::domain::traits::{Bot, BotInfo};

/// Bot that records everything plugins ask it to do
#[derive(Default)]
pub struct RecordingBot {
    pub sent: Mutex<Vec<(ChatRef, Vec<Component>)>>,
    pub pokes: Mutex<Vec<(ChatRef, String)>>,
    pub groups: Mutex<Vec<GroupInfo>>,
    pub friends: Mutex<Vec<FriendInfo>>,
    pub members: Mutex<HashMap<String, Vec<String>>>,
    pub names: Mutex<HashMap<String, String>>,
    pub history: Mutex<Vec<HistoryEntry>>,
    pub profile: Mutex<Vec<LikeRecord>>,
    /// Account actions in call order, e.g. `leave:1` or `friend:f1:true:remark`
    pub actions: Mutex<Vec<String>>,
    /// Successful `send_like` calls allowed before the refusal text is returned
    pub like_limit: Mutex<Option<(u32, String)>>,
    /// Chats whose sends fail
    pub unreachable: Mutex<Vec<ChatRef>>,
    pub refuse_answers: Mutex<bool>,
}

impl RecordingBot {
    pub fn with_groups(self, groups: &[(&str, &str)]) -> Self {
        *self.groups.lock().unwrap() = groups
            .iter()
            .map(|(id, name)| GroupInfo { group_id: id.to_string(), name: name.to_string() })
            .collect();
        self
    }

    pub fn with_friends(self, friends: &[(&str, &str)]) -> Self {
        *self.friends.lock().unwrap() = friends
            .iter()
            .map(|(id, name)| FriendInfo { user_id: id.to_string(), nickname: name.to_string() })
            .collect();
        self
    }

    pub fn with_name(self, user_id: &str, name: &str) -> Self {
        self.names.lock().unwrap().insert(user_id.to_string(), name.to_string());
        self
    }

    pub fn with_members(self, group_id: &str, members: &[&str]) -> Self {
        self.members
            .lock()
            .unwrap()
            .insert(group_id.to_string(), members.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn chains(&self) -> Vec<Vec<Component>> {
        self.sent.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.chains()
            .iter()
            .map(|chain| crate::domain::entities::component::plain_text(chain))
            .collect()
    }

    /// Texts sent to `chat`
    pub fn texts_to(&self, chat: &ChatRef) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == chat)
            .map(|(_, chain)| crate::domain::entities::component::plain_text(chain))
            .collect()
    }

    pub fn poked(&self) -> Vec<String> {
        self.pokes.lock().unwrap().iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }
}

#[async_trait]
impl Bot for RecordingBot {
    async fn start(&self) -> Result<(), BotError> {
        Ok(())
    }

    async fn send_chain(&self, chat: &ChatRef, chain: &[Component]) -> Result<String, BotError> {
        if self.unreachable.lock().unwrap().contains(chat) {
            return Err(BotError::Network(format!("cannot reach {}", chat.id())));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat.clone(), chain.to_vec()));
        Ok(sent.len().to_string())
    }

    async fn poke(&self, chat: &ChatRef, user_id: &str) -> Result<(), BotError> {
        self.pokes.lock().unwrap().push((chat.clone(), user_id.to_string()));
        Ok(())
    }

    async fn user_name(&self, user_id: &str, _group_id: Option<&str>) -> Result<String, BotError> {
        self.names
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| BotError::Internal(format!("no user {}", user_id)))
    }

    async fn group_name(&self, group_id: &str) -> Result<String, BotError> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.group_id == group_id)
            .map(|g| g.name.clone())
            .ok_or_else(|| BotError::Internal(format!("no group {}", group_id)))
    }

    async fn group_list(&self) -> Result<Vec<GroupInfo>, BotError> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn friend_list(&self) -> Result<Vec<FriendInfo>, BotError> {
        Ok(self.friends.lock().unwrap().clone())
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, BotError> {
        Ok(self.members.lock().unwrap().get(group_id).cloned().unwrap_or_default())
    }

    async fn leave_group(&self, group_id: &str) -> Result<(), BotError> {
        self.groups.lock().unwrap().retain(|g| g.group_id != group_id);
        self.record(format!("leave:{}", group_id));
        Ok(())
    }

    async fn delete_friend(&self, user_id: &str) -> Result<(), BotError> {
        self.friends.lock().unwrap().retain(|f| f.user_id != user_id);
        self.record(format!("delete:{}", user_id));
        Ok(())
    }

    async fn answer_friend_request(&self, flag: &str, approve: bool, remark: &str) -> Result<(), BotError> {
        if *self.refuse_answers.lock().unwrap() {
            return Err(BotError::Rejected("request expired".into()));
        }
        self.record(format!("friend:{}:{}:{}", flag, approve, remark));
        Ok(())
    }

    async fn answer_group_invite(&self, flag: &str, approve: bool, reason: &str) -> Result<(), BotError> {
        if *self.refuse_answers.lock().unwrap() {
            return Err(BotError::Rejected("request expired".into()));
        }
        self.record(format!("invite:{}:{}:{}", flag, approve, reason));
        Ok(())
    }

    async fn message_history(&self, _chat: &ChatRef, count: usize) -> Result<Vec<HistoryEntry>, BotError> {
        let history = self.history.lock().unwrap();
        let skip = history.len().saturating_sub(count);
        Ok(history[skip..].to_vec())
    }

    async fn send_like(&self, user_id: &str, times: u32) -> Result<(), BotError> {
        let mut limit = self.like_limit.lock().unwrap();
        if let Some((remaining, refusal)) = limit.as_mut() {
            if *remaining == 0 {
                return Err(BotError::Rejected(refusal.clone()));
            }
            *remaining -= 1;
        }
        drop(limit);
        self.record(format!("like:{}:{}", user_id, times));
        Ok(())
    }

    async fn profile_likes(&self) -> Result<Vec<LikeRecord>, BotError> {
        Ok(self.profile.lock().unwrap().clone())
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            id: "10000".into(),
            name: "plugbot".into(),
            username: "plugbot".into(),
            platform: "test".into(),
        }
    }
}
