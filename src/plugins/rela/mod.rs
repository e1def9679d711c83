//! Friend and group relationship management
//!
//! Admin commands list, leave and answer requests; account notices are
//! reported to the manage group (or the admins privately) and enforce the
//! group blacklist, the group cap and the mutual blacklist.

mod blacklist;
mod commands;
mod events;

pub use blacklist::GroupBlacklist;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::errors::{BotError, CommandError};
use crate::domain::entities::{ChatRef, Command, Component, Message, Node};
use crate::domain::traits::Bot;
use crate::infrastructure::config::RelaConfig;
use crate::plugins::trait_def::Plugin;

pub const PLUGIN_NAME: &str = "rela";

/// Messages fetched by `抽查` when no count is given
pub const DEFAULT_CHECK_COUNT: usize = 20;

/// [`RelaConfig`] resolved against the bot's admin list
#[derive(Debug, Clone)]
pub struct RelaSettings {
    pub manage_group: Option<String>,
    pub admins: Vec<String>,
    pub max_ban_duration: u64,
    pub mutual_blacklist: Vec<String>,
    pub max_group_capacity: usize,
    pub auto_check_messages: bool,
    pub new_group_check_delay: Duration,
    /// Set only when auto-approve is enabled with a non-empty keyword
    pub auto_approve_keyword: Option<String>,
    /// Pause between announcing a departure and leaving
    pub leave_delay: Duration,
}

impl RelaSettings {
    pub fn from_config(config: &RelaConfig, admins: &[String]) -> Self {
        let manage_group = Some(config.manage_group.trim())
            .filter(|g| !g.is_empty())
            .map(String::from);
        let auto_approve_keyword = Some(config.auto_approve_keyword.trim())
            .filter(|k| config.enable_auto_approve && !k.is_empty())
            .map(String::from);

        Self {
            manage_group,
            admins: admins.iter().filter(|a| !a.is_empty()).cloned().collect(),
            max_ban_duration: config.max_ban_duration,
            mutual_blacklist: config.mutual_blacklist.clone(),
            max_group_capacity: config.max_group_capacity,
            auto_check_messages: config.auto_check_messages,
            new_group_check_delay: Duration::from_secs(config.new_group_check_delay),
            auto_approve_keyword,
            leave_delay: Duration::from_secs(3),
        }
    }
}

/// Human duration such as `1天2小时3秒`; zero units are skipped
pub fn format_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "未知时长".to_string();
    }
    if seconds == 0 {
        return "0秒".to_string();
    }
    let units = [
        (seconds / 86400, "天"),
        (seconds % 86400 / 3600, "小时"),
        (seconds % 3600 / 60, "分钟"),
        (seconds % 60, "秒"),
    ];
    units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, label)| format!("{}{}", value, label))
        .collect()
}

fn format_secs(seconds: u64) -> String {
    format_duration(i64::try_from(seconds).unwrap_or(i64::MAX))
}

pub struct RelaPlugin {
    settings: RelaSettings,
    blacklist: GroupBlacklist,
    shutdown: CancellationToken,
}

impl RelaPlugin {
    /// `shutdown` cuts short the delayed check of a newly joined group
    pub fn new(settings: RelaSettings, blacklist: GroupBlacklist, shutdown: CancellationToken) -> Self {
        Self {
            settings,
            blacklist,
            shutdown,
        }
    }

    pub fn blacklist(&self) -> &GroupBlacklist {
        &self.blacklist
    }

    /// Report to the manage group, or to every admin when it is unset or unreachable
    async fn send_reply(&self, bot: &dyn Bot, text: &str) {
        if let Some(group_id) = &self.settings.manage_group {
            match bot.send_message(&ChatRef::group(group_id), text).await {
                Ok(_) => return,
                Err(e) => tracing::error!(group = %group_id, error = %e, "cannot reach manage group"),
            }
        }
        for admin in &self.settings.admins {
            if let Err(e) = bot.send_message(&ChatRef::private(admin), text).await {
                tracing::error!(admin = %admin, error = %e, "cannot reach admin");
            }
        }
    }

    /// Forward the latest `count` messages of a group as nodes
    ///
    /// Goes to `reply_to` when given, otherwise where [`Self::send_reply`]
    /// would go. Returns false when the group has no history.
    async fn check_messages(
        &self,
        bot: &dyn Bot,
        group_id: &str,
        count: usize,
        reply_to: Option<&ChatRef>,
    ) -> Result<bool, BotError> {
        let history = bot.message_history(&ChatRef::group(group_id), count).await?;
        if history.is_empty() {
            return Ok(false);
        }
        let nodes = history
            .into_iter()
            .map(|entry| Node::new(entry.chain).with_sender(entry.sender_id, entry.sender_name))
            .collect();
        let chain = [Component::Nodes(nodes)];

        match (reply_to, &self.settings.manage_group) {
            (Some(chat), _) => {
                bot.send_chain(chat, &chain).await?;
            }
            (None, Some(group_id)) => {
                bot.send_chain(&ChatRef::group(group_id), &chain).await?;
            }
            (None, None) => {
                for admin in &self.settings.admins {
                    bot.send_chain(&ChatRef::private(admin), &chain).await?;
                }
            }
        }
        Ok(true)
    }

    /// Check a group when auto-check is on; failures are only logged
    async fn auto_check(&self, bot: &dyn Bot, group_id: &str) {
        if !self.settings.auto_check_messages {
            return;
        }
        if let Err(e) = self.check_messages(bot, group_id, DEFAULT_CHECK_COUNT, None).await {
            tracing::warn!(group = %group_id, error = %e, "message check failed");
        }
    }

    async fn leave_after_delay(&self, bot: &dyn Bot, group_id: &str) -> Result<(), BotError> {
        if !self.settings.leave_delay.is_zero() {
            tokio::time::sleep(self.settings.leave_delay).await;
        }
        tracing::info!(group = %group_id, "leaving group");
        bot.leave_group(group_id).await
    }

    async fn user_name(&self, bot: &dyn Bot, user_id: &str, group_id: Option<&str>, fallback: &str) -> String {
        match bot.user_name(user_id, group_id).await {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => fallback.to_string(),
            Err(e) => {
                tracing::debug!(user = %user_id, error = %e, "user name unavailable");
                fallback.to_string()
            }
        }
    }

    async fn group_name(&self, bot: &dyn Bot, group_id: &str) -> String {
        match bot.group_name(group_id).await {
            Ok(name) if !name.is_empty() => name,
            _ => "未知群名".to_string(),
        }
    }
}

#[async_trait]
impl Plugin for RelaPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn description(&self) -> &str {
        "人际关系管理"
    }

    fn commands(&self) -> Vec<Command> {
        let admin = |command: Command| command.with_plugin(PLUGIN_NAME).admin_only();
        vec![
            admin(Command::new("群列表").with_description("查看已加入的群聊")),
            admin(Command::new("好友列表").with_description("查看所有好友")),
            admin(
                Command::new("退群")
                    .with_description("退出指定群聊")
                    .with_usage("/退群 <群号>"),
            ),
            admin(
                Command::new("删了")
                    .with_aliases(vec!["删除好友".to_string()])
                    .with_description("删除好友")
                    .with_usage("/删了 @好友|<QQ号>"),
            ),
            admin(
                Command::new("同意")
                    .with_description("引用申请并同意，可附备注")
                    .with_usage("/同意 [备注]"),
            ),
            admin(
                Command::new("拒绝")
                    .with_description("引用申请并拒绝，可附理由")
                    .with_usage("/拒绝 [理由]"),
            ),
            admin(
                Command::new("抽查")
                    .with_description("转发群聊的最近消息")
                    .with_usage("/抽查 <群号> [条数]"),
            ),
        ]
    }

    async fn initialize(&self) -> Result<(), BotError> {
        let added = self.blacklist.load().await?;
        if added > 0 {
            tracing::info!(added, "group blacklist restored");
        }
        Ok(())
    }

    async fn handle_command(
        &self,
        name: &str,
        message: &Message,
        args: &[String],
        bot: &dyn Bot,
    ) -> Result<(), BotError> {
        let result = match name {
            "群列表" => self.show_groups(message, bot).await,
            "好友列表" => self.show_friends(message, bot).await,
            "退群" => self.leave_group(message, args, bot).await,
            "删了" => self.delete_friend(message, args, bot).await,
            "同意" => self.answer(message, args, bot, true).await,
            "拒绝" => self.answer(message, args, bot, false).await,
            "抽查" => self.check_group(message, args, bot).await,
            _ => return Err(CommandError::NotFound(name.to_string()).into()),
        };
        match result {
            Err(BotError::Unsupported(operation)) => {
                bot.send_message(&message.chat, &format!("当前平台不支持该操作：{}", operation))
                    .await?;
                Ok(())
            }
            other => other,
        }
    }

    async fn on_message(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        match &message.notice {
            Some(notice) => self.handle_notice(message, notice, bot).await,
            None => Ok(()),
        }
    }

    async fn terminate(&self) {
        tracing::debug!(blacklisted = self.blacklist.snapshot().len(), "rela stopped");
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("max-group-capacity".to_string(), self.settings.max_group_capacity.to_string()),
            ("auto-check".to_string(), self.settings.auto_check_messages.to_string()),
        ])
    }
}
