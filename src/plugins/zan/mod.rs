//! Profile likes: `赞我` / `赞@某人`, and who liked the bot

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::application::errors::{BotError, CommandError};
use crate::domain::entities::{Command, Content, Message};
use crate::domain::traits::Bot;
use crate::infrastructure::config::ZanConfig;
use crate::plugins::trait_def::Plugin;

pub const PLUGIN_NAME: &str = "zan";

/// Likes per `send_like` call, and how many calls one request may make
const LIKES_PER_ROUND: u32 = 10;
const MAX_ROUNDS: u32 = 5;

/// Why the platform refused a like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    DailyLimit,
    Permission,
    Stranger,
}

impl Refusal {
    fn classify(reason: &str) -> Self {
        if reason.contains("已达") {
            Refusal::DailyLimit
        } else if reason.contains("权限") {
            Refusal::Permission
        } else {
            Refusal::Stranger
        }
    }
}

pub struct ZanPlugin {
    config: ZanConfig,
    rng: Mutex<StdRng>,
}

impl ZanPlugin {
    pub fn new(config: ZanConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic draws for tests
    pub fn with_seed(config: ZanConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ZanConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    fn pick(&self, list: &[String]) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        list.choose(&mut *rng).cloned().unwrap_or_default()
    }

    fn allowed_in(&self, message: &Message) -> bool {
        if !self.config.enable_white_list_groups {
            return true;
        }
        message
            .chat
            .group_id()
            .is_some_and(|id| self.config.white_list_groups.iter().any(|g| g == id))
    }

    /// Like one user as often as the platform allows and describe the result
    async fn like(&self, bot: &dyn Bot, user_id: &str) -> Result<String, BotError> {
        let username = match bot.user_name(user_id, None).await {
            Ok(name) if !name.is_empty() => name,
            _ => "未知用户".to_string(),
        };

        let mut total = 0;
        let mut refusal = None;
        for _ in 0..MAX_ROUNDS {
            match bot.send_like(user_id, LIKES_PER_ROUND).await {
                Ok(()) => total += LIKES_PER_ROUND,
                Err(BotError::Rejected(reason)) => {
                    tracing::debug!(user = %user_id, %reason, "like refused");
                    refusal = Some(Refusal::classify(&reason));
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(user = %user_id, total, "liked");

        let reply = if total > 0 {
            self.pick(&self.config.success_responses)
        } else {
            match refusal.unwrap_or(Refusal::Stranger) {
                Refusal::DailyLimit => self.pick(&self.config.limit_responses),
                Refusal::Permission => self.pick(&self.config.permission_responses),
                Refusal::Stranger => self.pick(&self.config.stranger_responses),
            }
        };
        Ok(reply
            .replace("{username}", &username)
            .replace("{total_likes}", &total.to_string()))
    }

    async fn show_profile_likes(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let records = bot.profile_likes().await?;
        let mut reply: String = records
            .iter()
            .filter(|r| !r.nickname.is_empty() && r.count > 0)
            .map(|r| format!("\n【{}】赞了我{}次", r.nickname, r.count))
            .collect();
        if reply.is_empty() {
            reply = "暂无有效的点赞信息".to_string();
        }
        bot.send_message(&message.chat, reply.trim_start()).await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for ZanPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn description(&self) -> &str {
        "发送 赞我 自动点赞"
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("谁赞了bot")
            .with_aliases(vec!["谁赞了你".to_string()])
            .with_description("查看谁给bot点了赞")
            .with_plugin(PLUGIN_NAME)
            .admin_only()]
    }

    async fn handle_command(
        &self,
        name: &str,
        message: &Message,
        _args: &[String],
        bot: &dyn Bot,
    ) -> Result<(), BotError> {
        match name {
            "谁赞了bot" => self.show_profile_likes(message, bot).await,
            _ => Err(CommandError::NotFound(name.to_string()).into()),
        }
    }

    async fn on_message(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let Content::Text(text) = &message.content else {
            return Ok(());
        };
        if !text.starts_with('赞') || !self.allowed_in(message) {
            return Ok(());
        }

        let targets: Vec<String> = if text == "赞我" {
            vec![message.sender_id().to_string()]
        } else {
            message
                .mentions()
                .into_iter()
                .filter(|id| *id != message.self_id)
                .map(String::from)
                .collect()
        };
        if targets.is_empty() || targets.iter().any(|t| t.is_empty()) {
            return Ok(());
        }

        let mut replies = Vec::with_capacity(targets.len());
        for target in &targets {
            replies.push(self.like(bot, target).await?);
        }
        let reply = replies.join("\n");
        let reply = reply.trim();
        if !reply.is_empty() {
            bot.send_message(&message.chat, reply).await?;
        }
        Ok(())
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([(
            "white-list".to_string(),
            self.config.enable_white_list_groups.to_string(),
        )])
    }
}
