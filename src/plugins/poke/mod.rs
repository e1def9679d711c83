//! Poke responses and the `戳` command

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::application::errors::{BotError, ConfigError};
use crate::domain::entities::{ChatRef, Command, Component, Message};
use crate::domain::traits::Bot;
use crate::infrastructure::config::PokeConfig;
use crate::plugins::trait_def::Plugin;

pub const PLUGIN_NAME: &str = "poke";

const LIST_SEPARATORS: &[char] = &[':', '：', ',', '，'];

/// Split a configured reply list, dropping blank entries
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// [`PokeConfig`] with its lists parsed
#[derive(Debug, Clone)]
pub struct PokeSettings {
    pub max_times: u32,
    pub interval: Duration,
    pub cooldown: Duration,
    pub follow_probability: f64,
    pub poke_back_probability: f64,
    pub text_reply_probability: f64,
    pub face_reply_probability: f64,
    pub poke_back_replies: Vec<String>,
    pub text_replies: Vec<String>,
    pub face_ids: Vec<i64>,
    pub poke_others_replies: Vec<String>,
    pub poke_me_replies: Vec<String>,
}

impl PokeSettings {
    pub fn from_config(config: &PokeConfig) -> Result<Self, ConfigError> {
        let face_ids = split_list(&config.face_ids)
            .iter()
            .map(|id| {
                id.parse::<i64>()
                    .map_err(|_| ConfigError::InvalidValue(format!("poke.face-ids: '{}' is not an integer", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_times: config.poke_max_times.max(1),
            interval: Duration::from_secs_f64(config.poke_interval.max(0.0)),
            cooldown: Duration::from_secs_f64(config.cooldown_seconds.max(0.0)),
            follow_probability: config.follow_poke_th,
            poke_back_probability: config.poke_back_probability,
            text_reply_probability: config.text_reply_probability,
            face_reply_probability: config.face_reply_probability,
            poke_back_replies: split_list(&config.poke_back_reply_list),
            text_replies: split_list(&config.text_reply_list),
            face_ids,
            poke_others_replies: split_list(&config.poke_others_reply_list),
            poke_me_replies: split_list(&config.poke_me_reply_list),
        })
    }
}

/// What to do about one poke aimed at the bot
#[derive(Debug, Clone, PartialEq, Eq)]
struct Response {
    poke_back: Option<u32>,
    poke_back_reply: Option<String>,
    text: Option<String>,
    faces: Option<(i64, usize)>,
}

pub struct PokePlugin {
    settings: PokeSettings,
    rng: Mutex<StdRng>,
    last_trigger: Mutex<HashMap<String, Instant>>,
}

impl PokePlugin {
    pub fn new(settings: PokeSettings) -> Self {
        Self::with_rng(settings, StdRng::from_os_rng())
    }

    /// Deterministic draws for tests
    pub fn with_seed(settings: PokeSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: PokeSettings, rng: StdRng) -> Self {
        Self {
            settings,
            rng: Mutex::new(rng),
            last_trigger: Mutex::new(HashMap::new()),
        }
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn chance(&self, probability: f64) -> bool {
        self.rng().random::<f64>() < probability
    }

    fn pick(&self, list: &[String]) -> Option<String> {
        list.choose(&mut *self.rng()).cloned()
    }

    /// Record a trigger for `user_id`; false while it is cooling down
    fn pass_cooldown(&self, user_id: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last_trigger.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(at) = last.get(user_id) {
            if now.duration_since(*at) < self.settings.cooldown {
                return false;
            }
        }
        last.insert(user_id.to_string(), now);
        true
    }

    fn draw_response(&self) -> Response {
        let s = &self.settings;
        let mut response = Response {
            poke_back: None,
            poke_back_reply: None,
            text: None,
            faces: None,
        };
        if self.chance(s.poke_back_probability) {
            response.poke_back = Some(self.rng().random_range(1..=s.max_times));
            response.poke_back_reply = self.pick(&s.poke_back_replies);
        }
        if self.chance(s.text_reply_probability) {
            response.text = self.pick(&s.text_replies);
        }
        if self.chance(s.face_reply_probability) {
            let face = s.face_ids.choose(&mut *self.rng()).copied();
            if let Some(face) = face {
                response.faces = Some((face, self.rng().random_range(1..=3)));
            }
        }
        response
    }

    /// Poke each target `times` times; the bot itself and repeats are skipped
    async fn execute_poke(
        &self,
        bot: &dyn Bot,
        chat: &ChatRef,
        self_id: &str,
        targets: &[String],
        times: u32,
    ) -> Result<(), BotError> {
        let mut seen = Vec::new();
        for target in targets {
            if target != self_id && !seen.contains(target) {
                seen.push(target.clone());
            }
        }

        let mut first = true;
        for target in &seen {
            for _ in 0..times {
                if !first && !self.settings.interval.is_zero() {
                    tokio::time::sleep(self.settings.interval).await;
                }
                first = false;
                bot.poke(chat, target).await?;
            }
        }
        Ok(())
    }

    async fn respond(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let response = self.draw_response();
        tracing::debug!(?response, user = message.sender_id(), "poked");

        if let Some(times) = response.poke_back {
            let sender = vec![message.sender_id().to_string()];
            self.execute_poke(bot, &message.chat, &message.self_id, &sender, times)
                .await?;
            if let Some(reply) = &response.poke_back_reply {
                bot.send_message(&message.chat, reply).await?;
            }
        }
        if let Some(text) = &response.text {
            bot.send_message(&message.chat, text).await?;
        }
        if let Some((face, count)) = response.faces {
            let chain = vec![Component::Face { id: face }; count];
            bot.send_chain(&message.chat, &chain).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for PokePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn description(&self) -> &str {
        "戳一戳插件"
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("戳")
            .with_aliases(vec!["戳我".to_string()])
            .with_description("戳@某人/我")
            .with_usage("/戳 @某人 [次数]")
            .with_plugin(PLUGIN_NAME)]
    }

    async fn on_message(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let Some(target_id) = message.poke_target() else {
            return Ok(());
        };
        let echoed = message
            .raw
            .as_ref()
            .and_then(|raw| raw.get("is_poke_event"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if echoed {
            return Ok(());
        }

        let user_id = message.sender_id();
        let self_id = message.self_id.as_str();
        if !self.pass_cooldown(user_id) {
            return Ok(());
        }

        if target_id != self_id {
            if message.chat.is_group() && user_id != self_id && self.chance(self.settings.follow_probability) {
                if let Err(e) = bot.poke(&message.chat, target_id).await {
                    tracing::error!(error = %e, "follow poke failed");
                }
            }
            return Ok(());
        }

        if let Err(e) = self.respond(message, bot).await {
            tracing::error!(error = %e, "poke response failed");
        }
        Ok(())
    }

    async fn handle_command(
        &self,
        _name: &str,
        message: &Message,
        _args: &[String],
        bot: &dyn Bot,
    ) -> Result<(), BotError> {
        let self_id = message.self_id.as_str();
        let mut targets: Vec<String> = message
            .mentions()
            .into_iter()
            .filter(|id| *id != self_id)
            .map(String::from)
            .collect();

        let text = message.plain_text();
        let mut times = text
            .split_whitespace()
            .last()
            .filter(|word| word.chars().all(|c| c.is_ascii_digit()))
            .and_then(|word| word.parse::<u32>().ok())
            .unwrap_or(1);
        if !message.sender_is_admin() {
            times = times.min(self.settings.max_times);
        }

        let poke_me = text.contains('我');
        if poke_me {
            targets.push(message.sender_id().to_string());
        }
        if targets.is_empty() {
            return Ok(());
        }

        if let Err(e) = self
            .execute_poke(bot, &message.chat, self_id, &targets, times)
            .await
        {
            tracing::error!(error = %e, "poke command failed");
        }

        let replies = if poke_me {
            &self.settings.poke_me_replies
        } else {
            &self.settings.poke_others_replies
        };
        if let Some(reply) = self.pick(replies) {
            bot.send_message(&message.chat, &reply).await?;
        }
        Ok(())
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([("max-times".to_string(), self.settings.max_times.to_string())])
    }
}
