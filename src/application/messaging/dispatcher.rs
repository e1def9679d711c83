//! Message dispatcher - Routes messages to plugins

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use super::parser::MessageParser;
use crate::application::errors::BotError;
use crate::application::services::CommandService;
use crate::domain::entities::{Content, Message};
use crate::domain::traits::Bot;
use crate::plugins::PluginManager;

/// Parses each message, runs the matching command and then lets every
/// plugin observe it
pub struct MessageDispatcher {
    parser: MessageParser,
    commands: CommandService,
    plugins: Arc<PluginManager>,
    admins: HashSet<String>,
    tasks: TaskTracker,
}

impl MessageDispatcher {
    pub fn new(
        prefix: impl Into<String>,
        plugins: Arc<PluginManager>,
        admins: impl IntoIterator<Item = String>,
    ) -> Self {
        let prefix = prefix.into();
        let mut commands = CommandService::new(prefix.clone());
        commands.register_defaults();
        for plugin in plugins.iter() {
            commands.register_plugin_commands(plugin.as_ref());
        }

        Self {
            parser: MessageParser::new(prefix),
            commands,
            plugins,
            admins: admins.into_iter().collect(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn commands(&self) -> &CommandService {
        &self.commands
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// Handle `message` on its own task
    ///
    /// Adapters call this for every incoming message; [`MessageDispatcher::drain`]
    /// waits for all of them.
    pub fn spawn(self: &Arc<Self>, message: Message, bot: Arc<dyn Bot>) {
        let dispatcher = self.clone();
        self.tasks.spawn(async move {
            if let Err(e) = dispatcher.dispatch(message, bot.as_ref()).await {
                tracing::error!(error = %e, "Failed to handle message");
            }
        });
    }

    /// Number of spawned messages still being handled
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every spawned message has been handled
    pub async fn drain(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            tracing::info!(in_flight = self.tasks.len(), "waiting for in-flight messages");
        }
        self.tasks.wait().await;
    }

    /// Process one incoming message
    pub async fn dispatch(&self, message: Message, bot: &dyn Bot) -> Result<(), BotError> {
        let mut message = self.parser.parse(message);
        if let Some(sender) = message.sender.as_mut() {
            if self.admins.contains(&sender.id) {
                sender.is_admin = true;
            }
        }

        if let Content::Command { name, args } = &message.content {
            self.run_command(name, args, &message, bot).await?;
        }

        for plugin in self.plugins.iter() {
            if let Err(e) = plugin.on_message(&message, bot).await {
                tracing::warn!(plugin = plugin.name(), error = %e, "on_message failed");
            }
        }
        Ok(())
    }

    async fn run_command(
        &self,
        name: &str,
        args: &[String],
        message: &Message,
        bot: &dyn Bot,
    ) -> Result<(), BotError> {
        let Some(command) = self.commands.find(name) else {
            tracing::debug!(command = name, "unknown command ignored");
            return Ok(());
        };

        match command.name.as_str() {
            "help" => {
                let help = self.commands.get_help(args.first().map(String::as_str));
                bot.send_message(&message.chat, &help).await?;
                return Ok(());
            }
            "version" => {
                let text = format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                bot.send_message(&message.chat, &text).await?;
                return Ok(());
            }
            _ => {}
        }

        if command.admin_only && !message.sender_is_admin() {
            tracing::info!(command = %command.name, sender = message.sender_id(), "admin command refused");
            bot.send_message(&message.chat, "⛔ 该命令仅限管理员使用").await?;
            return Ok(());
        }

        let Some(plugin) = self.plugins.get(&command.plugin) else {
            tracing::warn!(command = %command.name, plugin = %command.plugin, "command has no plugin");
            return Ok(());
        };

        tracing::debug!(command = %command.name, plugin = plugin.name(), "running command");
        if let Err(e) = plugin
            .handle_command(&command.name, message, args, bot)
            .await
        {
            tracing::error!(command = %command.name, plugin = plugin.name(), error = %e, "command failed");
        }
        Ok(())
    }
}
