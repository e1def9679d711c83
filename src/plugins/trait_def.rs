//! Plugin trait definitions

use async_trait::async_trait;
use std::collections::HashMap;

use crate::application::errors::{BotError, CommandError};
use crate::domain::entities::{Command, Message};
use crate::domain::traits::Bot;

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identifier for the plugin
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Commands routed to [`Plugin::handle_command`]
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Called once before the first message is dispatched
    async fn initialize(&self) -> Result<(), BotError> {
        Ok(())
    }

    /// Handle one of the commands this plugin registered
    async fn handle_command(
        &self,
        name: &str,
        message: &Message,
        args: &[String],
        bot: &dyn Bot,
    ) -> Result<(), BotError> {
        let _ = (message, args, bot);
        Err(CommandError::NotFound(name.to_string()).into())
    }

    /// Sees every incoming message, commands included
    async fn on_message(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let _ = (message, bot);
        Ok(())
    }

    /// Cleanup resources when the bot shuts down
    async fn terminate(&self) {}

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}
