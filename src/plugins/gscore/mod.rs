//! Relay to a gscore (SayuCore) instance
//!
//! Every message the bot sees is forwarded to the core; the core's replies
//! come back over the same WebSocket and are sent to the originating chat.

pub mod convert;
pub mod models;
pub mod reconnect;
pub mod relay;

pub use reconnect::{ConnectionState, ReconnectPolicy, Reconnector};
pub use relay::GsCoreRelay;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::application::errors::{BotError, RelayError};
use crate::domain::entities::Message;
use crate::domain::traits::Bot;
use crate::plugins::trait_def::Plugin;

pub const PLUGIN_NAME: &str = "gscore";

pub struct GsCorePlugin {
    relay: Arc<GsCoreRelay>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GsCorePlugin {
    pub fn new(relay: Arc<GsCoreRelay>) -> Self {
        Self {
            relay,
            task: Mutex::new(None),
        }
    }

    pub fn relay(&self) -> &Arc<GsCoreRelay> {
        &self.relay
    }
}

#[async_trait]
impl Plugin for GsCorePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn description(&self) -> &str {
        "用于链接早柚核心的适配器"
    }

    async fn initialize(&self) -> Result<(), BotError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }
        let relay = self.relay.clone();
        *task = Some(tokio::spawn(async move {
            if let Err(e) = relay.run().await {
                tracing::error!(error = %e, "gscore relay stopped");
            }
        }));
        Ok(())
    }

    async fn on_message(&self, message: &Message, _bot: &dyn Bot) -> Result<(), BotError> {
        let frame = convert::build_receive(message).await;
        if frame.content.is_empty() {
            tracing::debug!(chat = message.chat.id(), "nothing to relay");
            return Ok(());
        }
        match self.relay.forward(frame) {
            Ok(()) => Ok(()),
            Err(RelayError::GaveUp(attempts)) => {
                tracing::debug!(attempts, "gscore unavailable, message dropped");
                Ok(())
            }
            Err(e) => Err(BotError::Network(e.to_string())),
        }
    }

    async fn terminate(&self) {
        self.relay.shutdown();
        if let Some(task) = self.task.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("url".to_string(), self.relay.ws_url().to_string()),
            ("state".to_string(), format!("{:?}", self.relay.state())),
        ])
    }
}
