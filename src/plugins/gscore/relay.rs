//! WebSocket connection to the gscore core
//!
//! A [`GsCoreRelay`] owns its connection state. Outbound frames are queued on
//! a channel that survives reconnects, and a frame whose send failed is resent
//! first on the next connection. Inbound replies are converted and delivered
//! through the injected [`Bot`].

use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::convert::{from_core, log_frame, session_chat};
use super::models::{MessageReceive, MessageSend};
use super::reconnect::{ConnectionState, ReconnectPolicy, Reconnector};
use crate::application::errors::RelayError;
use crate::domain::traits::Bot;
use crate::infrastructure::config::GsCoreConfig;

const OUTBOUND_CAPACITY: usize = 256;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Queued outbound frames plus the one a failed send left behind
struct Outbox {
    rx: mpsc::Receiver<MessageReceive>,
    pending: Option<MessageReceive>,
}

impl Outbox {
    fn new(rx: mpsc::Receiver<MessageReceive>) -> Self {
        Self { rx, pending: None }
    }

    async fn next(&mut self) -> Option<MessageReceive> {
        match self.pending.take() {
            Some(frame) => Some(frame),
            None => self.rx.recv().await,
        }
    }

    /// Hold `frame` for the next connection
    fn retry(&mut self, frame: MessageReceive) {
        self.pending = Some(frame);
    }
}

/// Why a live session ended
enum SessionEnd {
    Cancelled,
    Dropped,
}

pub struct GsCoreRelay {
    ws_url: String,
    file_dir: PathBuf,
    policy: ReconnectPolicy,
    bot: Arc<dyn Bot>,
    outbound: mpsc::Sender<MessageReceive>,
    outbound_rx: Mutex<Option<mpsc::Receiver<MessageReceive>>>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl GsCoreRelay {
    pub fn new(config: &GsCoreConfig, bot: Arc<dyn Bot>) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            ws_url: config.ws_url(),
            file_dir: config.file_dir.clone(),
            policy: ReconnectPolicy::from_config(&config.reconnect),
            bot,
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Stop the connection loop
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Queue a frame for the core
    ///
    /// Frames queued while reconnecting are sent once the connection is back.
    pub fn forward(&self, frame: MessageReceive) -> Result<(), RelayError> {
        if let ConnectionState::GaveUp { attempts } = self.state() {
            return Err(RelayError::GaveUp(attempts));
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::Connection("outbound queue is full".to_string()),
            mpsc::error::TrySendError::Closed(_) => RelayError::NotConnected,
        })
    }

    fn publish(&self, state: &ConnectionState) {
        tracing::debug!(?state, "gscore connection state");
        self.state.send_replace(state.clone());
    }

    /// Connect, relay, and reconnect until cancelled or out of attempts
    pub async fn run(self: Arc<Self>) -> Result<(), RelayError> {
        let Some(outbound_rx) = self.outbound_rx.lock().await.take() else {
            return Err(RelayError::Connection("relay is already running".to_string()));
        };
        let mut outbox = Outbox::new(outbound_rx);
        let mut reconnector = Reconnector::new(self.policy.clone());

        loop {
            let attempt = reconnector.begin_attempt().clone();
            self.publish(&attempt);
            tracing::info!(url = %self.ws_url, ?attempt, "connecting to gscore");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.ws_url.as_str())) => result,
            };

            let next = match connected {
                Ok(Ok((ws, _response))) => {
                    self.publish(reconnector.connected());
                    tracing::info!(url = %self.ws_url, "connected to gscore");
                    match self.session(ws, &mut outbox).await {
                        SessionEnd::Cancelled => return Ok(()),
                        SessionEnd::Dropped => {
                            tracing::warn!(url = %self.ws_url, "disconnected from gscore");
                            reconnector.disconnected().clone()
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %self.ws_url, error = %e, "gscore connection failed");
                    reconnector.failed().clone()
                }
                Err(_) => {
                    tracing::warn!(url = %self.ws_url, "gscore connection timed out");
                    reconnector.failed().clone()
                }
            };
            self.publish(&next);

            match next {
                ConnectionState::GaveUp { attempts } => {
                    tracing::error!(attempts, "giving up on gscore; is the core running?");
                    return Err(RelayError::GaveUp(attempts));
                }
                ConnectionState::Backoff { delay, .. } => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                _ => {}
            }
        }
    }

    async fn session(&self, ws: WsStream, outbox: &mut Outbox) -> SessionEnd {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                frame = outbox.next() => {
                    let Some(frame) = frame else { return SessionEnd::Cancelled };
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode gscore frame");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(WsMessage::Text(json.into())).await {
                        tracing::warn!(error = %e, "gscore send failed, keeping frame for the next connection");
                        outbox.retry(frame);
                        return SessionEnd::Dropped;
                    }
                    tracing::info!(bot_id = %frame.bot_id, user = %frame.user_id, "sent to gscore");
                }
                incoming = read.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(text.as_bytes()).await,
                    Some(Ok(WsMessage::Binary(bytes))) => self.handle_frame(&bytes).await,
                    Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "gscore read failed");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }

    /// Deliver one frame from the core; bad frames are logged and dropped
    pub async fn handle_frame(&self, raw: &[u8]) {
        let frame: MessageSend = match serde_json::from_slice(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable gscore frame");
                return;
            }
        };
        if log_frame(&frame) {
            return;
        }
        tracing::info!(
            bot_id = %frame.bot_id,
            target_type = ?frame.target_type,
            target_id = ?frame.target_id,
            "received from gscore"
        );

        let Some(chat) = session_chat(&frame) else { return };
        let content = frame.content.as_deref().unwrap_or_default();
        let chain = match from_core(content, &frame.bot_id, &self.file_dir) {
            Ok(chain) if !chain.is_empty() => chain,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to convert gscore reply");
                return;
            }
        };
        if let Err(e) = self.bot.send_chain(&chat, &chain).await {
            tracing::error!(chat = chat.id(), error = %e, "failed to deliver gscore reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ChatRef, Component};
    use crate::plugins::gscore::models::{GsMessage, Sender};
    use crate::plugins::test_support::RecordingBot;

    fn relay(bot: Arc<RecordingBot>, dir: &std::path::Path) -> GsCoreRelay {
        let config = GsCoreConfig {
            file_dir: dir.to_path_buf(),
            port: 1,
            ..GsCoreConfig::default()
        };
        GsCoreRelay::new(&config, bot)
    }

    fn frame() -> MessageReceive {
        MessageReceive {
            bot_id: "onebot".into(),
            bot_self_id: "1".into(),
            msg_id: "2".into(),
            user_type: "direct".into(),
            group_id: None,
            user_id: "3".into(),
            sender: Sender::default(),
            content: vec![GsMessage::new("text", "hi")],
            user_pm: 6,
        }
    }

    #[tokio::test]
    async fn test_reply_frame_is_delivered_to_session() {
        let tmp = tempfile::tempdir().unwrap();
        let bot = Arc::new(RecordingBot::default());
        let relay = relay(bot.clone(), tmp.path());

        let raw = br#"{"bot_id":"onebot","bot_self_id":"1","target_type":"group","target_id":"555",
                       "content":[{"type":"text","data":"hello"}]}"#;
        relay.handle_frame(raw).await;

        let sent = bot.sent.lock().unwrap();
        assert_eq!(sent[0], (ChatRef::group("555"), vec![Component::text("hello")]));
    }

    #[tokio::test]
    async fn test_log_and_garbage_frames_send_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let bot = Arc::new(RecordingBot::default());
        let relay = relay(bot.clone(), tmp.path());

        relay
            .handle_frame(br#"{"bot_id":"AstrBot","content":[{"type":"log_INFO","data":"up"}]}"#)
            .await;
        relay.handle_frame(b"not json").await;
        assert!(bot.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_frames_queue_before_connecting() {
        let tmp = tempfile::tempdir().unwrap();
        let relay = relay(Arc::new(RecordingBot::default()), tmp.path());
        assert_eq!(relay.state(), ConnectionState::Idle);
        relay.forward(frame()).unwrap();
    }

    #[tokio::test]
    async fn test_outbox_resends_failed_frame_first() {
        let (tx, rx) = mpsc::channel(4);
        let mut outbox = Outbox::new(rx);
        let mut first = frame();
        first.msg_id = "first".into();
        let mut second = frame();
        second.msg_id = "second".into();
        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();

        let taken = outbox.next().await.unwrap();
        assert_eq!(taken.msg_id, "first");
        outbox.retry(taken);

        assert_eq!(outbox.next().await.unwrap().msg_id, "first");
        assert_eq!(outbox.next().await.unwrap().msg_id, "second");
    }

    #[tokio::test]
    async fn test_unreachable_core_gives_up() {
        let tmp = tempfile::tempdir().unwrap();
        let config = GsCoreConfig {
            host: "127.0.0.1".into(),
            port: 1,
            file_dir: tmp.path().to_path_buf(),
            reconnect: crate::infrastructure::config::ReconnectConfig {
                initial_delay_secs: 0,
                max_delay_secs: 0,
                max_attempts: 2,
            },
            ..GsCoreConfig::default()
        };
        let relay = Arc::new(GsCoreRelay::new(&config, Arc::new(RecordingBot::default())));

        let result = tokio::time::timeout(Duration::from_secs(10), relay.clone().run())
            .await
            .expect("relay stops on its own");
        assert!(matches!(result, Err(RelayError::GaveUp(2))));
        assert_eq!(relay.state(), ConnectionState::GaveUp { attempts: 2 });
        assert!(matches!(relay.forward(frame()), Err(RelayError::GaveUp(2))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_backoff() {
        let tmp = tempfile::tempdir().unwrap();
        let config = GsCoreConfig {
            host: "127.0.0.1".into(),
            port: 1,
            file_dir: tmp.path().to_path_buf(),
            reconnect: crate::infrastructure::config::ReconnectConfig {
                initial_delay_secs: 3600,
                max_delay_secs: 3600,
                max_attempts: 0,
            },
            ..GsCoreConfig::default()
        };
        let relay = Arc::new(GsCoreRelay::new(&config, Arc::new(RecordingBot::default())));
        let handle = tokio::spawn(relay.clone().run());

        let mut states = relay.subscribe();
        states
            .wait_for(|s| matches!(s, ConnectionState::Backoff { .. }))
            .await
            .unwrap();
        relay.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
