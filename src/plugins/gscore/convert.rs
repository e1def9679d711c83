//! Translation between message chains and gscore content items

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

use super::models::{GsMessage, MessageReceive, MessageSend, Sender};
use crate::application::errors::RelayError;
use crate::domain::entities::{ChatRef, Component, FileSource, ImageSource, Message, Node};

/// Platforms whose replies are addressed by `target_id`
const TARGET_SESSION_PLATFORMS: &[&str] = &["aiocqhttp", "onebot", "dingtalk", "lark", "wechatpadpro"];

/// Name the core knows a platform by
pub fn core_bot_id(platform: &str) -> &str {
    if platform == "aiocqhttp" {
        "onebot"
    } else {
        platform
    }
}

pub fn avatar_url(platform: &str, self_id: &str, user_id: &str) -> String {
    match platform {
        "qq_official" => format!("https://q.qlogo.cn/qqapp/{}/{}/100", self_id, user_id),
        "aiocqhttp" => format!("https://q1.qlogo.cn/g?b=qq&nk={}&s=640", user_id),
        _ => String::new(),
    }
}

async fn read_base64(path: &Path) -> Result<String, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    Ok(STANDARD.encode(bytes))
}

async fn image_item(source: &ImageSource) -> Option<GsMessage> {
    match source {
        ImageSource::Url(url) => Some(GsMessage::new("image", url.clone())),
        ImageSource::Base64(b64) => Some(GsMessage::new("image", format!("base64://{}", b64))),
        ImageSource::Path(path) => match read_base64(path).await {
            Ok(b64) => Some(GsMessage::new("image", format!("base64://{}", b64))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "image not readable, skipped");
                None
            }
        },
    }
}

/// Convert a chain into core content; components the core has no use for are skipped
pub async fn to_core(chain: &[Component]) -> Vec<GsMessage> {
    let mut items = Vec::new();
    for component in chain {
        match component {
            Component::Text(text) => items.push(GsMessage::new("text", text.clone())),
            Component::At { user_id } => items.push(GsMessage::new("at", user_id.clone())),
            Component::Image(source) => items.extend(image_item(source).await),
            Component::File { name, source } => {
                let value = match source {
                    FileSource::Url(url) => url.clone(),
                    FileSource::Path(path) => match read_base64(path).await {
                        Ok(b64) => b64,
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "file not readable, skipped");
                            continue;
                        }
                    },
                };
                items.push(GsMessage::new("file", format!("{}|{}", name, value)));
            }
            Component::Reply { id, chain } => {
                items.push(GsMessage::new("reply", id.clone()));
                for quoted in chain {
                    match quoted {
                        Component::Image(source) => items.extend(image_item(source).await),
                        Component::Text(text) => items.push(GsMessage::new("text", text.clone())),
                        Component::At { user_id } => items.push(GsMessage::new("at", user_id.clone())),
                        other => tracing::debug!(kind = other.kind(), "quoted component not relayed"),
                    }
                }
            }
            Component::Nodes(_) | Component::Face { .. } | Component::Poke { .. } => {
                tracing::warn!(kind = component.kind(), "component not supported by gscore");
            }
        }
    }
    items
}

/// Build the frame announcing `message` to the core
pub async fn build_receive(message: &Message) -> MessageReceive {
    let platform = message.platform.as_str();
    let user_id = message.sender_id().to_string();
    let nickname = message
        .sender
        .as_ref()
        .map(|u| u.display_name())
        .unwrap_or_default();

    MessageReceive {
        bot_id: core_bot_id(platform).to_string(),
        bot_self_id: message.self_id.clone(),
        msg_id: message.chat.id().to_string(),
        user_type: if message.chat.is_group() { "group" } else { "direct" }.to_string(),
        group_id: message.chat.group_id().map(String::from),
        sender: Sender {
            nickname,
            avatar: avatar_url(platform, &message.self_id, &user_id),
        },
        user_id,
        content: to_core(&message.chain).await,
        user_pm: if message.sender_is_admin() { 1 } else { 6 },
    }
}

/// Chat a reply frame should be delivered to
///
/// `None` when the frame has no session id, no target or no content.
pub fn session_chat(frame: &MessageSend) -> Option<ChatRef> {
    let session_id = if TARGET_SESSION_PLATFORMS.contains(&frame.bot_id.as_str()) {
        frame.target_id.as_deref()
    } else {
        frame.msg_id.as_deref()
    };
    let Some(session_id) = session_id else {
        tracing::warn!(bot_id = %frame.bot_id, "frame has no session id");
        return None;
    };

    let has_content = frame.content.as_ref().is_some_and(|c| !c.is_empty());
    if frame.target_id.is_none() || !has_content {
        return None;
    }

    Some(if frame.target_type.as_deref() == Some("group") {
        ChatRef::group(session_id)
    } else {
        ChatRef::private(session_id)
    })
}

/// Log frames sent by the core about itself; returns whether `frame` was one
pub fn log_frame(frame: &MessageSend) -> bool {
    if frame.bot_id != "AstrBot" {
        return false;
    }
    let Some(first) = frame.content.as_ref().and_then(|c| c.first()) else {
        return true;
    };
    if !first.kind().starts_with("log") {
        return true;
    }

    let text = first.data_str().unwrap_or_default();
    let level = first.kind().rsplit('_').next().unwrap_or("").to_lowercase();
    match level.as_str() {
        "error" => tracing::error!(target: "gscore", "{}", text),
        "warning" | "warn" => tracing::warn!(target: "gscore", "{}", text),
        "debug" => tracing::debug!(target: "gscore", "{}", text),
        "trace" => tracing::trace!(target: "gscore", "{}", text),
        _ => tracing::info!(target: "gscore", "{}", text),
    }
    true
}

/// Convert core content into a chain, storing transferred files under `file_dir`
pub fn from_core(items: &[GsMessage], bot_id: &str, file_dir: &Path) -> Result<Vec<Component>, RelayError> {
    let mut chain = Vec::new();
    for item in items {
        if item.is_empty() {
            continue;
        }
        match item.kind() {
            "text" => chain.extend(item.data_str().map(Component::Text)),
            "image" => {
                let Some(data) = item.data_str() else { continue };
                let source = if let Some(url) = data.strip_prefix("link://") {
                    ImageSource::Url(url.to_string())
                } else {
                    let b64 = data.strip_prefix("base64://").unwrap_or(&data);
                    ImageSource::Base64(b64.to_string())
                };
                chain.push(Component::Image(source));
            }
            "node" => {
                let nodes: Vec<GsMessage> = serde_json::from_value(item.data.clone())?;
                if bot_id == "onebot" {
                    let group = nodes
                        .iter()
                        .map(|node| from_core(std::slice::from_ref(node), bot_id, file_dir).map(Node::new))
                        .collect::<Result<Vec<_>, _>>()?;
                    chain.push(Component::Nodes(group));
                } else {
                    chain.extend(from_core(&nodes, bot_id, file_dir)?);
                }
            }
            "file" => {
                let Some(data) = item.data_str() else { continue };
                let Some((name, content)) = data.split_once('|') else {
                    tracing::warn!("file item without a name separator, skipped");
                    continue;
                };
                chain.push(store_file(file_dir, name, content)?);
            }
            "at" => chain.extend(item.data_str().map(Component::at)),
            other => tracing::debug!(kind = other, "unhandled gscore item"),
        }
    }
    Ok(chain)
}

fn store_file(file_dir: &Path, name: &str, content: &str) -> Result<Component, RelayError> {
    let file_name = Path::new(name)
        .file_name()
        .ok_or_else(|| RelayError::Connection(format!("invalid file name from core: {}", name)))?;
    let bytes = STANDARD
        .decode(content.trim())
        .map_err(|e| RelayError::Connection(format!("file {} is not base64: {}", name, e)))?;

    std::fs::create_dir_all(file_dir).map_err(|e| RelayError::Connection(e.to_string()))?;
    let path = file_dir.join(file_name);
    std::fs::write(&path, bytes).map_err(|e| RelayError::Connection(e.to_string()))?;
    Ok(Component::file(file_name.to_string_lossy(), path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::User;

    #[tokio::test]
    async fn test_to_core_flattens_reply_chain() {
        let chain = vec![
            Component::Reply {
                id: "99".into(),
                chain: vec![
                    Component::Image(ImageSource::Url("https://x/a.png".into())),
                    Component::text("quoted"),
                    Component::Face { id: 1 },
                ],
            },
            Component::text("gs 查询"),
            Component::Poke { target_id: "1".into() },
        ];
        let items = to_core(&chain).await;
        let kinds: Vec<&str> = items.iter().map(|i| i.kind()).collect();
        assert_eq!(kinds, vec!["reply", "image", "text", "text"]);
        assert_eq!(items[1].data_str().as_deref(), Some("https://x/a.png"));
    }

    #[tokio::test]
    async fn test_local_files_are_inlined_as_base64() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        std::fs::write(&path, b"hello").unwrap();

        let items = to_core(&[
            Component::file("a.bin", &path),
            Component::Image(ImageSource::Path(path.clone())),
        ])
        .await;
        assert_eq!(items[0].data_str().as_deref(), Some("a.bin|aGVsbG8="));
        assert_eq!(items[1].data_str().as_deref(), Some("base64://aGVsbG8="));
    }

    #[tokio::test]
    async fn test_build_receive_for_qq_group() {
        let message = Message::from_text(ChatRef::group("555"), "gs help")
            .with_sender(User::new("42").with_username("alice").with_admin(true))
            .with_self_id("10000")
            .with_platform("aiocqhttp");

        let frame = build_receive(&message).await;
        assert_eq!(frame.bot_id, "onebot");
        assert_eq!(frame.user_type, "group");
        assert_eq!(frame.group_id.as_deref(), Some("555"));
        assert_eq!(frame.user_pm, 1);
        assert_eq!(frame.sender.nickname, "alice");
        assert_eq!(frame.sender.avatar, "https://q1.qlogo.cn/g?b=qq&nk=42&s=640");
    }

    #[test]
    fn test_session_chat_by_platform() {
        let mut frame = MessageSend {
            bot_id: "onebot".into(),
            target_type: Some("group".into()),
            target_id: Some("555".into()),
            msg_id: Some("m1".into()),
            content: Some(vec![GsMessage::new("text", "hi")]),
            ..MessageSend::default()
        };
        assert_eq!(session_chat(&frame), Some(ChatRef::group("555")));

        frame.bot_id = "telegram".into();
        frame.target_type = Some("direct".into());
        assert_eq!(session_chat(&frame), Some(ChatRef::private("m1")));

        frame.msg_id = None;
        assert_eq!(session_chat(&frame), None);
    }

    #[test]
    fn test_from_core_nodes_depend_on_platform() {
        let tmp = tempfile::tempdir().unwrap();
        let node = GsMessage {
            kind: Some("node".into()),
            data: serde_json::json!([
                {"type": "text", "data": "a"},
                {"type": "image", "data": "link://https://x/b.png"}
            ]),
        };

        let onebot = from_core(std::slice::from_ref(&node), "onebot", tmp.path()).unwrap();
        assert_eq!(
            onebot,
            vec![Component::Nodes(vec![
                Node::new(vec![Component::text("a")]),
                Node::new(vec![Component::Image(ImageSource::Url("https://x/b.png".into()))]),
            ])]
        );

        let flat = from_core(&[node], "telegram", tmp.path()).unwrap();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0], Component::text("a"));
    }

    #[test]
    fn test_from_core_stores_files() {
        let tmp = tempfile::tempdir().unwrap();
        let items = vec![
            GsMessage::new("file", "../evil.txt|aGVsbG8="),
            GsMessage::new("image", "base64://QUJD"),
            GsMessage::new("at", "7"),
            GsMessage::new("text", ""),
        ];
        let chain = from_core(&items, "onebot", tmp.path()).unwrap();

        let stored = tmp.path().join("evil.txt");
        assert_eq!(chain[0], Component::file("evil.txt", &stored));
        assert_eq!(std::fs::read(&stored).unwrap(), b"hello");
        assert_eq!(chain[1], Component::Image(ImageSource::Base64("QUJD".into())));
        assert_eq!(chain[2], Component::at("7"));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_log_frames_are_consumed() {
        let frame = MessageSend {
            bot_id: "AstrBot".into(),
            content: Some(vec![GsMessage::new("log_INFO", "core started")]),
            ..MessageSend::default()
        };
        assert!(log_frame(&frame));
        assert!(!log_frame(&MessageSend {
            bot_id: "onebot".into(),
            ..MessageSend::default()
        }));
    }
}
