//! Admin commands of the relationship plugin

use super::{RelaPlugin, DEFAULT_CHECK_COUNT};
use crate::application::errors::BotError;
use crate::domain::entities::{Component, Message};
use crate::domain::traits::Bot;

const FRIEND_REQUEST_TAG: &str = "【收到好友申请】";
const GROUP_INVITE_TAG: &str = "【收到群邀请】";
const STALE_REQUEST: &str = "这条申请处理过了或者格式不对";

/// Text of the quoted message, taken from its last text component
fn quoted_text(message: &Message) -> Option<&str> {
    let quoted = message.chain.iter().find_map(|c| match c {
        Component::Reply { chain, .. } => Some(chain),
        _ => None,
    })?;
    quoted
        .iter()
        .filter_map(|c| match c {
            Component::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .last()
        .filter(|text| !text.is_empty())
}

/// Value of a `label：value` notice line
fn field(line: &str) -> Option<&str> {
    line.splitn(2, '：').nth(1)
}

impl RelaPlugin {
    pub(super) async fn show_groups(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let groups = bot.group_list().await?;
        let listing = groups
            .iter()
            .enumerate()
            .map(|(i, g)| format!("{}. {}: {}", i + 1, g.group_id, g.name))
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = format!("【群列表】共加入{}个群：\n\n{}", groups.len(), listing);
        bot.send_message(&message.chat, &text).await?;
        Ok(())
    }

    pub(super) async fn show_friends(&self, message: &Message, bot: &dyn Bot) -> Result<(), BotError> {
        let friends = bot.friend_list().await?;
        let listing = friends
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {}: {}", i + 1, f.user_id, f.nickname))
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = format!("【好友列表】共{}位好友：\n\n{}", friends.len(), listing);
        bot.send_message(&message.chat, &text).await?;
        Ok(())
    }

    pub(super) async fn leave_group(&self, message: &Message, args: &[String], bot: &dyn Bot) -> Result<(), BotError> {
        let Some(group_id) = args.first() else {
            bot.send_message(&message.chat, "要指明退哪个群哟~").await?;
            return Ok(());
        };
        let joined = bot.group_list().await?;
        if !joined.iter().any(|g| &g.group_id == group_id) {
            bot.send_message(&message.chat, "我没加有这个群").await?;
            return Ok(());
        }
        bot.leave_group(group_id).await?;
        bot.send_message(&message.chat, &format!("已退出群聊：{}", group_id))
            .await?;
        Ok(())
    }

    pub(super) async fn delete_friend(&self, message: &Message, args: &[String], bot: &dyn Bot) -> Result<(), BotError> {
        let target = message
            .mentions()
            .into_iter()
            .find(|id| *id != message.self_id)
            .map(String::from)
            .or_else(|| args.first().cloned());
        let Some(target) = target else {
            bot.send_message(&message.chat, "请 @ 要删除的好友或提供其QQ号。").await?;
            return Ok(());
        };

        let friends = bot.friend_list().await?;
        if !friends.iter().any(|f| f.user_id == target) {
            bot.send_message(&message.chat, "我没加有这个人").await?;
            return Ok(());
        }
        let name = self.user_name(bot, &target, None, "未知").await;
        bot.delete_friend(&target).await?;
        bot.send_message(&message.chat, &format!("已删除好友：{}({})", name, target))
            .await?;
        Ok(())
    }

    /// `同意` / `拒绝` on a quoted request notice
    pub(super) async fn answer(
        &self,
        message: &Message,
        args: &[String],
        bot: &dyn Bot,
        approve: bool,
    ) -> Result<(), BotError> {
        let reply = match quoted_text(message) {
            Some(text) => self.answer_notice(text, &args.join(" "), bot, approve).await?,
            None => Some("需引用一条好友申请或群邀请".to_string()),
        };
        if let Some(reply) = reply {
            bot.send_message(&message.chat, &reply).await?;
        }
        Ok(())
    }

    /// Reply for a quoted notice; `None` when the text is not a request
    async fn answer_notice(
        &self,
        text: &str,
        extra: &str,
        bot: &dyn Bot,
        approve: bool,
    ) -> Result<Option<String>, BotError> {
        let lines: Vec<&str> = text.split('\n').collect();

        if text.contains(FRIEND_REQUEST_TAG) && lines.len() >= 5 {
            let (Some(nickname), Some(user_id), Some(flag)) = (field(lines[1]), field(lines[2]), field(lines[3])) else {
                return Ok(Some(STALE_REQUEST.to_string()));
            };
            let friends = bot.friend_list().await?;
            if friends.iter().any(|f| f.user_id == user_id) {
                return Ok(Some(format!("【{}】已经是我的好友啦", nickname)));
            }

            match bot.answer_friend_request(flag, approve, extra).await {
                Ok(()) if !approve => Ok(Some(format!("已拒绝好友：{}", nickname))),
                Ok(()) if extra.is_empty() => Ok(Some(format!("已同意好友：{}", nickname))),
                Ok(()) => Ok(Some(format!("已同意好友：{}\n并备注为：{}", nickname, extra))),
                Err(e @ BotError::Unsupported(_)) => Err(e),
                Err(e) => {
                    tracing::warn!(flag, error = %e, "friend request answer failed");
                    Ok(Some(STALE_REQUEST.to_string()))
                }
            }
        } else if text.contains(GROUP_INVITE_TAG) && lines.len() >= 7 {
            let (Some(group_name), Some(group_id), Some(flag)) = (field(lines[3]), field(lines[4]), field(lines[5])) else {
                return Ok(Some(STALE_REQUEST.to_string()));
            };
            let joined = bot.group_list().await?;
            if joined.iter().any(|g| g.group_id == group_id) {
                return Ok(Some(format!("我已经在【{}】里啦", group_name)));
            }

            if approve {
                if let Err(e) = self.blacklist.remove(group_id).await {
                    tracing::warn!(group = %group_id, error = %e, "blacklist update failed");
                }
            }
            match bot.answer_group_invite(flag, approve, extra).await {
                Ok(()) if approve => Ok(Some(format!("已同意群邀请: {}", group_name))),
                Ok(()) if extra.is_empty() => Ok(Some(format!("已拒绝群邀请: {}", group_name))),
                Ok(()) => Ok(Some(format!("已拒绝群邀请: {}\n理由：{}", group_name, extra))),
                Err(e @ BotError::Unsupported(_)) => Err(e),
                Err(e) => {
                    tracing::warn!(flag, error = %e, "group invite answer failed");
                    Ok(Some(STALE_REQUEST.to_string()))
                }
            }
        } else {
            Ok(None)
        }
    }

    /// `抽查 <群号> [条数]`: forward a group's recent messages here
    pub(super) async fn check_group(&self, message: &Message, args: &[String], bot: &dyn Bot) -> Result<(), BotError> {
        let Some(group_id) = args.first() else {
            bot.send_message(&message.chat, "未指定群号").await?;
            return Ok(());
        };
        let count = args
            .get(1)
            .and_then(|c| c.parse::<usize>().ok())
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CHECK_COUNT);

        match self.check_messages(bot, group_id, count, Some(&message.chat)).await {
            Ok(found) => {
                tracing::debug!(group = %group_id, found, "group checked");
                Ok(())
            }
            Err(e @ BotError::Unsupported(_)) => Err(e),
            Err(e) => {
                tracing::error!(group = %group_id, error = %e, "group check failed");
                bot.send_message(&message.chat, &format!("抽查群({})消息失败: {}", group_id, e))
                    .await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{plugin, settings};
    use super::*;
    use crate::domain::entities::{ChatRef, HistoryEntry, Node, User};
    use crate::plugins::test_support::RecordingBot;
    use crate::plugins::Plugin;

    fn admin_message(chain: Vec<Component>) -> Message {
        Message::new(ChatRef::private("1"), chain)
            .with_sender(User::new("1").with_admin(true))
            .with_self_id("10000")
    }

    fn quoting(text: &str) -> Message {
        admin_message(vec![
            Component::Reply {
                id: "77".into(),
                chain: vec![Component::text(text)],
            },
            Component::text("/同意"),
        ])
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    const FRIEND_NOTICE: &str = "【收到好友申请】同意吗：\n昵称：小明\nQQ号：42\nflag：f-1\n验证信息：你好";
    const INVITE_NOTICE: &str =
        "【收到群邀请】同意吗\n邀请人昵称：小明\n邀请人QQ：42\n群名称：读书会\n群号：300\nflag：g-1\n验证信息：无";

    #[tokio::test]
    async fn test_group_list_is_numbered() {
        let bot = RecordingBot::default().with_groups(&[("100", "甲"), ("200", "乙")]);
        plugin(settings())
            .handle_command("群列表", &admin_message(vec![]), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["【群列表】共加入2个群：\n\n1. 100: 甲\n\n2. 200: 乙"]);
    }

    #[tokio::test]
    async fn test_friend_list_is_numbered() {
        let bot = RecordingBot::default().with_friends(&[("42", "小明")]);
        plugin(settings())
            .handle_command("好友列表", &admin_message(vec![]), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["【好友列表】共1位好友：\n\n1. 42: 小明"]);
    }

    #[tokio::test]
    async fn test_leave_group_checks_membership() {
        let bot = RecordingBot::default().with_groups(&[("100", "甲")]);
        let plugin = plugin(settings());
        let message = admin_message(vec![]);

        plugin.handle_command("退群", &message, &[], &bot).await.unwrap();
        plugin.handle_command("退群", &message, &args(&["999"]), &bot).await.unwrap();
        plugin.handle_command("退群", &message, &args(&["100"]), &bot).await.unwrap();

        assert_eq!(bot.texts(), vec!["要指明退哪个群哟~", "我没加有这个群", "已退出群聊：100"]);
        assert_eq!(bot.actions(), vec!["leave:100"]);
    }

    #[tokio::test]
    async fn test_delete_friend_by_mention_or_id() {
        let bot = RecordingBot::default()
            .with_friends(&[("42", "小明"), ("43", "小红")])
            .with_name("42", "小明");
        let plugin = plugin(settings());

        let mention = admin_message(vec![Component::text("/删了 "), Component::at("42")]);
        plugin.handle_command("删了", &mention, &[], &bot).await.unwrap();
        plugin
            .handle_command("删了", &admin_message(vec![]), &args(&["43"]), &bot)
            .await
            .unwrap();
        plugin
            .handle_command("删了", &admin_message(vec![]), &args(&["44"]), &bot)
            .await
            .unwrap();
        plugin.handle_command("删了", &admin_message(vec![]), &[], &bot).await.unwrap();

        assert_eq!(
            bot.texts(),
            vec![
                "已删除好友：小明(42)",
                "已删除好友：未知(43)",
                "我没加有这个人",
                "请 @ 要删除的好友或提供其QQ号。",
            ]
        );
        assert_eq!(bot.actions(), vec!["delete:42", "delete:43"]);
    }

    #[tokio::test]
    async fn test_answer_needs_a_quote() {
        let bot = RecordingBot::default();
        plugin(settings())
            .handle_command("同意", &admin_message(vec![Component::text("/同意")]), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["需引用一条好友申请或群邀请"]);
    }

    #[tokio::test]
    async fn test_approve_friend_with_remark() {
        let bot = RecordingBot::default();
        plugin(settings())
            .handle_command("同意", &quoting(FRIEND_NOTICE), &args(&["同学"]), &bot)
            .await
            .unwrap();
        assert_eq!(bot.actions(), vec!["friend:f-1:true:同学"]);
        assert_eq!(bot.texts(), vec!["已同意好友：小明\n并备注为：同学"]);
    }

    #[tokio::test]
    async fn test_refuse_friend_and_existing_friend() {
        let plugin = plugin(settings());

        let bot = RecordingBot::default();
        plugin
            .handle_command("拒绝", &quoting(FRIEND_NOTICE), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["已拒绝好友：小明"]);

        let bot = RecordingBot::default().with_friends(&[("42", "小明")]);
        plugin
            .handle_command("同意", &quoting(FRIEND_NOTICE), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["【小明】已经是我的好友啦"]);
        assert!(bot.actions().is_empty());
    }

    #[tokio::test]
    async fn test_expired_request_is_reported() {
        let bot = RecordingBot::default();
        *bot.refuse_answers.lock().unwrap() = true;
        plugin(settings())
            .handle_command("同意", &quoting(INVITE_NOTICE), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["这条申请处理过了或者格式不对"]);
    }

    #[tokio::test]
    async fn test_approving_invite_lifts_blacklist() {
        let plugin = plugin(settings());
        plugin.blacklist().insert("300").await.unwrap();
        let bot = RecordingBot::default();

        plugin
            .handle_command("同意", &quoting(INVITE_NOTICE), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.actions(), vec!["invite:g-1:true:"]);
        assert_eq!(bot.texts(), vec!["已同意群邀请: 读书会"]);
        assert!(!plugin.blacklist().contains("300"));
    }

    #[tokio::test]
    async fn test_refuse_invite_with_reason_keeps_blacklist() {
        let plugin = plugin(settings());
        plugin.blacklist().insert("300").await.unwrap();
        let bot = RecordingBot::default();

        plugin
            .handle_command("拒绝", &quoting(INVITE_NOTICE), &args(&["人太多"]), &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["已拒绝群邀请: 读书会\n理由：人太多"]);
        assert!(plugin.blacklist().contains("300"));
    }

    #[tokio::test]
    async fn test_already_in_invited_group() {
        let bot = RecordingBot::default().with_groups(&[("300", "读书会")]);
        plugin(settings())
            .handle_command("同意", &quoting(INVITE_NOTICE), &[], &bot)
            .await
            .unwrap();
        assert_eq!(bot.texts(), vec!["我已经在【读书会】里啦"]);
    }

    #[tokio::test]
    async fn test_quote_of_other_text_is_ignored() {
        let bot = RecordingBot::default();
        plugin(settings())
            .handle_command("同意", &quoting("随便说说"), &[], &bot)
            .await
            .unwrap();
        assert!(bot.texts().is_empty());
    }

    #[tokio::test]
    async fn test_check_forwards_history_to_caller() {
        let bot = RecordingBot::default();
        *bot.history.lock().unwrap() = (1..=3)
            .map(|i| HistoryEntry {
                sender_id: i.to_string(),
                sender_name: format!("u{}", i),
                chain: vec![Component::text(format!("m{}", i))],
            })
            .collect();
        let plugin = plugin(settings());

        plugin
            .handle_command("抽查", &admin_message(vec![]), &args(&["300", "2"]), &bot)
            .await
            .unwrap();
        plugin.handle_command("抽查", &admin_message(vec![]), &[], &bot).await.unwrap();

        let chains = bot.chains();
        assert_eq!(
            chains[0],
            vec![Component::Nodes(vec![
                Node::new(vec![Component::text("m2")]).with_sender("2", "u2"),
                Node::new(vec![Component::text("m3")]).with_sender("3", "u3"),
            ])]
        );
        assert_eq!(bot.texts()[1], "未指定群号");
    }

    #[test]
    fn test_field_keeps_text_after_first_separator() {
        assert_eq!(field("验证信息：你好：朋友"), Some("你好：朋友"));
        assert_eq!(field("no separator"), None);
    }
}
