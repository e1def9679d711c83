//! Account notices: requests, invitations and group membership changes

use super::{format_secs, RelaPlugin, DEFAULT_CHECK_COUNT};
use crate::application::errors::BotError;
use crate::domain::entities::{ChatRef, Message, Notice};
use crate::domain::traits::Bot;

impl RelaPlugin {
    pub(super) async fn handle_notice(&self, message: &Message, notice: &Notice, bot: &dyn Bot) -> Result<(), BotError> {
        tracing::info!(kind = notice.kind(), "account notice");
        let self_id = message.self_id.as_str();
        match notice {
            Notice::FriendRequest { user_id, comment, flag } => {
                self.on_friend_request(bot, user_id, comment, flag).await;
                Ok(())
            }
            Notice::GroupInvite {
                user_id,
                group_id,
                comment,
                flag,
            } => {
                self.on_group_invite(bot, user_id, group_id, comment, flag).await;
                Ok(())
            }
            Notice::AdminChanged { group_id, granted } => {
                let group_name = self.group_name(bot, group_id).await;
                let text = if *granted {
                    format!("哇！我成为了 {}({}) 的管理员", group_name, group_id)
                } else {
                    format!("呜呜ww..我在 {}({}) 的管理员被撤了", group_name, group_id)
                };
                self.send_reply(bot, &text).await;
                self.auto_check(bot, group_id).await;
                Ok(())
            }
            Notice::Muted {
                group_id,
                operator_id,
                duration_secs,
            } if operator_id != self_id => self.on_muted(bot, group_id, operator_id, *duration_secs).await,
            Notice::Kicked { group_id, operator_id } if operator_id != self_id => {
                self.on_kicked(bot, group_id, operator_id).await;
                Ok(())
            }
            Notice::Invited { group_id, operator_id } if operator_id != self_id => {
                self.on_invited(bot, self_id, group_id, operator_id).await
            }
            _ => Ok(()),
        }
    }

    async fn on_friend_request(&self, bot: &dyn Bot, user_id: &str, comment: &str, flag: &str) {
        let nickname = self.user_name(bot, user_id, None, "未知昵称").await;
        let comment = if comment.is_empty() { "无" } else { comment };
        let manual = format!(
            "【收到好友申请】同意吗：\n昵称：{}\nQQ号：{}\nflag：{}\n验证信息：{}",
            nickname, user_id, flag, comment
        );

        let Some(keyword) = self
            .settings
            .auto_approve_keyword
            .as_deref()
            .filter(|k| comment.contains(k))
        else {
            self.send_reply(bot, &manual).await;
            return;
        };

        match bot.answer_friend_request(flag, true, "").await {
            Ok(()) => {
                tracing::info!(user = %user_id, "friend request approved by keyword");
                let text = format!(
                    "【自动通过好友申请】\n昵称：{}\nQQ号：{}\n验证信息：{}\n匹配关键词：{}",
                    nickname, user_id, comment, keyword
                );
                self.send_reply(bot, &text).await;
            }
            Err(e) => {
                tracing::error!(user = %user_id, error = %e, "auto approve failed");
                self.send_reply(bot, &format!("{}\n⚠️自动通过失败：{}", manual, e))
                    .await;
            }
        }
    }

    async fn on_group_invite(&self, bot: &dyn Bot, user_id: &str, group_id: &str, comment: &str, flag: &str) {
        let nickname = self.user_name(bot, user_id, None, "未知昵称").await;
        let comment = if comment.is_empty() { "无" } else { comment };
        let group_name = self.group_name(bot, group_id).await;
        let blacklisted = self.blacklist.contains(group_id);

        let mut to_admins = format!(
            "【收到群邀请】同意吗\n邀请人昵称：{}\n邀请人QQ：{}\n群名称：{}\n群号：{}\nflag：{}\n验证信息：{}",
            nickname, user_id, group_name, group_id, flag, comment
        );
        let mut to_inviter = if self.settings.manage_group.is_some() {
            "想加好友或拉群？要等审核们审批哟".to_string()
        } else {
            "想加好友或拉群？要等审核审批哟".to_string()
        };
        if blacklisted {
            to_admins.push_str("\n❗警告: 该群为黑名单群聊，请谨慎通过，若通过则自动移出黑名单");
            to_inviter.push_str("\n⚠️该群已被列入黑名单，可能不会通过审核。");
        }

        self.send_reply(bot, &to_admins).await;
        if let Err(e) = bot.send_message(&ChatRef::private(user_id), &to_inviter).await {
            tracing::warn!(user = %user_id, error = %e, "cannot reach inviter");
        }
    }

    async fn on_muted(&self, bot: &dyn Bot, group_id: &str, operator_id: &str, duration: u64) -> Result<(), BotError> {
        let group_name = self.group_name(bot, group_id).await;
        let operator = self.user_name(bot, operator_id, Some(group_id), "未知").await;
        let text = if duration == 0 {
            format!("好耶！{} 在 {}({}) 解除了我的禁言", operator, group_name, group_id)
        } else {
            format!(
                "呜呜ww..我在 {}({}) 被 {} 禁言了{}",
                group_name,
                group_id,
                operator,
                format_secs(duration)
            )
        };
        self.send_reply(bot, &text).await;
        self.auto_check(bot, group_id).await;

        if duration > self.settings.max_ban_duration {
            let text = format!("禁言时间超过{}，我退群了", format_secs(self.settings.max_ban_duration));
            self.send_reply(bot, &text).await;
            self.leave_after_delay(bot, group_id).await?;
        }
        Ok(())
    }

    async fn on_kicked(&self, bot: &dyn Bot, group_id: &str, operator_id: &str) {
        match self.blacklist.insert(group_id).await {
            Ok(true) => tracing::info!(group = %group_id, "kicked, group blacklisted"),
            Ok(false) => {}
            Err(e) => tracing::error!(group = %group_id, error = %e, "blacklist update failed"),
        }
        let group_name = self.group_name(bot, group_id).await;
        let operator = self.user_name(bot, operator_id, Some(group_id), "未知").await;
        let text = format!(
            "呜呜ww..我被 {} 踢出了 {}({})，已将此群拉进黑名单",
            operator, group_name, group_id
        );
        self.send_reply(bot, &text).await;
        self.auto_check(bot, group_id).await;
    }

    async fn on_invited(&self, bot: &dyn Bot, self_id: &str, group_id: &str, operator_id: &str) -> Result<(), BotError> {
        let group_name = self.group_name(bot, group_id).await;
        let operator = self.user_name(bot, operator_id, Some(group_id), "未知").await;
        let delay = self.settings.new_group_check_delay;
        let text = format!(
            "主人..我被 {} 拉进了 {}({})。\n我将在{}后抽查该群消息",
            operator,
            group_name,
            group_id,
            format_secs(delay.as_secs())
        );
        self.send_reply(bot, &text).await;

        if let Some((to_admins, to_group)) = self.refusal(bot, self_id, group_id, &group_name).await? {
            self.send_reply(bot, &to_admins).await;
            bot.send_message(&ChatRef::group(group_id), &to_group).await?;
            return self.leave_after_delay(bot, group_id).await;
        }

        if self.settings.auto_check_messages {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(group = %group_id, "delayed check cancelled");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
            if let Err(e) = self.check_messages(bot, group_id, DEFAULT_CHECK_COUNT, None).await {
                tracing::warn!(group = %group_id, error = %e, "delayed check failed");
            }
        }
        Ok(())
    }

    /// Why the bot should not stay in a group it was just added to
    ///
    /// Returns the admin report and the message for the group itself.
    async fn refusal(
        &self,
        bot: &dyn Bot,
        self_id: &str,
        group_id: &str,
        group_name: &str,
    ) -> Result<Option<(String, String)>, BotError> {
        if self.blacklist.contains(group_id) {
            return Ok(Some((
                format!("群聊 {}({}) 在黑名单里，我退群了", group_name, group_id),
                "把我踢了还想要我回来？退了退了".to_string(),
            )));
        }

        let joined = bot.group_list().await?.len();
        let capacity = self.settings.max_group_capacity;
        if joined > capacity {
            return Ok(Some((
                format!("我已经加了{}个群（超过了{}个），这群我退了", joined, capacity),
                format!("我最多只能加{}个群，现在已经加了{}个群，请不要拉我进群了", capacity, joined),
            )));
        }

        if self.settings.mutual_blacklist.is_empty() {
            return Ok(None);
        }
        let members = bot.group_members(group_id).await?;
        let unwanted = members
            .iter()
            .find(|m| m.as_str() != self_id && self.settings.mutual_blacklist.contains(*m));
        let Some(user_id) = unwanted else {
            return Ok(None);
        };
        let name = self.user_name(bot, user_id, Some(group_id), "未知").await;
        Ok(Some((
            format!("检测到群内存在互斥成员 {}({})，这群我退了", name, user_id),
            format!("我不想和{}({})在同一个群里，退了", name, user_id),
        )))
    }
}
