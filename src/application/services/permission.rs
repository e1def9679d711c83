//! Whitelist and private-only checks for plugin commands

use std::collections::HashSet;
use crate::domain::entities::Message;
use crate::infrastructure::config::JmConfig;

/// Result of the private-only check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateOnly {
    Allow,
    /// Blocked; reply with this text
    Block(String),
}

/// Access rules for a plugin, built from its configuration
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    users: HashSet<String>,
    groups: HashSet<String>,
    private_only: bool,
    private_only_message: String,
}

impl PermissionGate {
    pub fn new(
        whitelist_users: &str,
        whitelist_groups: &str,
        private_only: bool,
        private_only_message: impl Into<String>,
    ) -> Self {
        Self {
            users: parse_list(whitelist_users),
            groups: parse_list(whitelist_groups),
            private_only,
            private_only_message: private_only_message.into(),
        }
    }

    pub fn from_config(config: &JmConfig) -> Self {
        Self::new(
            &config.whitelist_users,
            &config.whitelist_groups,
            config.private_only,
            config.private_only_group_message.clone(),
        )
    }

    /// User and group whitelists must both pass
    pub fn check_whitelist(&self, message: &Message) -> bool {
        let user_id = message.sender_id();
        let group_id = message.chat.group_id();

        let user_pass = self.users.is_empty() || self.users.contains(user_id);
        if !user_pass {
            tracing::warn!(user_id, "user not in whitelist");
        }

        let group_pass = match group_id {
            None => true,
            Some(_) if self.groups.is_empty() => true,
            Some(gid) => {
                let listed = self.groups.contains(gid);
                if !listed {
                    tracing::warn!(group_id = gid, "group not in whitelist");
                }
                listed
            }
        };

        let allowed = user_pass && group_pass;
        tracing::debug!(user_id, group_id = group_id.unwrap_or(""), allowed, "whitelist check");
        allowed
    }

    pub fn check_private_only(&self, message: &Message) -> PrivateOnly {
        if !self.private_only {
            return PrivateOnly::Allow;
        }
        match message.chat.group_id() {
            Some(gid) => {
                tracing::info!(group_id = gid, "private-only mode, blocking group request");
                PrivateOnly::Block(self.private_only_message.clone())
            }
            None => PrivateOnly::Allow,
        }
    }
}

/// Split a comma-separated id list, trimming entries and dropping empties
pub fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ChatRef, User};

    fn msg(chat: ChatRef, sender: &str) -> Message {
        Message::from_text(chat, "/jm 1").with_sender(User::new(sender))
    }

    #[test]
    fn test_parse_list_trims_and_drops_empty() {
        let list = parse_list(" 1, 2 ,,3 ,");
        assert_eq!(list.len(), 3);
        assert!(list.contains("2"));
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_empty_whitelists_allow_everyone() {
        let gate = PermissionGate::new("", "", false, "");
        assert!(gate.check_whitelist(&msg(ChatRef::group("9"), "1")));
        assert!(gate.check_whitelist(&msg(ChatRef::private("1"), "1")));
    }

    #[test]
    fn test_user_and_group_must_both_pass() {
        let gate = PermissionGate::new("1,2", "100", false, "");
        assert!(gate.check_whitelist(&msg(ChatRef::group("100"), "1")));
        assert!(!gate.check_whitelist(&msg(ChatRef::group("200"), "1")));
        assert!(!gate.check_whitelist(&msg(ChatRef::group("100"), "3")));
        // private chats skip the group list
        assert!(gate.check_whitelist(&msg(ChatRef::private("2"), "2")));
    }

    #[test]
    fn test_private_only_blocks_groups() {
        let gate = PermissionGate::new("", "", true, "私聊使用");
        assert_eq!(
            gate.check_private_only(&msg(ChatRef::group("1"), "1")),
            PrivateOnly::Block("私聊使用".to_string())
        );
        assert_eq!(gate.check_private_only(&msg(ChatRef::private("1"), "1")), PrivateOnly::Allow);

        let open = PermissionGate::new("", "", false, "x");
        assert_eq!(open.check_private_only(&msg(ChatRef::group("1"), "1")), PrivateOnly::Allow);
    }
}
