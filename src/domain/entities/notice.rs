//! Account events and directory records
//!
//! Notices arrive as messages with an empty chain. Adapters only emit the
//! ones that concern the bot's own account.

/// Platform event that is not a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    FriendRequest {
        user_id: String,
        comment: String,
        /// Opaque handle used to answer the request
        flag: String,
    },
    GroupInvite {
        user_id: String,
        group_id: String,
        comment: String,
        flag: String,
    },
    /// The bot's admin role in a group was granted or revoked
    AdminChanged { group_id: String, granted: bool },
    /// The bot was muted, or unmuted when `duration_secs` is zero
    Muted {
        group_id: String,
        operator_id: String,
        duration_secs: u64,
    },
    /// The bot was removed from a group
    Kicked { group_id: String, operator_id: String },
    /// The bot was added to a group
    Invited { group_id: String, operator_id: String },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::FriendRequest { .. } => "friend_request",
            Notice::GroupInvite { .. } => "group_invite",
            Notice::AdminChanged { .. } => "admin_changed",
            Notice::Muted { .. } => "muted",
            Notice::Kicked { .. } => "kicked",
            Notice::Invited { .. } => "invited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub group_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendInfo {
    pub user_id: String,
    pub nickname: String,
}

/// One message from a chat's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub sender_id: String,
    pub sender_name: String,
    pub chain: Vec<super::Component>,
}

/// Who liked the bot's profile, and how often
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeRecord {
    pub nickname: String,
    pub count: u32,
}
