//! Domain entities - Core business objects with no external dependencies

pub mod user;
pub mod message;
pub mod command;
pub mod component;
pub mod job;
pub mod notice;

pub use user::User;
pub use message::{ChatRef, Content, Message};
pub use command::{Command, CommandRegistry};
pub use component::{Component, FileSource, ImageSource, Node};
pub use job::{Artifact, FailureReason, Job, JobEvent, JobOutcome, JobState};
pub use notice::{FriendInfo, GroupInfo, HistoryEntry, LikeRecord, Notice};
