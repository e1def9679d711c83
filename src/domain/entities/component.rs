//! Message components
//!
//! A chat message is a chain of components. Every adapter and plugin matches
//! on the full set, so adding a kind is a compile error until each consumer
//! decides what to do with it.

use std::path::PathBuf;

/// Where an image's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote URL (http/https)
    Url(String),
    /// File on local disk
    Path(PathBuf),
    /// Base64 payload without any `base64://` scheme prefix
    Base64(String),
}

/// Where a file attachment's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Path(PathBuf),
    Url(String),
}

/// One entry of a forward-node group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub chain: Vec<Component>,
    /// Shown as the bubble's author when set
    pub sender: Option<(String, String)>,
}

impl Node {
    pub fn new(chain: Vec<Component>) -> Self {
        Self { chain, sender: None }
    }

    /// Attribute the node to `user_id` displayed as `name`
    pub fn with_sender(mut self, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.sender = Some((user_id.into(), name.into()));
        self
    }
}

/// A single piece of a message chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Text(String),
    Image(ImageSource),
    /// Mention of a user
    At { user_id: String },
    File { name: String, source: FileSource },
    /// Quoted reply, carrying the quoted message's own chain when known
    Reply { id: String, chain: Vec<Component> },
    /// Group of forward nodes, rendered as separate bubbles where supported
    Nodes(Vec<Node>),
    /// Platform emoji by id
    Face { id: i64 },
    /// Poke notice aimed at `target_id`
    Poke { target_id: String },
}

impl Component {
    pub fn text(text: impl Into<String>) -> Self {
        Component::Text(text.into())
    }

    pub fn at(user_id: impl Into<String>) -> Self {
        Component::At { user_id: user_id.into() }
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Component::File {
            name: name.into(),
            source: FileSource::Path(path.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Component::Text(_) => "text",
            Component::Image(_) => "image",
            Component::At { .. } => "at",
            Component::File { .. } => "file",
            Component::Reply { .. } => "reply",
            Component::Nodes(_) => "nodes",
            Component::Face { .. } => "face",
            Component::Poke { .. } => "poke",
        }
    }
}

/// Concatenated text of a chain, ignoring non-text components
pub fn plain_text(chain: &[Component]) -> String {
    chain
        .iter()
        .filter_map(|c| match c {
            Component::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}
