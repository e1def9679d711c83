//! plugbot - a chat bot hosting comic download, poke and gscore relay plugins

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
