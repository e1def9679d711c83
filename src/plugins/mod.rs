//! Plugin system for plugbot
//!
//! Each plugin registers commands and may watch every incoming message.

pub mod gscore;
pub mod jm2pdf;
pub mod manager;
pub mod poke;
pub mod rela;
pub mod trait_def;
pub mod zan;

#[cfg(test)]
pub(crate) mod test_support;

pub use manager::{PluginInfo, PluginManager};
pub use trait_def::Plugin;
