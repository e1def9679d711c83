//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Adapters: Platform integrations (Telegram, console)
//! - Downloader: the external comic downloader
//! - Pdf: image to PDF assembly

pub mod adapters;
pub mod config;
pub mod downloader;
pub mod pdf;
