//! Domain layer - Core business logic with no external dependencies
//! 
//! This layer contains:
//! - Entities: Core business objects (User, Message, Component, Job)
//! - Traits: Abstractions for infrastructure (Bot, ComicDownloader, PdfEncoder)

pub mod entities;
pub mod traits;
