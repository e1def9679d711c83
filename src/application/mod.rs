//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: task control, admission and permission checks
//! - Messaging: message parsing and dispatching
//! - Errors: Domain-specific errors

pub mod errors;
pub mod messaging;
pub mod services;
