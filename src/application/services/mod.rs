//! Application services - Business logic orchestration

pub mod admission;
pub mod command_service;
pub mod permission;
pub mod task_controller;

pub use admission::{Admission, AdmissionGate};
pub use command_service::CommandService;
pub use permission::{PermissionGate, PrivateOnly};
pub use task_controller::{JobSettings, TaskController};
