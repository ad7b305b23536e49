//! Data Transfer Objects (DTOs) for API requests and responses

pub mod agent;
pub mod call_log;
pub mod common;
pub mod webhook;

pub use agent::*;
pub use call_log::*;
pub use common::*;
pub use webhook::*;
