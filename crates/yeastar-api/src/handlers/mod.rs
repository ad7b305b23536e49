//! HTTP request handlers

pub mod agent;
pub mod call_log;
pub mod health;
pub mod sync;
pub mod webhook;

pub use agent::configure as configure_agents;
pub use call_log::configure as configure_call_logs;
pub use health::configure as configure_health;
pub use sync::configure as configure_sync;
pub use webhook::configure as configure_webhook;
