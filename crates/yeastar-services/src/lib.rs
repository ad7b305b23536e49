//! Business logic services for the Yeastar connector
//!
//! # Services
//!
//! - `WebhookProcessor` - normalize, enrich, and store one delivery
//! - `EntityLinker` - Customer/Lead lookup by phone number
//! - `ExtensionMapper` - extension to user resolution with caching
//! - `CallLocks` - per-call-id serialization inside one process
//! - `SyncService` - periodic pull of extensions and CDRs from the PBX
//!
//! Services hold their dependencies as `Arc<dyn Trait>` so the API layer
//! can run them over PostgreSQL in production and over the in-memory
//! repositories in tests.

pub mod call_locks;
pub mod linker;
pub mod mapper;
pub mod pipeline;
pub mod sync;

pub use call_locks::CallLocks;
pub use linker::EntityLinker;
pub use mapper::ExtensionMapper;
pub use pipeline::{ProcessOutcome, WebhookProcessor};
pub use sync::{SyncHandle, SyncReport, SyncService};
