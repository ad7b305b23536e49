//! Yeastar PBX integration
//!
//! - [`webhook`]: request body parsing with envelope unwrapping and field aliases
//! - [`normalize`]: payload to [`CallUpdate`](yeastar_core::models::CallUpdate) mapping
//! - [`client`]: OpenAPI client used by the periodic sync
//! - [`page`]: helpers for the OpenAPI list response shapes

pub mod client;
pub mod error;
pub mod normalize;
pub mod page;
pub mod webhook;

pub use client::{PbxApi, PbxClient};
pub use error::PbxError;
pub use normalize::{parse_timestamp, EventNormalizer, NormalizeError};
pub use webhook::WebhookPayload;
