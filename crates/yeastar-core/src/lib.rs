//! Yeastar Connector Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Yeastar connector. It includes:
//!
//! - Domain models (call logs, parties, agents)
//! - Repository traits implemented by `yeastar-db`
//! - Unified error handling with HTTP response mapping
//! - Application configuration
//! - Phone number normalization used for contact matching

pub mod config;
pub mod error;
pub mod models;
pub mod phone;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;
pub use phone::PhoneNormalizer;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
