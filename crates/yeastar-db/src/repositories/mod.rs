//! Repository implementations
//!
//! Concrete implementations of the repository traits defined in
//! yeastar-core, using sqlx for PostgreSQL access.

pub mod agent_repo;
pub mod call_log_repo;
pub mod party_repo;

pub use agent_repo::PgAgentRepository;
pub use call_log_repo::PgCallLogRepository;
pub use party_repo::PgPartyRepository;
