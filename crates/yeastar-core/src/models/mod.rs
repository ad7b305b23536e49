//! Domain models for the Yeastar connector

pub mod agent;
pub mod call_log;
pub mod party;

pub use agent::{Agent, AgentResolution};
pub use call_log::{
    ApplyResult, CallDirection, CallEventRecord, CallLog, CallLogFilter, CallStatus, CallUpdate,
    UpsertOutcome,
};
pub use party::{LinkedParty, NewParty, Party, PartyType};
