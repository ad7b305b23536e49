//! Cache key builders
//!
//! # Key Patterns
//!
//! - `agent:{extension}` - Resolved user for a PBX extension
//!
//! ```
//! use yeastar_cache::keys;
//!
//! assert_eq!(keys::agent_key("101"), "agent:101");
//! ```

/// Prefix for extension resolutions
pub const AGENT_PREFIX: &str = "agent";

/// Build the cache key for an extension's resolution
pub fn agent_key(extension: &str) -> String {
    format!("{}:{}", AGENT_PREFIX, extension.trim())
}
