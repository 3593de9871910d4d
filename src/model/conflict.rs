//! Conflict record and resolution strategy types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a detected conflict is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The server value replaces the local value.
    ServerWins,
    /// The local value is kept and pushed.
    ClientWins,
    /// Deep merge with server values winning scalar conflicts.
    Merge,
    /// The side with the later timestamp wins.
    NewestWins,
    /// Surfaced to the user; the server value is returned provisionally.
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::NewestWins => "newest_wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

/// Record of one detected-and-resolved conflict.
///
/// Records are ephemeral per run; a bounded log of the most recent ones is
/// retained for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub local_version: Value,
    pub server_version: Value,
    pub local_ts: Option<DateTime<Utc>>,
    pub server_ts: Option<DateTime<Utc>>,
    pub strategy: ConflictStrategy,
    pub resolved_value: Value,
    pub resolved_at: DateTime<Utc>,
    /// False when a human must confirm the resolution (`Manual`).
    pub automatic: bool,
}
