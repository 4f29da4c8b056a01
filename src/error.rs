//! Error taxonomy (§7).
//!
//! Library code returns `Result<T, EngineError>` and propagates with `?`;
//! `anyhow::Result` is reserved for `main.rs`, where errors are final and
//! only need reporting, not branching on.
//!
//! Author: AI-Generated
//! Created: 2026-07-28

use crate::types::{Chain, PoolId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient transport failure; recovered locally via reconnection and
    /// endpoint rotation. Not surfaced past the chain subscriber unless the
    /// reconnect budget is exhausted (see `ChainFatal`).
    #[error("transport error on {chain}: {detail}")]
    Transport { chain: Chain, detail: String },

    /// Malformed log payload (wrong topic, wrong length, out-of-range
    /// values). Logged and dropped; never propagates to the registry.
    #[error("failed to decode log: {reason}")]
    Decode { reason: String },

    /// Missing token/venue referenced by a pair, or a pair whose factory
    /// reports no pool. The affected pool is omitted; the engine otherwise
    /// starts normally.
    #[error("configuration error: {detail}")]
    Config { detail: String },

    /// All endpoints exhausted or persistent subscription failure for a
    /// chain. Surfaced to the supervisor; other chains continue.
    #[error("chain {chain} failed permanently: {reason}")]
    ChainFatal { chain: Chain, reason: String },

    /// An invariant was violated after decoding (e.g. a negative reserve).
    /// Fatal for the affected detection pass only; the pool is quarantined
    /// until the next valid update.
    #[error("invariant violated on {pool_id}: {detail}")]
    InvariantViolation { pool_id: PoolId, detail: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
