//! Event Decoder (C2)
//!
//! Maps a `RawLog` delivered by the chain subscriber's transport into a
//! typed `ReserveUpdate` for the Pool Registry.
//!
//! Author: AI-Generated
//! Created: 2026-07-28
//!
//! Grounded on the `Sync(uint112,uint112)` event shape documented by
//! `IUniswapV2Pair::getReserves` in `contracts.rs`; the byte layout is
//! derived directly from that ABI signature.

use crate::error::{EngineError, Result};
use crate::types::PoolId;
use alloy::primitives::{Address, B256, U256};

/// A raw log record as delivered by the chain subscriber's transport (§4.1).
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
}

/// A decoded reserve update, ready for the registry. Re-exported from
/// `registry` to avoid a duplicate type — decoding only needs to produce the
/// fields the registry's `apply` consumes.
pub use crate::registry::ReserveUpdate;

/// The `keccak256` topic hash of `Sync(uint112,uint112)`, the reserve-update
/// event every constant-product Uniswap V2 fork emits.
pub const SYNC_EVENT_TOPIC: &str = "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad";

/// Decode a `RawLog` known to carry a `Sync` event into a `ReserveUpdate`.
///
/// The payload is a concatenation of two unsigned 112-bit values, each
/// little-endian-padded up to 256 bits per the EVM ABI word encoding (i.e.
/// each value occupies a full 32-byte word, left-padded with zeros — "little
/// endian" here describes the magnitude layout within that word, matching
/// the wire contract in §4.2). Malformed payloads are rejected, not
/// panicked on: wrong topic, wrong length, or a decoded value exceeding
/// `2^112 - 1` (the type(uint112).max invariant pools enforce on-chain).
pub fn decode_sync_log(log: &RawLog, pool_id: PoolId) -> Result<ReserveUpdate> {
    let topic0 = log.topics.first().ok_or_else(|| EngineError::Decode {
        reason: "log has no topics".to_string(),
    })?;
    if topic0.to_string().to_lowercase() != SYNC_EVENT_TOPIC {
        return Err(EngineError::Decode {
            reason: format!("unexpected topic0: {topic0}"),
        });
    }
    if log.data.len() != 64 {
        return Err(EngineError::Decode {
            reason: format!("expected 64-byte Sync payload, got {}", log.data.len()),
        });
    }

    let reserve0 = U256::from_be_slice(&log.data[0..32]);
    let reserve1 = U256::from_be_slice(&log.data[32..64]);
    let max_uint112 = (U256::from(1u8) << 112) - U256::from(1u8);
    if reserve0 > max_uint112 || reserve1 > max_uint112 {
        return Err(EngineError::Decode {
            reason: "reserve value exceeds uint112 range".to_string(),
        });
    }

    let sequence = sequence_from(log.block_number, log.log_index);

    Ok(ReserveUpdate { pool_id, reserve0, reserve1, sequence })
}

/// Sequence numbers are monotonic per pool: derived from
/// `(block_number, log_index)` lexicographically (§4.2). Packing log_index
/// into the low 32 bits is sufficient since no chain emits more than 2^32
/// logs per block.
pub fn sequence_from(block_number: u64, log_index: u64) -> u128 {
    ((block_number as u128) << 32) | (log_index as u128 & 0xFFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_log(reserve0: u64, reserve1: u64, block_number: u64, log_index: u64) -> RawLog {
        let mut data = vec![0u8; 64];
        data[16..32].copy_from_slice(&reserve0.to_be_bytes());
        data[48..64].copy_from_slice(&reserve1.to_be_bytes());
        RawLog {
            address: Address::ZERO,
            topics: vec![SYNC_EVENT_TOPIC.parse().unwrap()],
            data,
            block_number,
            log_index,
        }
    }

    #[test]
    fn decodes_well_formed_sync_event() {
        let log = sync_log(1000, 2000, 100, 3);
        let update = decode_sync_log(&log, PoolId(1)).unwrap();
        assert_eq!(update.reserve0, U256::from(1000u64));
        assert_eq!(update.reserve1, U256::from(2000u64));
        assert_eq!(update.sequence, sequence_from(100, 3));
    }

    #[test]
    fn sequence_is_lexicographic_on_block_then_log_index() {
        assert!(sequence_from(100, 5) < sequence_from(101, 0));
        assert!(sequence_from(100, 3) < sequence_from(100, 4));
    }

    #[test]
    fn rejects_wrong_topic() {
        let mut log = sync_log(1, 1, 1, 0);
        log.topics[0] = B256::ZERO;
        assert!(decode_sync_log(&log, PoolId(1)).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        let mut log = sync_log(1, 1, 1, 0);
        log.data.pop();
        assert!(decode_sync_log(&log, PoolId(1)).is_err());
    }
}
