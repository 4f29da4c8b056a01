//! Opportunity Sink (C5).
//!
//! Deduplicates detected cycles by `(chain, canonical_cycle_id)` within a
//! rolling window, assigns each surviving opportunity an opaque id, and
//! hands it off to a bounded async publisher channel, signaling
//! backpressure rather than blocking the detector when the channel is full.
//!
//! Grounded on `data_collector/shared_state.rs`'s `is_stale` timestamp-window
//! idiom, generalized here from "is this whole snapshot stale" to "was this
//! specific cycle emitted recently".
//!
//! Author: AI-Generated
//! Created: 2026-07-28

use crate::types::{ArbitragePath, Chain};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outcome of attempting to publish one detected opportunity.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Published(u64),
    Deduplicated,
    Backpressured,
}

/// Stable, process-lifetime-unique id for each published opportunity.
fn next_opportunity_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Opportunity Sink: dedup + handoff for detected arbitrage cycles.
pub struct OpportunitySink {
    sender: mpsc::Sender<(u64, ArbitragePath)>,
    recent: DashMap<(Chain, String), DateTime<Utc>>,
    dedup_window: Duration,
}

impl OpportunitySink {
    pub fn new(sender: mpsc::Sender<(u64, ArbitragePath)>, dedup_window_secs: i64) -> Self {
        Self {
            sender,
            recent: DashMap::new(),
            dedup_window: Duration::seconds(dedup_window_secs),
        }
    }

    /// Attempt to publish one opportunity. Never awaits on backpressure —
    /// callers observe `Backpressured` and may feed it back into the
    /// detector's state machine (§4.4.4) instead of blocking the pipeline.
    pub fn publish(&self, path: ArbitragePath) -> PublishOutcome {
        let key = (path.chain, path.canonical_cycle_id());
        let now = Utc::now();

        if let Some(last_seen) = self.recent.get(&key) {
            if now.signed_duration_since(*last_seen) < self.dedup_window {
                debug!(chain = %path.chain, cycle = %key.1, "deduplicating opportunity within window");
                return PublishOutcome::Deduplicated;
            }
        }
        self.recent.insert(key, now);

        let id = next_opportunity_id();
        match self.sender.try_send((id, path)) {
            Ok(()) => PublishOutcome::Published(id),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("opportunity sink backpressured, dropping emission");
                PublishOutcome::Backpressured
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("opportunity sink receiver closed");
                PublishOutcome::Backpressured
            }
        }
    }

    /// Drop dedup bookkeeping older than twice the window; called
    /// periodically by the supervisor's housekeeping tick to bound memory.
    pub fn sweep(&self) {
        let now = Utc::now();
        let horizon = self.dedup_window * 2;
        self.recent.retain(|_, last_seen| now.signed_duration_since(*last_seen) < horizon);
    }

    pub fn tracked_cycle_count(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceLabel, PathHop, PoolId};
    use alloy::primitives::Address;

    fn path(chain: Chain, pool_id: u64) -> ArbitragePath {
        let now = Utc::now();
        ArbitragePath {
            chain,
            hops: vec![PathHop { pool_id: PoolId(pool_id), venue: "v".into(), token_in: Address::ZERO, token_out: Address::ZERO }],
            gross_profit_bps: 10,
            estimated_gas_native: 0.0,
            net_profit_bps: 8,
            estimated_profit_usd: 1.0,
            confidence_score: 0.5,
            confidence_label: ConfidenceLabel::Medium,
            detected_at: now,
            valid_until: now,
        }
    }

    #[tokio::test]
    async fn repeated_cycle_within_window_is_deduplicated() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = OpportunitySink::new(tx, 15);

        let first = sink.publish(path(Chain::Bsc, 1));
        assert!(matches!(first, PublishOutcome::Published(_)));

        let second = sink.publish(path(Chain::Bsc, 1));
        assert_eq!(second, PublishOutcome::Deduplicated);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.1.hops[0].pool_id, PoolId(1));
    }

    #[tokio::test]
    async fn distinct_cycles_both_publish() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = OpportunitySink::new(tx, 15);

        assert!(matches!(sink.publish(path(Chain::Bsc, 1)), PublishOutcome::Published(_)));
        assert!(matches!(sink.publish(path(Chain::Bsc, 2)), PublishOutcome::Published(_)));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn full_channel_reports_backpressure() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = OpportunitySink::new(tx, 15);

        assert!(matches!(sink.publish(path(Chain::Bsc, 1)), PublishOutcome::Published(_)));
        let outcome = sink.publish(path(Chain::Bsc, 2));
        assert_eq!(outcome, PublishOutcome::Backpressured);
    }

    #[tokio::test]
    async fn sweep_drops_old_entries() {
        let (tx, _rx) = mpsc::channel(8);
        let sink = OpportunitySink::new(tx, 0);
        sink.publish(path(Chain::Bsc, 1));
        assert_eq!(sink.tracked_cycle_count(), 1);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        sink.sweep();
        assert_eq!(sink.tracked_cycle_count(), 0);
    }
}
