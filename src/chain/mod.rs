//! Chain Subscriber (C1) and Event Decoder (C2).
//!
//! Author: AI-Generated
//! Created: 2026-07-28

pub mod decode;
pub mod subscriber;

pub use decode::{decode_sync_log, RawLog};
pub use subscriber::{ChainSubscriber, ReconnectPolicy};
