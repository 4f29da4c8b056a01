//! Arbitrage Detector (C4).
//!
//! Author: AI-Generated
//! Created: 2026-07-28

pub mod confidence;
pub mod cycles;
pub mod pairwise;
pub mod state;

pub use confidence::score as confidence_score;
pub use state::DetectorState;
