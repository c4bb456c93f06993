//! Detection layer: stateless heuristic classifiers and stateful
//! correlation trackers.
//!
//! Heuristics score a single record deterministically. The trackers keep
//! short-lived per-entity state behind their own locks and are shared by
//! all consumer workers; background maintenance evicts stale entries.

pub mod heuristics;
pub mod killchain;
pub mod lateral;

pub use killchain::{KillChainPhase, KillChainTracker};
pub use lateral::LateralMovementTracker;
