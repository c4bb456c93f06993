//! NTA Common - Shared types for the traffic-analysis detection engine
//!
//! This crate provides the data model shared by every engine component:
//! - Traffic records as delivered by the capture probe (one schema per topic)
//! - Security alerts and their severity scale
//! - Engine configuration (detection thresholds, cache TTLs, intel sources)
//! - The common error type

pub mod alert;
pub mod config;
pub mod error;
pub mod record;

pub use alert::*;
pub use config::*;
pub use error::*;
pub use record::*;
