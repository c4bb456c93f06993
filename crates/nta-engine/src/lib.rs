//! NTA Detection Engine
//!
//! Consumes parsed traffic records from an event bus, one worker per
//! topic, and routes each record through the dispatcher: threat-intel
//! checks, stateless classifiers, and the stateful correlation trackers.
//! Alerts and raw records are persisted through the [`storage::EventStore`]
//! seam; background loops keep tracker and cache state bounded.

pub mod consumer;
pub mod dispatcher;
pub mod engine;
pub mod maintenance;
pub mod storage;

pub use consumer::{BusMessage, ConsumerWorker, MemBus, RecordBus, StatsSnapshot, WorkerStats};
pub use dispatcher::{Dispatcher, Topic};
pub use engine::Engine;
pub use storage::{EventStore, MemEventStore};
