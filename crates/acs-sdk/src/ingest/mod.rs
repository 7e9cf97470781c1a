//! Event ingestion
//!
//! A single background loop that drains events from connected devices into a
//! bounded buffer and retires devices that stopped answering.

mod buffer;
mod ingestor;
pub mod normalize;

pub use buffer::{EventBuffer, EVENT_BUFFER_CAPACITY};
pub use ingestor::{EventIngestor, LoopState, TickReport};
