//! Shared data models for the device integration layer

mod device;
mod event;
mod health;

pub use device::*;
pub use event::*;
pub use health::*;
