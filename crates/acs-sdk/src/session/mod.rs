//! Device session management
//!
//! Maps logical device identifiers to native login sessions and owns the
//! connectivity view (live session + last-seen) of every device.

mod manager;

pub use manager::SessionManager;
