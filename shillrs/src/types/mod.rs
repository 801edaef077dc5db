//! Shared value types and shill D-Bus constants.

pub mod constants;
pub mod property;
