//! Core handler logic.
//!
//! The property handler keeps the local caches in sync with shill, the
//! state handler owns those caches, and the connection and profile handlers
//! build on top of it.

pub(crate) mod client_cert;
pub(crate) mod managed_state;
pub(crate) mod network_connection_handler;
pub(crate) mod network_profile_handler;
pub(crate) mod network_state_handler;
pub(crate) mod shill_property_handler;
pub(crate) mod task;
pub(crate) mod technology;
