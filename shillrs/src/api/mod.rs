//! Public API: the [`NetworkHandler`](network_handler::NetworkHandler)
//! facade and the types it exposes.

pub mod models;
pub mod network_handler;
