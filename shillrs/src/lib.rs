//! Property sync and connection orchestration for the shill connection
//! manager.
//!
//! This crate keeps a local, strongly typed view of shill's networks,
//! devices, saved networks and technologies, and drives user-initiated
//! connection requests on top of it:
//!
//! - [`ShillPropertyHandler`] mirrors Manager lists and entity properties,
//!   with live subscriptions on a bounded set of networks and devices
//! - [`NetworkStateHandler`] is the canonical store and observer hub
//! - [`NetworkConnectionHandler`] validates, configures, starts and tracks
//!   connect requests, and handles disconnect and cellular activation
//! - [`NetworkProfileHandler`] tracks shill profiles and their owners
//!
//! # Example
//!
//! ```no_run
//! use shillrs::NetworkHandler;
//!
//! # async fn example() -> shillrs::Result<()> {
//! tokio::task::LocalSet::new()
//!     .run_until(async {
//!         let handler = NetworkHandler::new().await?;
//!         handler.init();
//!
//!         for network in handler.networks() {
//!             println!("{} [{}] {}", network.name, network.network_type, network.connection_state);
//!         }
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```
//!
//! # Execution model
//!
//! Handlers are `Rc`-based and spawn their continuations with
//! `tokio::task::spawn_local`, so they must live inside a
//! `tokio::task::LocalSet`. Dropping a handler cancels its outstanding
//! work; no continuation runs after its owner is gone.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging.

// Internal implementation modules
mod core;
mod dbus;

// Public API modules
pub mod api;
pub mod client;
pub mod types;

// Re-exported public API
pub use api::models::{
    BusType, CertificatePattern, ConnectState, DeviceState, Error, ErrorCode, FavoriteState,
    HandlerConfig, HandlerError, HandlerResult, IssuerSubjectPattern, ManagedType,
    NetworkProfile, NetworkState, ProfileType, ShillError, TechnologyState,
};
pub use api::network_handler::NetworkHandler;
pub use client::ShillClients;
pub use crate::core::client_cert::{CertificateStore, ClientCertType};
pub use crate::core::network_connection_handler::NetworkConnectionHandler;
pub use crate::core::network_profile_handler::{NetworkProfileHandler, NetworkProfileObserver};
pub use crate::core::network_state_handler::{NetworkStateHandler, NetworkStateObserver};
pub use crate::core::shill_property_handler::{PropertyListener, ShillPropertyHandler};
pub use types::property::{PropertyMap, PropertyMapExt, PropertyValue};

/// A specialized `Result` type for setting up the handler stack.
pub type Result<T> = std::result::Result<T, Error>;
