//! D-Bus proxy interfaces for shill.
//!
//! Low-level proxy definitions for the `org.chromium.flimflam` objects on
//! the system bus. Handlers never use these directly; they go through the
//! client traits in [`crate::client`].

mod device;
mod ipconfig;
mod manager;
mod profile;
mod service;

pub(crate) use device::ShillDeviceProxy;
pub(crate) use ipconfig::ShillIpConfigProxy;
pub(crate) use manager::ShillManagerProxy;
pub(crate) use profile::ShillProfileProxy;
pub(crate) use service::ShillServiceProxy;
