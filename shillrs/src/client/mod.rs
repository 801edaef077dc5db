//! Asynchronous clients for the shill remote objects.
//!
//! Every handler talks to shill through these traits, so they can run against
//! the real D-Bus service ([`DbusShillClient`]) or an in-memory fake in tests.
//! The traits are `?Send`: handlers are single-threaded and run on a
//! `tokio::task::LocalSet`.

mod dbus;

use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::rc::Rc;

pub use dbus::DbusShillClient;

use crate::api::models::ShillError;
use crate::types::property::{PropertyMap, PropertyValue};

/// Result of a remote call.
pub type ShillResult<T> = std::result::Result<T, ShillError>;

/// Stream of `(property name, new value)` pairs from a `PropertyChanged` signal.
pub type PropertyUpdates = Pin<Box<dyn Stream<Item = (String, PropertyValue)>>>;

/// The Manager object: global lists, technologies and profiles.
#[async_trait(?Send)]
pub trait ShillManagerClient {
    async fn get_properties(&self) -> ShillResult<PropertyMap>;
    async fn set_property(&self, name: &str, value: &PropertyValue) -> ShillResult<()>;
    async fn request_scan(&self, technology: &str) -> ShillResult<()>;
    async fn enable_technology(&self, technology: &str) -> ShillResult<()>;
    async fn disable_technology(&self, technology: &str) -> ShillResult<()>;
    /// Creates or updates a service. Returns the service path.
    async fn configure_service(&self, properties: &PropertyMap) -> ShillResult<String>;
    async fn configure_service_for_profile(
        &self,
        profile_path: &str,
        properties: &PropertyMap,
    ) -> ShillResult<String>;
    async fn connect_to_best_services(&self) -> ShillResult<()>;
    async fn receive_property_changed(&self) -> ShillResult<PropertyUpdates>;
}

/// Service objects (networks and favorites).
#[async_trait(?Send)]
pub trait ShillServiceClient {
    async fn get_properties(&self, service_path: &str) -> ShillResult<PropertyMap>;
    async fn set_property(
        &self,
        service_path: &str,
        name: &str,
        value: &PropertyValue,
    ) -> ShillResult<()>;

    /// Sets several properties, one call per key, stopping at the first failure.
    async fn set_properties(&self, service_path: &str, properties: &PropertyMap) -> ShillResult<()> {
        let mut keys: Vec<&String> = properties.keys().collect();
        keys.sort();
        for key in keys {
            self.set_property(service_path, key, &properties[key]).await?;
        }
        Ok(())
    }

    async fn connect(&self, service_path: &str) -> ShillResult<()>;
    async fn disconnect(&self, service_path: &str) -> ShillResult<()>;
    async fn activate_cellular_modem(&self, service_path: &str, carrier: &str) -> ShillResult<()>;
    async fn receive_property_changed(&self, service_path: &str) -> ShillResult<PropertyUpdates>;
}

#[async_trait(?Send)]
pub trait ShillDeviceClient {
    async fn get_properties(&self, device_path: &str) -> ShillResult<PropertyMap>;
    async fn set_property(
        &self,
        device_path: &str,
        name: &str,
        value: &PropertyValue,
    ) -> ShillResult<()>;
    async fn receive_property_changed(&self, device_path: &str) -> ShillResult<PropertyUpdates>;
}

#[async_trait(?Send)]
pub trait ShillIpConfigClient {
    async fn get_properties(&self, ipconfig_path: &str) -> ShillResult<PropertyMap>;
    async fn refresh(&self, ipconfig_path: &str) -> ShillResult<()>;
}

#[async_trait(?Send)]
pub trait ShillProfileClient {
    async fn get_properties(&self, profile_path: &str) -> ShillResult<PropertyMap>;
}

/// The set of clients a handler needs, injected at construction.
#[derive(Clone)]
pub struct ShillClients {
    pub manager: Rc<dyn ShillManagerClient>,
    pub service: Rc<dyn ShillServiceClient>,
    pub device: Rc<dyn ShillDeviceClient>,
    pub ip_config: Rc<dyn ShillIpConfigClient>,
    pub profile: Rc<dyn ShillProfileClient>,
}

impl ShillClients {
    /// Uses one object for every client role.
    pub fn from_client<C>(client: Rc<C>) -> Self
    where
        C: ShillManagerClient
            + ShillServiceClient
            + ShillDeviceClient
            + ShillIpConfigClient
            + ShillProfileClient
            + 'static,
    {
        Self {
            manager: client.clone(),
            service: client.clone(),
            device: client.clone(),
            ip_config: client.clone(),
            profile: client,
        }
    }

    /// Clients backed by shill on the given D-Bus connection.
    pub fn dbus(conn: zbus::Connection) -> Self {
        Self::from_client(Rc::new(DbusShillClient::new(conn)))
    }
}
