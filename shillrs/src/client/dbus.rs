//! Client implementation backed by shill on D-Bus.

use async_trait::async_trait;
use futures::stream::StreamExt;
use log::{debug, warn};
use std::collections::HashMap;
use zbus::Connection;
use zvariant::{ObjectPath, OwnedValue, Value};

use super::{
    PropertyUpdates, ShillDeviceClient, ShillIpConfigClient, ShillManagerClient,
    ShillProfileClient, ShillResult, ShillServiceClient,
};
use crate::dbus::{
    ShillDeviceProxy, ShillIpConfigProxy, ShillManagerProxy, ShillProfileProxy, ShillServiceProxy,
};
use crate::types::property::{PropertyMap, PropertyValue};

/// Talks to shill over a zbus [`Connection`].
///
/// Proxies are built per call; zbus caches the underlying match rules and
/// the connection is cheap to clone.
#[derive(Debug, Clone)]
pub struct DbusShillClient {
    conn: Connection,
}

impl DbusShillClient {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn service(&self, path: &str) -> zbus::Result<ShillServiceProxy<'static>> {
        ShillServiceProxy::builder(&self.conn)
            .path(path.to_owned())?
            .build()
            .await
    }

    async fn device(&self, path: &str) -> zbus::Result<ShillDeviceProxy<'static>> {
        ShillDeviceProxy::builder(&self.conn)
            .path(path.to_owned())?
            .build()
            .await
    }
}

/// Converts a `GetProperties` reply, skipping values with no Rust mapping.
fn to_property_map(raw: HashMap<String, OwnedValue>) -> PropertyMap {
    let mut map = PropertyMap::with_capacity(raw.len());
    for (key, value) in raw {
        match PropertyValue::try_from(&*value) {
            Ok(converted) => {
                map.insert(key, converted);
            }
            Err(e) => debug!("Skipping property {key}: {e}"),
        }
    }
    map
}

fn to_variant_map(properties: &PropertyMap) -> HashMap<&str, Value<'static>> {
    properties
        .iter()
        .map(|(key, value)| (key.as_str(), value.to_variant()))
        .collect()
}

/// Maps a `PropertyChanged` signal stream to `(name, value)` pairs.
macro_rules! property_updates {
    ($stream:expr, $origin:expr) => {{
        let origin = $origin;
        let updates: PropertyUpdates = Box::pin($stream.filter_map(move |signal| {
            let origin = origin.clone();
            async move {
                let args = match signal.args() {
                    Ok(args) => args,
                    Err(e) => {
                        warn!("Malformed PropertyChanged from {origin}: {e}");
                        return None;
                    }
                };
                match PropertyValue::try_from(&args.value) {
                    Ok(value) => Some((args.name.to_string(), value)),
                    Err(e) => {
                        debug!("Ignoring {} change on {origin}: {e}", args.name);
                        None
                    }
                }
            }
        }));
        updates
    }};
}

#[async_trait(?Send)]
impl ShillManagerClient for DbusShillClient {
    async fn get_properties(&self) -> ShillResult<PropertyMap> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        Ok(to_property_map(proxy.get_properties().await?))
    }

    async fn set_property(&self, name: &str, value: &PropertyValue) -> ShillResult<()> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        proxy.set_property(name, &value.to_variant()).await?;
        Ok(())
    }

    async fn request_scan(&self, technology: &str) -> ShillResult<()> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        proxy.request_scan(technology).await?;
        Ok(())
    }

    async fn enable_technology(&self, technology: &str) -> ShillResult<()> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        proxy.enable_technology(technology).await?;
        Ok(())
    }

    async fn disable_technology(&self, technology: &str) -> ShillResult<()> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        proxy.disable_technology(technology).await?;
        Ok(())
    }

    async fn configure_service(&self, properties: &PropertyMap) -> ShillResult<String> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        let path = proxy.configure_service(to_variant_map(properties)).await?;
        Ok(path.to_string())
    }

    async fn configure_service_for_profile(
        &self,
        profile_path: &str,
        properties: &PropertyMap,
    ) -> ShillResult<String> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        let profile = ObjectPath::try_from(profile_path).map_err(zbus::Error::from)?;
        let path = proxy
            .configure_service_for_profile(&profile, to_variant_map(properties))
            .await?;
        Ok(path.to_string())
    }

    async fn connect_to_best_services(&self) -> ShillResult<()> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        proxy.connect_to_best_services().await?;
        Ok(())
    }

    async fn receive_property_changed(&self) -> ShillResult<PropertyUpdates> {
        let proxy = ShillManagerProxy::new(&self.conn).await?;
        let stream = proxy.receive_property_changed().await?;
        debug!("Subscribed to Manager PropertyChanged");
        Ok(property_updates!(stream, String::from("manager")))
    }
}

#[async_trait(?Send)]
impl ShillServiceClient for DbusShillClient {
    async fn get_properties(&self, service_path: &str) -> ShillResult<PropertyMap> {
        let proxy = self.service(service_path).await?;
        Ok(to_property_map(proxy.get_properties().await?))
    }

    async fn set_property(
        &self,
        service_path: &str,
        name: &str,
        value: &PropertyValue,
    ) -> ShillResult<()> {
        let proxy = self.service(service_path).await?;
        proxy.set_property(name, &value.to_variant()).await?;
        Ok(())
    }

    async fn connect(&self, service_path: &str) -> ShillResult<()> {
        self.service(service_path).await?.connect().await?;
        Ok(())
    }

    async fn disconnect(&self, service_path: &str) -> ShillResult<()> {
        self.service(service_path).await?.disconnect().await?;
        Ok(())
    }

    async fn activate_cellular_modem(&self, service_path: &str, carrier: &str) -> ShillResult<()> {
        self.service(service_path)
            .await?
            .activate_cellular_modem(carrier)
            .await?;
        Ok(())
    }

    async fn receive_property_changed(&self, service_path: &str) -> ShillResult<PropertyUpdates> {
        let proxy = self.service(service_path).await?;
        let stream = proxy.receive_property_changed().await?;
        debug!("Subscribed to PropertyChanged on service: {service_path}");
        Ok(property_updates!(stream, service_path.to_owned()))
    }
}

#[async_trait(?Send)]
impl ShillDeviceClient for DbusShillClient {
    async fn get_properties(&self, device_path: &str) -> ShillResult<PropertyMap> {
        let proxy = self.device(device_path).await?;
        Ok(to_property_map(proxy.get_properties().await?))
    }

    async fn set_property(
        &self,
        device_path: &str,
        name: &str,
        value: &PropertyValue,
    ) -> ShillResult<()> {
        let proxy = self.device(device_path).await?;
        proxy.set_property(name, &value.to_variant()).await?;
        Ok(())
    }

    async fn receive_property_changed(&self, device_path: &str) -> ShillResult<PropertyUpdates> {
        let proxy = self.device(device_path).await?;
        let stream = proxy.receive_property_changed().await?;
        debug!("Subscribed to PropertyChanged on device: {device_path}");
        Ok(property_updates!(stream, device_path.to_owned()))
    }
}

#[async_trait(?Send)]
impl ShillIpConfigClient for DbusShillClient {
    async fn get_properties(&self, ipconfig_path: &str) -> ShillResult<PropertyMap> {
        let proxy = ShillIpConfigProxy::builder(&self.conn)
            .path(ipconfig_path.to_owned())?
            .build()
            .await?;
        Ok(to_property_map(proxy.get_properties().await?))
    }

    async fn refresh(&self, ipconfig_path: &str) -> ShillResult<()> {
        let proxy = ShillIpConfigProxy::builder(&self.conn)
            .path(ipconfig_path.to_owned())?
            .build()
            .await?;
        proxy.refresh().await?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl ShillProfileClient for DbusShillClient {
    async fn get_properties(&self, profile_path: &str) -> ShillResult<PropertyMap> {
        let proxy = ShillProfileProxy::builder(&self.conn)
            .path(profile_path.to_owned())?
            .build()
            .await?;
        Ok(to_property_map(proxy.get_properties().await?))
    }
}
