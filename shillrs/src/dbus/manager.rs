//! shill Manager proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedObjectPath, OwnedValue, Value};

/// Proxy for the shill Manager, the root object at `/`.
///
/// The Manager publishes the global service, device and profile lists and
/// the technology sets. Any change to them is announced through the
/// `PropertyChanged` signal:
///
/// ```ignore
/// let mut stream = manager.receive_property_changed().await?;
/// while let Some(signal) = stream.next().await {
///     let args = signal.args()?;
///     println!("{} changed", args.name);
/// }
/// ```
#[proxy(
    interface = "org.chromium.flimflam.Manager",
    default_service = "org.chromium.flimflam",
    default_path = "/"
)]
pub trait ShillManager {
    /// Returns all Manager properties.
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;

    fn set_property(&self, name: &str, value: &Value<'_>) -> Result<()>;

    /// Requests a scan on the given technology, or all if empty.
    fn request_scan(&self, technology: &str) -> Result<()>;

    fn enable_technology(&self, technology: &str) -> Result<()>;

    fn disable_technology(&self, technology: &str) -> Result<()>;

    /// Creates or updates a service in the default profile.
    fn configure_service(&self, properties: HashMap<&str, Value<'_>>) -> Result<OwnedObjectPath>;

    /// Creates or updates a service in a specific profile.
    fn configure_service_for_profile(
        &self,
        profile: &zvariant::ObjectPath<'_>,
        properties: HashMap<&str, Value<'_>>,
    ) -> Result<OwnedObjectPath>;

    /// Asks shill to connect the best available service of each technology.
    fn connect_to_best_services(&self) -> Result<()>;

    #[zbus(signal)]
    fn property_changed(&self, name: &str, value: Value<'_>) -> Result<()>;
}
