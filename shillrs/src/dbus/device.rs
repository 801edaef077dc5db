//! shill Device proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedValue, Value};

/// Proxy for a shill Device (a network interface).
#[proxy(
    interface = "org.chromium.flimflam.Device",
    default_service = "org.chromium.flimflam"
)]
pub trait ShillDevice {
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;

    fn set_property(&self, name: &str, value: &Value<'_>) -> Result<()>;

    #[zbus(signal)]
    fn property_changed(&self, name: &str, value: Value<'_>) -> Result<()>;
}
