//! shill Service proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedValue, Value};

/// Proxy for a shill Service.
///
/// Services are both the visible networks and the saved configurations.
/// Connection progress is reported through `PropertyChanged` on `State`.
#[proxy(
    interface = "org.chromium.flimflam.Service",
    default_service = "org.chromium.flimflam"
)]
pub trait ShillService {
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;

    fn set_property(&self, name: &str, value: &Value<'_>) -> Result<()>;

    /// Starts a connection. Returns once shill accepted the request, not
    /// once the service is connected.
    fn connect(&self) -> Result<()>;

    fn disconnect(&self) -> Result<()>;

    /// Starts carrier activation for a cellular service.
    fn activate_cellular_modem(&self, carrier: &str) -> Result<()>;

    #[zbus(signal)]
    fn property_changed(&self, name: &str, value: Value<'_>) -> Result<()>;
}
