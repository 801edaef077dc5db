//! shill IPConfig proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::OwnedValue;

/// Proxy for an IPConfig object holding a device's address configuration.
#[proxy(
    interface = "org.chromium.flimflam.IPConfig",
    default_service = "org.chromium.flimflam"
)]
pub trait ShillIpConfig {
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;

    /// Renews the DHCP lease or re-applies the static configuration.
    fn refresh(&self) -> Result<()>;
}
