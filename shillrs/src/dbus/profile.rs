//! shill Profile proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::OwnedValue;

/// Proxy for a shill Profile, a store of saved service configurations.
#[proxy(
    interface = "org.chromium.flimflam.Profile",
    default_service = "org.chromium.flimflam"
)]
pub trait ShillProfile {
    /// Profile properties, including `UserHash` for user profiles.
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;
}
