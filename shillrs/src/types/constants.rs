//! Constants for the shill (flimflam) D-Bus API.
//!
//! Property names, connection states and error strings exchanged with the
//! connection manager. Shill identifies everything by string, so these are
//! grouped by the object they belong to.

/// Well-known bus name and object paths.
pub mod dbus {
    pub const SERVICE_NAME: &str = "org.chromium.flimflam";
    pub const MANAGER_PATH: &str = "/";
    pub const ERROR_PREFIX: &str = "org.chromium.flimflam.Error.";
}

/// Properties of the Manager object.
pub mod manager_property {
    pub const SERVICES: &str = "Services";
    pub const SERVICE_COMPLETE_LIST: &str = "ServiceCompleteList";
    pub const DEVICES: &str = "Devices";
    pub const AVAILABLE_TECHNOLOGIES: &str = "AvailableTechnologies";
    pub const ENABLED_TECHNOLOGIES: &str = "EnabledTechnologies";
    pub const UNINITIALIZED_TECHNOLOGIES: &str = "UninitializedTechnologies";
    pub const PROFILES: &str = "Profiles";
    pub const CHECK_PORTAL_LIST: &str = "CheckPortalList";
}

/// Properties of Service objects.
pub mod service_property {
    pub const NAME: &str = "Name";
    pub const TYPE: &str = "Type";
    pub const STATE: &str = "State";
    pub const ERROR: &str = "Error";
    pub const CONNECTABLE: &str = "Connectable";
    pub const PASSPHRASE_REQUIRED: &str = "PassphraseRequired";
    pub const PROFILE: &str = "Profile";
    pub const GUID: &str = "GUID";
    pub const SECURITY: &str = "Security";
    pub const DEVICE: &str = "Device";
    pub const STRENGTH: &str = "Strength";
    pub const IP_CONFIG: &str = "IPConfig";
    pub const PROVIDER: &str = "Provider";
    pub const PROVIDER_TYPE: &str = "Provider.Type";
    pub const PROVIDER_HOST: &str = "Provider.Host";
    pub const ACTIVATION_STATE: &str = "Cellular.ActivationState";
    pub const UI_DATA: &str = "UIData";
}

/// Keys inside a VPN service's `Provider` dictionary.
pub mod provider_property {
    pub const TYPE: &str = "Type";
    pub const HOST: &str = "Host";
    pub const OPENVPN_USER: &str = "OpenVPN.User";
    pub const PASSPHRASE_REQUIRED: &str = "PassphraseRequired";
    pub const L2TP_IPSEC_PSK_REQUIRED: &str = "L2TPIPsec.PSKRequired";
    pub const L2TP_IPSEC_CLIENT_CERT_ID: &str = "L2TPIPsec.ClientCertID";
}

/// Properties written when configuring client certificates.
pub mod client_cert_property {
    pub const OPENVPN_PIN: &str = "OpenVPN.PIN";
    pub const OPENVPN_CLIENT_CERT_ID: &str = "OpenVPN.Pkcs11.ID";
    pub const L2TP_IPSEC_PIN: &str = "L2TPIPsec.PIN";
    pub const L2TP_IPSEC_CLIENT_CERT_SLOT: &str = "L2TPIPsec.ClientCertSlot";
    pub const L2TP_IPSEC_CLIENT_CERT_ID: &str = "L2TPIPsec.ClientCertID";
    pub const EAP_PIN: &str = "EAP.PIN";
    pub const EAP_CERT_ID: &str = "EAP.CertID";
    pub const EAP_KEY_ID: &str = "EAP.KeyID";
}

/// Properties of Device objects.
pub mod device_property {
    pub const NAME: &str = "Name";
    pub const TYPE: &str = "Type";
    pub const ADDRESS: &str = "Address";
    pub const POWERED: &str = "Powered";
    pub const SCANNING: &str = "Scanning";
    pub const IP_CONFIGS: &str = "IPConfigs";
}

/// Properties of IPConfig objects.
///
/// When forwarded to a network they are prefixed with [`PREFIX`], so
/// `Address` becomes `IPConfig.Address`.
pub mod ipconfig_property {
    pub const PREFIX: &str = "IPConfig.";
    pub const ADDRESS: &str = "Address";
    pub const GATEWAY: &str = "Gateway";
    pub const NAME_SERVERS: &str = "NameServers";
    pub const PREFIXLEN: &str = "Prefixlen";

    /// Keys copied from an IPConfig object onto its network.
    pub const FORWARDED: [&str; 4] = [ADDRESS, GATEWAY, NAME_SERVERS, PREFIXLEN];
}

/// Properties of Profile objects.
pub mod profile_property {
    pub const USER_HASH: &str = "UserHash";
    /// Path of the machine-wide profile.
    pub const SHARED_PROFILE_PATH: &str = "/profile/default";
}

/// Service connection states.
pub mod state {
    pub const IDLE: &str = "idle";
    pub const CARRIER: &str = "carrier";
    pub const ASSOCIATION: &str = "association";
    pub const CONFIGURATION: &str = "configuration";
    pub const READY: &str = "ready";
    pub const PORTAL: &str = "portal";
    pub const ONLINE: &str = "online";
    pub const FAILURE: &str = "failure";
    pub const ACTIVATION_FAILURE: &str = "activation-failure";
    pub const DISCONNECT: &str = "disconnect";
}

/// Error strings reported in a service's `Error` property.
pub mod shill_error {
    pub const BAD_PASSPHRASE: &str = "bad-passphrase";
    pub const BAD_WEP_KEY: &str = "bad-wepkey";
    pub const PPP_AUTH_FAILED: &str = "ppp-auth-failed";
    pub const EAP_LOCAL_TLS_FAILED: &str = "eap-local-tls-failed";
    pub const EAP_REMOTE_TLS_FAILED: &str = "eap-remote-tls-failed";
    pub const EAP_AUTHENTICATION_FAILED: &str = "eap-authentication-failed";
}

/// Service and technology type names.
pub mod network_type {
    pub const ETHERNET: &str = "ethernet";
    pub const WIFI: &str = "wifi";
    pub const WIMAX: &str = "wimax";
    pub const CELLULAR: &str = "cellular";
    pub const BLUETOOTH: &str = "bluetooth";
    pub const VPN: &str = "vpn";
}

/// Values of a service's `Security` property.
pub mod security {
    pub const NONE: &str = "none";
    pub const WEP: &str = "wep";
    pub const PSK: &str = "psk";
    pub const IEEE8021X: &str = "802_1x";
}

/// VPN provider types.
pub mod provider_type {
    pub const OPENVPN: &str = "openvpn";
    pub const L2TP_IPSEC: &str = "l2tpipsec";
}

/// Cellular activation states.
pub mod activation_state {
    pub const ACTIVATED: &str = "activated";
    pub const ACTIVATING: &str = "activating";
    pub const NOT_ACTIVATED: &str = "not-activated";
    pub const PARTIALLY_ACTIVATED: &str = "partially-activated";
    pub const UNKNOWN: &str = "unknown";
}

/// Handler limits.
pub mod limits {
    /// Maximum number of networks or devices with a live property subscription.
    pub const MAX_OBSERVED: usize = 100;
}
