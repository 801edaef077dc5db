use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

use crate::types::constants::{
    activation_state, limits, network_type, shill_error, state,
};

/// The kinds of shill object the property handler keeps in sync.
///
/// `Network` and `Favorite` both refer to Service objects: networks are the
/// visible services, favorites are the configured ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedType {
    Network,
    Device,
    Favorite,
}

impl Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::Device => write!(f, "Device"),
            Self::Favorite => write!(f, "Favorite"),
        }
    }
}

/// Availability of a technology as seen through the Manager technology lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnologyState {
    /// Not in `AvailableTechnologies`.
    Unavailable,
    /// Available but neither enabled nor being enabled.
    Available,
    /// Available, but shill has not finished initializing it.
    Uninitialized,
    /// An enable request is outstanding.
    Enabling,
    Enabled,
}

impl Display for TechnologyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Available => write!(f, "available"),
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Enabling => write!(f, "enabling"),
            Self::Enabled => write!(f, "enabled"),
        }
    }
}

/// Progress of an in-flight connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    /// Registered locally; shill has not acknowledged the connect yet.
    Requested,
    /// Shill acknowledged the connect.
    Started,
    /// The network has been observed in a connecting state.
    Connecting,
}

/// Error codes reported to connection request callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    Connected,
    Connecting,
    NotConnected,
    PassphraseRequired,
    ActivationRequired,
    CertificateRequired,
    ConfigurationRequired,
    AuthenticationRequired,
    ShillError,
    ConnectFailed,
    ConfigureFailed,
    ActivateFailed,
    MissingProvider,
    ConnectCanceled,
    UnknownError,
}

impl ErrorCode {
    /// The stable string form handed to UI layers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::NotConnected => "not-connected",
            Self::PassphraseRequired => "passphrase-required",
            Self::ActivationRequired => "activation-required",
            Self::CertificateRequired => "certificate-required",
            Self::ConfigurationRequired => "configuration-required",
            Self::AuthenticationRequired => "authentication-required",
            Self::ShillError => "shill-error",
            Self::ConnectFailed => "connect-failed",
            Self::ConfigureFailed => "configure-failed",
            Self::ActivateFailed => "activate-failed",
            Self::MissingProvider => "missing-provider",
            Self::ConnectCanceled => "connect-canceled",
            Self::UnknownError => "unknown-error",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection reported by shill for a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct ShillError {
    /// D-Bus error name, e.g. `org.chromium.flimflam.Error.NotFound`.
    pub name: String,
    pub message: String,
}

impl ShillError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<zbus::Error> for ShillError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::MethodError(name, message, _) => {
                Self::new(name.as_str(), message.unwrap_or_default())
            }
            other => Self::new("org.freedesktop.DBus.Error.Failed", other.to_string()),
        }
    }
}

/// Error delivered to the caller of a connection-handler operation.
///
/// `error_name` and `error_message` carry the shill error for failures that
/// came back from a remote call, or the failure detail for connects that
/// ended in a failed state. Both are empty for local precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {service_path}")]
pub struct HandlerError {
    pub code: ErrorCode,
    pub service_path: String,
    pub error_name: String,
    pub error_message: String,
}

impl HandlerError {
    pub fn new(code: ErrorCode, service_path: impl Into<String>) -> Self {
        Self {
            code,
            service_path: service_path.into(),
            error_name: String::new(),
            error_message: String::new(),
        }
    }

    /// Builds an error for a remote call that shill rejected.
    pub fn from_shill(code: ErrorCode, service_path: impl Into<String>, err: &ShillError) -> Self {
        Self::new(code, service_path).with_detail(err.name.clone(), err.message.clone())
    }

    pub fn with_detail(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_name = name.into();
        self.error_message = message.into();
        self
    }
}

/// Result of a connection-handler operation.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Errors from setting up the handler stack.
#[derive(Debug, Error)]
pub enum Error {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A connection-handler operation failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Which message bus the D-Bus clients connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusType {
    #[default]
    System,
    /// Useful against a test instance of shill.
    Session,
}

/// Configuration for the handler stack.
///
/// # Example
///
/// ```rust
/// use shillrs::HandlerConfig;
///
/// let config = HandlerConfig::new().with_max_observed(32);
/// assert_eq!(config.max_observed, 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Maximum number of networks, and separately devices, that keep a live
    /// property subscription.
    pub max_observed: usize,
    pub bus: BusType,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_observed: limits::MAX_OBSERVED,
            bus: BusType::System,
        }
    }
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_observed(mut self, max_observed: usize) -> Self {
        self.max_observed = max_observed;
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: BusType) -> Self {
        self.bus = bus;
        self
    }
}

/// Cached view of a visible service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkState {
    pub path: String,
    pub name: String,
    /// Shill service type, e.g. `wifi` or `vpn`.
    pub network_type: String,
    pub security: String,
    /// Shill connection state, e.g. `idle` or `online`.
    pub connection_state: String,
    /// Last error reported by shill for this service.
    pub error: String,
    pub connectable: bool,
    pub passphrase_required: bool,
    /// Path of the profile the service is saved in, empty if unsaved.
    pub profile_path: String,
    pub guid: String,
    pub device_path: String,
    pub signal_strength: i32,
    pub activation_state: String,
    pub vpn_provider_type: String,
    pub vpn_provider_host: String,
    pub ip_address: String,
    pub gateway: String,
    pub name_servers: Vec<String>,
    pub prefix_length: i32,
    /// Set once a full property fetch has been applied.
    pub properties_received: bool,
}

impl NetworkState {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn is_connected_state(&self) -> bool {
        is_connected_state(&self.connection_state)
    }

    pub fn is_connecting_state(&self) -> bool {
        is_connecting_state(&self.connection_state)
    }

    /// True for cellular services that still need carrier activation.
    pub fn requires_activation(&self) -> bool {
        self.network_type == network_type::CELLULAR
            && !self.activation_state.is_empty()
            && self.activation_state != activation_state::ACTIVATED
            && self.activation_state != activation_state::UNKNOWN
    }

    pub fn is_vpn(&self) -> bool {
        self.network_type == network_type::VPN
    }
}

/// Returns true for the states in which a service carries traffic.
pub fn is_connected_state(connection_state: &str) -> bool {
    matches!(connection_state, state::READY | state::PORTAL | state::ONLINE)
}

/// Returns true for the transient states on the way to connected.
pub fn is_connecting_state(connection_state: &str) -> bool {
    matches!(
        connection_state,
        state::ASSOCIATION | state::CONFIGURATION | state::CARRIER
    )
}

/// Returns true when a service error means the credentials were rejected.
pub fn is_authentication_error(error: &str) -> bool {
    matches!(
        error,
        shill_error::BAD_WEP_KEY
            | shill_error::PPP_AUTH_FAILED
            | shill_error::EAP_LOCAL_TLS_FAILED
            | shill_error::EAP_REMOTE_TLS_FAILED
            | shill_error::EAP_AUTHENTICATION_FAILED
    )
}

/// Cached view of a network device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub path: String,
    pub name: String,
    pub device_type: String,
    pub mac_address: String,
    pub powered: bool,
    pub scanning: bool,
    /// Paths of the IPConfig objects bound to this device.
    pub ip_configs: Vec<String>,
    pub properties_received: bool,
}

impl DeviceState {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Cached view of a configured (saved) service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteState {
    pub path: String,
    pub name: String,
    pub network_type: String,
    pub profile_path: String,
    pub guid: String,
    pub ui_data: String,
    pub properties_received: bool,
}

impl FavoriteState {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Whether a profile belongs to the machine or to a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    Shared,
    User,
}

/// A shill configuration profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub path: String,
    /// Hash of the owning user; empty for the shared profile.
    pub userhash: String,
}

impl NetworkProfile {
    pub fn new(path: impl Into<String>, userhash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            userhash: userhash.into(),
        }
    }

    pub fn profile_type(&self) -> ProfileType {
        if self.userhash.is_empty() {
            ProfileType::Shared
        } else {
            ProfileType::User
        }
    }
}

impl Display for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profile_type() {
            ProfileType::Shared => write!(f, "{} (shared)", self.path),
            ProfileType::User => write!(f, "{} (user {})", self.path, self.userhash),
        }
    }
}

/// Issuer or subject fields a client certificate must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IssuerSubjectPattern {
    pub common_name: String,
    pub locality: String,
    pub organization: String,
    pub organizational_unit: String,
}

impl IssuerSubjectPattern {
    pub fn is_empty(&self) -> bool {
        self.common_name.is_empty()
            && self.locality.is_empty()
            && self.organization.is_empty()
            && self.organizational_unit.is_empty()
    }
}

/// Policy-provided description of which client certificate to use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CertificatePattern {
    pub issuer: IssuerSubjectPattern,
    pub subject: IssuerSubjectPattern,
    #[serde(rename = "IssuerCARef")]
    pub issuer_ca_ref: Vec<String>,
    #[serde(rename = "EnrollmentURI")]
    pub enrollment_uri: Vec<String>,
}

impl CertificatePattern {
    pub fn is_empty(&self) -> bool {
        self.issuer.is_empty() && self.subject.is_empty() && self.issuer_ca_ref.is_empty()
    }
}
