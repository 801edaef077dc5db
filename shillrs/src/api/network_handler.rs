use log::{debug, info};
use std::future::Future;
use std::rc::Rc;
use zbus::Connection;

use crate::Result;
use crate::api::models::{
    BusType, DeviceState, FavoriteState, HandlerConfig, HandlerResult, NetworkProfile,
    NetworkState, TechnologyState,
};
use crate::client::{ShillClients, ShillResult};
use crate::core::client_cert::CertificateStore;
use crate::core::network_connection_handler::NetworkConnectionHandler;
use crate::core::network_profile_handler::{NetworkProfileHandler, NetworkProfileObserver};
use crate::core::network_state_handler::{NetworkStateHandler, NetworkStateObserver};
use crate::types::property::PropertyMap;

/// High-level entry point wiring the handlers together.
///
/// Owns the canonical [`NetworkStateHandler`], the
/// [`NetworkConnectionHandler`] and the [`NetworkProfileHandler`], all
/// sharing one set of shill clients.
///
/// Handlers are single-threaded: create and use a `NetworkHandler` inside a
/// `tokio::task::LocalSet`.
///
/// # Example
///
/// ```no_run
/// use shillrs::NetworkHandler;
///
/// # async fn example() -> shillrs::Result<()> {
/// let local = tokio::task::LocalSet::new();
/// local
///     .run_until(async {
///         let handler = NetworkHandler::new().await?;
///         handler.init();
///         handler.connect_to_network("/service/1", true).await?;
///         Ok(())
///     })
///     .await
/// # }
/// ```
pub struct NetworkHandler {
    state: Rc<NetworkStateHandler>,
    connection: Rc<NetworkConnectionHandler>,
    profiles: Rc<NetworkProfileHandler>,
    clients: ShillClients,
}

impl NetworkHandler {
    /// Connects to shill on the system bus with the default configuration.
    pub async fn new() -> Result<Self> {
        Self::with_config(HandlerConfig::default()).await
    }

    /// Connects to shill on the bus selected by `config`.
    pub async fn with_config(config: HandlerConfig) -> Result<Self> {
        let conn = match config.bus {
            BusType::System => Connection::system().await?,
            BusType::Session => Connection::session().await?,
        };
        debug!("Connected to {:?} bus", config.bus);
        Ok(Self::from_clients(ShillClients::dbus(conn), config, None))
    }

    /// Builds the handler stack on arbitrary clients.
    pub fn from_clients(
        clients: ShillClients,
        config: HandlerConfig,
        cert_store: Option<Rc<dyn CertificateStore>>,
    ) -> Self {
        let state = NetworkStateHandler::new(clients.clone(), config);
        let connection = NetworkConnectionHandler::new(clients.clone(), state.clone(), cert_store);
        let profiles = NetworkProfileHandler::new(clients.clone(), Rc::downgrade(&state));
        Self {
            state,
            connection,
            profiles,
            clients,
        }
    }

    /// Starts syncing with shill.
    pub fn init(&self) {
        info!("Starting network handlers");
        self.state.init();
        self.profiles.init();
    }

    pub fn state_handler(&self) -> &Rc<NetworkStateHandler> {
        &self.state
    }

    pub fn connection_handler(&self) -> &Rc<NetworkConnectionHandler> {
        &self.connection
    }

    pub fn profile_handler(&self) -> &Rc<NetworkProfileHandler> {
        &self.profiles
    }

    pub fn add_state_observer(&self, observer: std::rc::Weak<dyn NetworkStateObserver>) {
        self.state.add_observer(observer);
    }

    pub fn add_profile_observer(&self, observer: std::rc::Weak<dyn NetworkProfileObserver>) {
        self.profiles.add_observer(observer);
    }

    pub fn networks(&self) -> Vec<NetworkState> {
        self.state.networks()
    }

    pub fn network(&self, path: &str) -> Option<NetworkState> {
        self.state.network_state(path)
    }

    pub fn devices(&self) -> Vec<DeviceState> {
        self.state.devices()
    }

    pub fn favorites(&self) -> Vec<FavoriteState> {
        self.state.favorites()
    }

    pub fn profiles(&self) -> Vec<NetworkProfile> {
        self.profiles.profiles()
    }

    pub fn technology_state(&self, technology: &str) -> TechnologyState {
        self.state.technology_state(technology)
    }

    /// See [`NetworkConnectionHandler::connect_to_network`].
    pub fn connect_to_network(
        &self,
        service_path: &str,
        check_error_state: bool,
    ) -> impl Future<Output = HandlerResult<()>> + use<> {
        self.connection.connect_to_network(service_path, check_error_state)
    }

    pub fn disconnect_network(
        &self,
        service_path: &str,
    ) -> impl Future<Output = HandlerResult<()>> + use<> {
        self.connection.disconnect_network(service_path)
    }

    pub fn activate_network(
        &self,
        service_path: &str,
        carrier: &str,
    ) -> impl Future<Output = HandlerResult<()>> + use<> {
        self.connection.activate_network(service_path, carrier)
    }

    pub fn set_technology_enabled(
        &self,
        technology: &str,
        enabled: bool,
    ) -> impl Future<Output = ShillResult<()>> + use<> {
        self.state.set_technology_enabled(technology, enabled)
    }

    pub fn request_scan(&self) {
        self.state.request_scan();
    }

    /// Forwards certificate-load completion to the connection handler.
    pub fn on_certificates_loaded(&self, initial_load: bool) {
        self.connection.on_certificates_loaded(initial_load);
    }

    /// Creates or updates a service from `properties`.
    ///
    /// Without a profile the service lands in shill's default profile.
    /// Returns the service path.
    pub async fn configure_network(
        &self,
        properties: &PropertyMap,
        profile_path: Option<&str>,
    ) -> ShillResult<String> {
        let path = match profile_path {
            Some(profile) => {
                self.clients
                    .manager
                    .configure_service_for_profile(profile, properties)
                    .await?
            }
            None => self.clients.manager.configure_service(properties).await?,
        };
        info!("Configured service {path}");
        self.state.update_manager_properties();
        Ok(path)
    }
}
