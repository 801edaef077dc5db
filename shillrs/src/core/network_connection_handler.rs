//! Connect, disconnect and activate requests.
//!
//! A connect request is validated against cached and then freshly fetched
//! service properties, optionally configured with client certificate
//! properties, handed to shill, and then tracked until the network reaches a
//! connected or failed state. At most one request per service is in flight;
//! one extra request may wait for certificates to load.

use futures::channel::oneshot;
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::api::models::{
    ConnectState, ErrorCode, HandlerError, HandlerResult, NetworkState, ShillError,
    is_authentication_error,
};
use crate::client::{ShillClients, ShillResult};
use crate::core::client_cert::{
    CertificateStore, ClientCertType, certificate_pattern_from_ui_data, client_cert_type,
    set_shill_properties,
};
use crate::core::network_state_handler::{NetworkStateHandler, NetworkStateObserver};
use crate::core::task::TaskScope;
use crate::types::constants::{
    network_type, provider_property, provider_type, security, service_property, shill_error, state,
};
use crate::types::property::{PropertyMap, PropertyMapExt, PropertyValue};

type Responder = oneshot::Sender<HandlerResult<()>>;

struct ConnectRequest {
    state: ConnectState,
    responder: Responder,
}

/// A request waiting for certificates to load.
struct QueuedConnect {
    service_path: String,
    responder: Responder,
}

#[derive(Default)]
struct Requests {
    pending: HashMap<String, ConnectRequest>,
    queued: Option<QueuedConnect>,
}

fn respond(responder: Responder, result: HandlerResult<()>) {
    // The caller may have dropped its future; that is not an error here.
    let _ = responder.send(result);
}

/// Fails fast on cached state before a request is registered.
fn check_cached_state(network: &NetworkState, check_error_state: bool) -> Result<(), ErrorCode> {
    if network.is_connected_state() {
        return Err(ErrorCode::Connected);
    }
    if network.is_connecting_state() {
        return Err(ErrorCode::Connecting);
    }
    if network.requires_activation() {
        return Err(ErrorCode::ActivationRequired);
    }
    if check_error_state {
        if network.error == shill_error::BAD_PASSPHRASE {
            return Err(ErrorCode::PassphraseRequired);
        }
        if is_authentication_error(&network.error) {
            return Err(ErrorCode::AuthenticationRequired);
        }
    }
    Ok(())
}

/// Checks that a VPN provider has the non-certificate settings it needs.
fn vpn_is_configured(service_path: &str, vpn_type: &str, provider: &PropertyMap) -> bool {
    if vpn_type == provider_type::OPENVPN {
        if provider.str_or_empty(provider_property::HOST).is_empty() {
            debug!("OpenVPN {service_path}: no host");
            return false;
        }
        if provider.str_or_empty(provider_property::OPENVPN_USER).is_empty() {
            debug!("OpenVPN {service_path}: no username");
            return false;
        }
        if provider
            .get_bool(provider_property::PASSPHRASE_REQUIRED)
            .unwrap_or(false)
        {
            debug!("OpenVPN {service_path}: passphrase required");
            return false;
        }
    } else {
        let psk_required = provider
            .get_bool(provider_property::L2TP_IPSEC_PSK_REQUIRED)
            .unwrap_or(false);
        let passphrase_required = provider
            .get_bool(provider_property::PASSPHRASE_REQUIRED)
            .unwrap_or(false);
        if psk_required || passphrase_required {
            debug!("VPN {service_path}: PSK or passphrase required");
            return false;
        }
    }
    true
}

/// Describes why a started connect ended in a non-connected state.
fn failure_detail(network: &NetworkState) -> String {
    if !network.error.is_empty() {
        network.error.clone()
    } else if network.connection_state == state::FAILURE {
        "Unknown".to_owned()
    } else {
        format!("Unexpected State: {}", network.connection_state)
    }
}

/// Orchestrates user-initiated connection requests.
pub struct NetworkConnectionHandler {
    clients: ShillClients,
    state_handler: Rc<NetworkStateHandler>,
    cert_store: Option<Rc<dyn CertificateStore>>,
    certificates_loaded: Cell<bool>,
    requests: RefCell<Requests>,
    tasks: TaskScope,
    weak_self: Weak<Self>,
}

impl NetworkConnectionHandler {
    /// Creates the handler and registers it as an observer of `state_handler`.
    ///
    /// Without a certificate store, services that need a client certificate
    /// fail with `certificate-required`.
    pub fn new(
        clients: ShillClients,
        state_handler: Rc<NetworkStateHandler>,
        cert_store: Option<Rc<dyn CertificateStore>>,
    ) -> Rc<Self> {
        let certificates_loaded = cert_store
            .as_ref()
            .is_some_and(|store| store.certificates_loaded());
        let handler = Rc::new_cyclic(|weak_self| Self {
            clients,
            state_handler: state_handler.clone(),
            cert_store,
            certificates_loaded: Cell::new(certificates_loaded),
            requests: RefCell::new(Requests::default()),
            tasks: TaskScope::new(),
            weak_self: weak_self.clone(),
        });
        let observer: Weak<Self> = Rc::downgrade(&handler);
        state_handler.add_observer(observer);
        handler
    }

    /// Connects to a service.
    ///
    /// The request starts immediately; the returned future resolves once the
    /// service is connected or the attempt has failed. Dropping the future
    /// does not cancel the attempt.
    ///
    /// With `check_error_state`, a cached authentication or passphrase error
    /// fails the request instead of retrying with the same credentials.
    ///
    /// # Errors
    ///
    /// Resolves to a [`HandlerError`] whose code explains the failure, e.g.
    /// `connecting` when a request for the same service is in flight,
    /// `passphrase-required`, `certificate-required` or `connect-failed`.
    pub fn connect_to_network(
        &self,
        service_path: &str,
        check_error_state: bool,
    ) -> impl Future<Output = HandlerResult<()>> + use<> {
        let (tx, rx) = oneshot::channel();
        self.start_connect(service_path, tx, check_error_state);
        let service_path = service_path.to_owned();
        async move {
            rx.await
                .unwrap_or_else(|_| Err(HandlerError::new(ErrorCode::UnknownError, service_path)))
        }
    }

    /// Disconnects a connected service.
    ///
    /// # Errors
    ///
    /// `not-found` for unknown services, `not-connected` if the cached state
    /// is not connected, `shill-error` if shill rejects the request.
    pub fn disconnect_network(
        &self,
        service_path: &str,
    ) -> impl Future<Output = HandlerResult<()>> + use<> {
        let precheck = match self.state_handler.network_state(service_path) {
            None => Err(ErrorCode::NotFound),
            Some(network) if !network.is_connected_state() => Err(ErrorCode::NotConnected),
            Some(_) => Ok(()),
        };
        let service = self.clients.service.clone();
        let service_path = service_path.to_owned();
        async move {
            if let Err(code) = precheck {
                warn!("Disconnect {service_path} rejected: {code}");
                return Err(HandlerError::new(code, service_path));
            }
            info!("Disconnect request: {service_path}");
            match service.disconnect(&service_path).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!("Disconnect {service_path} failed: {e}");
                    Err(HandlerError::from_shill(ErrorCode::ShillError, service_path, &e))
                }
            }
        }
    }

    /// Starts carrier activation of a cellular service.
    ///
    /// # Errors
    ///
    /// `not-found` for unknown services, `activate-failed` if shill rejects
    /// the request.
    pub fn activate_network(
        &self,
        service_path: &str,
        carrier: &str,
    ) -> impl Future<Output = HandlerResult<()>> + use<> {
        let known = self.state_handler.network_state(service_path).is_some();
        let service = self.clients.service.clone();
        let service_path = service_path.to_owned();
        let carrier = carrier.to_owned();
        async move {
            if !known {
                return Err(HandlerError::new(ErrorCode::NotFound, service_path));
            }
            info!("Activate request: {service_path} carrier={carrier}");
            service
                .activate_cellular_modem(&service_path, &carrier)
                .await
                .map_err(|e| {
                    error!("Activate {service_path} failed: {e}");
                    HandlerError::from_shill(ErrorCode::ActivateFailed, &service_path, &e)
                })
        }
    }

    /// True if a connect request for `service_path` is in flight.
    pub fn has_connecting_network(&self, service_path: &str) -> bool {
        self.requests.borrow().pending.contains_key(service_path)
    }

    pub fn has_pending_connect_request(&self) -> bool {
        !self.requests.borrow().pending.is_empty()
    }

    pub fn connect_state(&self, service_path: &str) -> Option<ConnectState> {
        self.requests
            .borrow()
            .pending
            .get(service_path)
            .map(|request| request.state)
    }

    /// The service waiting for certificates to load, if any.
    pub fn queued_connect_path(&self) -> Option<String> {
        self.requests
            .borrow()
            .queued
            .as_ref()
            .map(|queued| queued.service_path.clone())
    }

    /// Called by the certificate loader once certificates are available.
    ///
    /// Retries the queued request, skipping the cached error-state check.
    /// On the initial load with nothing queued, asks shill to connect the
    /// best available services.
    pub fn on_certificates_loaded(&self, initial_load: bool) {
        self.certificates_loaded.set(true);
        info!("Certificates loaded");
        let queued = self.requests.borrow_mut().queued.take();
        match queued {
            Some(queued) => {
                info!("Connecting to queued network: {}", queued.service_path);
                self.start_connect(&queued.service_path, queued.responder, false);
            }
            None if initial_load => self.state_handler.connect_to_best_services(),
            None => {}
        }
    }

    fn start_connect(&self, service_path: &str, responder: Responder, check_error_state: bool) {
        info!("Connect request: {service_path}");

        // A new explicit request supersedes one waiting for certificates.
        let superseded = self.requests.borrow_mut().queued.take();
        if let Some(queued) = superseded {
            debug!("Canceling queued connect request: {}", queued.service_path);
            respond(
                queued.responder,
                Err(HandlerError::new(ErrorCode::ConnectCanceled, queued.service_path)),
            );
        }

        if self.has_connecting_network(service_path) {
            warn!("Connect request already pending: {service_path}");
            respond(responder, Err(HandlerError::new(ErrorCode::Connecting, service_path)));
            return;
        }

        let network = self.state_handler.network_state(service_path);
        if let Some(network) = &network
            && let Err(code) = check_cached_state(network, check_error_state)
        {
            warn!("Connect request for {service_path} rejected: {code}");
            respond(responder, Err(HandlerError::new(code, service_path)));
            return;
        }

        self.requests.borrow_mut().pending.insert(
            service_path.to_owned(),
            ConnectRequest {
                state: ConnectState::Requested,
                responder,
            },
        );

        if let Some(network) = &network
            && network.connectable
            && !network.is_vpn()
        {
            self.call_shill_connect(service_path);
            return;
        }

        // Decide from fresh properties, not the cache, so recent
        // configuration changes are taken into account.
        let weak = self.weak_self.clone();
        let service = self.clients.service.clone();
        let path = service_path.to_owned();
        self.tasks.spawn(async move {
            let result = service.get_properties(&path).await;
            let Some(handler) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(properties) => {
                    handler.verify_configured_and_connect(check_error_state, &path, &properties)
                }
                Err(e) => {
                    handler.fail_pending_request(&path, ErrorCode::ConfigureFailed, Some(&e))
                }
            }
        });
    }

    fn verify_configured_and_connect(
        &self,
        check_error_state: bool,
        service_path: &str,
        properties: &PropertyMap,
    ) {
        if !self.has_connecting_network(service_path) {
            debug!("Connect request no longer pending: {service_path}");
            return;
        }

        if properties
            .get_bool(service_property::PASSPHRASE_REQUIRED)
            .unwrap_or(false)
        {
            self.fail_pending_request(service_path, ErrorCode::PassphraseRequired, None);
            return;
        }

        let service_type = properties.str_or_empty(service_property::TYPE);
        let connectable = properties
            .get_bool(service_property::CONNECTABLE)
            .unwrap_or(false);
        if connectable && service_type != network_type::VPN {
            self.call_shill_connect(service_path);
            return;
        }

        let mut vpn_type = "";
        let mut vpn_host = "";
        let mut has_client_cert_id = false;
        if service_type == network_type::VPN {
            let Some(provider) = properties.get_dict(service_property::PROVIDER) else {
                self.fail_pending_request(service_path, ErrorCode::MissingProvider, None);
                return;
            };
            vpn_type = provider.str_or_empty(provider_property::TYPE);
            vpn_host = provider.str_or_empty(provider_property::HOST);
            if vpn_type.is_empty() || vpn_host.is_empty() {
                self.fail_pending_request(service_path, ErrorCode::MissingProvider, None);
                return;
            }
            if !vpn_is_configured(service_path, vpn_type, provider) {
                self.fail_pending_request(service_path, ErrorCode::ConfigurationRequired, None);
                return;
            }
            has_client_cert_id = !provider
                .str_or_empty(provider_property::L2TP_IPSEC_CLIENT_CERT_ID)
                .is_empty();
        }

        let pattern =
            certificate_pattern_from_ui_data(properties.str_or_empty(service_property::UI_DATA));
        let cert_type = client_cert_type(
            service_type,
            properties.str_or_empty(service_property::SECURITY),
            vpn_type,
            pattern.is_some(),
            has_client_cert_id,
        );

        let mut pkcs11_id = None;
        if cert_type != ClientCertType::None
            && let Some(pattern) = &pattern
        {
            let Some(store) = self
                .cert_store
                .as_ref()
                .filter(|store| store.is_user_logged_in())
            else {
                self.fail_pending_request(service_path, ErrorCode::CertificateRequired, None);
                return;
            };
            if !self.certificates_loaded.get() {
                self.queue_pending_request(service_path);
                return;
            }
            if !store.is_hardware_backed() {
                self.fail_pending_request(service_path, ErrorCode::CertificateRequired, None);
                return;
            }
            match store.find_matching_certificate(pattern) {
                Some(id) => pkcs11_id = Some(id),
                None => {
                    debug!("No certificate matches the pattern for {service_path}");
                    self.fail_pending_request(service_path, ErrorCode::CertificateRequired, None);
                    return;
                }
            }
        }

        let mut config = PropertyMap::new();
        if cert_type != ClientCertType::None
            && let Some(store) = self
                .cert_store
                .as_ref()
                .filter(|store| store.is_hardware_backed())
        {
            set_shill_properties(
                cert_type,
                &store.tpm_token_slot(),
                &store.tpm_user_pin(),
                pkcs11_id.as_deref(),
                &mut config,
            );
        }

        if !config.is_empty() {
            // Identify the network alongside the certificate settings.
            config.insert(service_property::TYPE.to_owned(), service_type.into());
            for key in [service_property::NAME, service_property::GUID] {
                if let Some(value) = properties.get_str(key) {
                    config.insert(key.to_owned(), value.into());
                }
            }
            if service_type == network_type::VPN {
                config.insert(service_property::PROVIDER_TYPE.to_owned(), vpn_type.into());
                config.insert(service_property::PROVIDER_HOST.to_owned(), vpn_host.into());
            } else if service_type == network_type::WIFI {
                config.insert(
                    service_property::SECURITY.to_owned(),
                    PropertyValue::from(security::IEEE8021X),
                );
            }
            self.configure_and_connect(service_path, config);
            return;
        }

        if check_error_state {
            self.fail_pending_request(service_path, ErrorCode::ConfigurationRequired, None);
            return;
        }
        // Connectable may be stale; let shill report the real error.
        self.call_shill_connect(service_path);
    }

    fn configure_and_connect(&self, service_path: &str, config: PropertyMap) {
        debug!("Configuring {service_path} with {} properties", config.len());
        let weak = self.weak_self.clone();
        let service = self.clients.service.clone();
        let path = service_path.to_owned();
        self.tasks.spawn(async move {
            let result = service.set_properties(&path, &config).await;
            let Some(handler) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(()) => handler.call_shill_connect(&path),
                Err(e) => handler.fail_pending_request(&path, ErrorCode::ConfigureFailed, Some(&e)),
            }
        });
    }

    fn queue_pending_request(&self, service_path: &str) {
        let superseded = {
            let mut requests = self.requests.borrow_mut();
            let Some(request) = requests.pending.remove(service_path) else {
                return;
            };
            requests.queued.replace(QueuedConnect {
                service_path: service_path.to_owned(),
                responder: request.responder,
            })
        };
        info!("Connect request queued until certificates load: {service_path}");
        if let Some(previous) = superseded {
            respond(
                previous.responder,
                Err(HandlerError::new(ErrorCode::ConnectCanceled, previous.service_path)),
            );
        }
    }

    fn call_shill_connect(&self, service_path: &str) {
        debug!("Sending Connect to shill: {service_path}");
        let weak = self.weak_self.clone();
        let service = self.clients.service.clone();
        let path = service_path.to_owned();
        self.tasks.spawn(async move {
            let result: ShillResult<()> = service.connect(&path).await;
            let Some(handler) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(()) => handler.connect_acknowledged(&path),
                Err(e) => handler.fail_pending_request(&path, ErrorCode::ConnectFailed, Some(&e)),
            }
        });
    }

    fn connect_acknowledged(&self, service_path: &str) {
        {
            let mut requests = self.requests.borrow_mut();
            let Some(request) = requests.pending.get_mut(service_path) else {
                return;
            };
            request.state = ConnectState::Started;
        }
        info!("Connect request acknowledged: {service_path}");
        // Completion is decided by state changes, not by the acknowledgement.
        self.check_pending_request(service_path);
    }

    fn fail_pending_request(&self, service_path: &str, code: ErrorCode, shill: Option<&ShillError>) {
        let Some(request) = self.requests.borrow_mut().pending.remove(service_path) else {
            debug!("No pending request to fail for {service_path}");
            return;
        };
        let err = match shill {
            Some(e) => {
                error!("Connect to {service_path} failed: {code} ({e})");
                HandlerError::from_shill(code, service_path, e)
            }
            None => {
                warn!("Connect to {service_path} failed: {code}");
                HandlerError::new(code, service_path)
            }
        };
        respond(request.responder, Err(err));
    }

    /// Resolves the request for `service_path` if its network reached a
    /// terminal state.
    fn check_pending_request(&self, service_path: &str) {
        let (request_state, pending_count) = {
            let requests = self.requests.borrow();
            let Some(request) = requests.pending.get(service_path) else {
                return;
            };
            (request.state, requests.pending.len())
        };
        if request_state == ConnectState::Requested {
            return;
        }
        let Some(network) = self.state_handler.network_state(service_path) else {
            return;
        };

        if network.is_connecting_state() {
            if let Some(request) = self.requests.borrow_mut().pending.get_mut(service_path) {
                request.state = ConnectState::Connecting;
            }
            return;
        }

        let idle = network.connection_state == state::IDLE;
        if idle && request_state != ConnectState::Connecting {
            // Shill may report idle before it starts connecting.
            return;
        }

        let Some(request) = self.requests.borrow_mut().pending.remove(service_path) else {
            return;
        };

        if network.is_connected_state() {
            info!("Connected to {service_path}");
            respond(request.responder, Ok(()));
            return;
        }

        let err = if idle && pending_count > 1 {
            // Another connect request took over the device.
            HandlerError::new(ErrorCode::ConnectCanceled, service_path)
        } else {
            let detail = failure_detail(&network);
            HandlerError::new(ErrorCode::ConnectFailed, service_path)
                .with_detail(ErrorCode::ConnectFailed.as_str(), detail)
        };
        error!(
            "Connect to {service_path} ended in {}: {}",
            network.connection_state, err.code
        );
        respond(request.responder, Err(err));
    }

    fn check_all_pending_requests(&self) {
        let paths: Vec<String> = self.requests.borrow().pending.keys().cloned().collect();
        for path in paths {
            self.check_pending_request(&path);
        }
    }
}

impl NetworkStateObserver for NetworkConnectionHandler {
    fn network_list_changed(&self) {
        self.check_all_pending_requests();
    }

    fn network_properties_updated(&self, network: &NetworkState) {
        if self.has_connecting_network(&network.path) {
            self.check_pending_request(&network.path);
        }
    }
}
