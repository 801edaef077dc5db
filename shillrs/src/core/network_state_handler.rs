//! The canonical store of network, device and favorite state.
//!
//! [`NetworkStateHandler`] owns the [`ShillPropertyHandler`], receives its
//! updates as a [`PropertyListener`], and fans changes out to registered
//! [`NetworkStateObserver`]s. Queries return snapshots, so callers never
//! hold a borrow into the store.

use log::{debug, info};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::api::models::{
    DeviceState, FavoriteState, HandlerConfig, ManagedType, NetworkState, TechnologyState,
};
use crate::client::{ShillClients, ShillResult};
use crate::core::managed_state::ManagedState;
use crate::core::shill_property_handler::{PropertyListener, ShillPropertyHandler};
use crate::types::constants::service_property;
use crate::types::property::{PropertyMap, PropertyValue};

/// Notified when the store changes. Every method defaults to a no-op.
pub trait NetworkStateObserver {
    fn network_list_changed(&self) {}
    fn device_list_changed(&self) {}
    fn favorite_list_changed(&self) {}
    /// A network's properties changed. `network` is the updated snapshot.
    fn network_properties_updated(&self, _network: &NetworkState) {}
    fn device_properties_updated(&self, _device: &DeviceState) {}
    /// Technology state or other Manager properties changed.
    fn manager_changed(&self) {}
}

#[derive(Default)]
struct Store {
    networks: Vec<NetworkState>,
    devices: Vec<DeviceState>,
    favorites: Vec<FavoriteState>,
    check_portal_list: String,
}

/// Rebuilds `list` in the order of `paths`, keeping existing entries.
fn rebuild_list<T: ManagedState>(list: &mut Vec<T>, paths: &[String]) {
    let mut previous: HashMap<String, T> = list
        .drain(..)
        .map(|entry| (entry.path().to_owned(), entry))
        .collect();
    let mut seen = HashSet::new();
    for path in paths {
        if path.is_empty() || !seen.insert(path.as_str()) {
            continue;
        }
        let entry = previous
            .remove(path)
            .unwrap_or_else(|| T::new_for_path(path));
        list.push(entry);
    }
}

fn find_mut<'a, T: ManagedState>(list: &'a mut [T], path: &str) -> Option<&'a mut T> {
    list.iter_mut().find(|entry| entry.path() == path)
}

/// Canonical local view of shill state.
pub struct NetworkStateHandler {
    property_handler: Rc<ShillPropertyHandler>,
    store: RefCell<Store>,
    observers: RefCell<Vec<Weak<dyn NetworkStateObserver>>>,
}

impl NetworkStateHandler {
    pub fn new(clients: ShillClients, config: HandlerConfig) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn PropertyListener> = weak.clone();
            Self {
                property_handler: ShillPropertyHandler::new(clients, listener, config.max_observed),
                store: RefCell::new(Store::default()),
                observers: RefCell::new(Vec::new()),
            }
        })
    }

    /// Starts syncing with shill. Must run inside a `LocalSet`.
    pub fn init(&self) {
        info!("Initializing network state");
        self.property_handler.init();
    }

    pub fn property_handler(&self) -> &Rc<ShillPropertyHandler> {
        &self.property_handler
    }

    /// Registers an observer. It is dropped from the list once it is freed.
    pub fn add_observer(&self, observer: Weak<dyn NetworkStateObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    pub fn network_state(&self, path: &str) -> Option<NetworkState> {
        self.store
            .borrow()
            .networks
            .iter()
            .find(|n| n.path == path)
            .cloned()
    }

    /// Visible networks in shill's order (connected first, then by priority).
    pub fn networks(&self) -> Vec<NetworkState> {
        self.store.borrow().networks.clone()
    }

    pub fn device_state(&self, path: &str) -> Option<DeviceState> {
        self.store
            .borrow()
            .devices
            .iter()
            .find(|d| d.path == path)
            .cloned()
    }

    pub fn devices(&self) -> Vec<DeviceState> {
        self.store.borrow().devices.clone()
    }

    pub fn favorite_state(&self, path: &str) -> Option<FavoriteState> {
        self.store
            .borrow()
            .favorites
            .iter()
            .find(|f| f.path == path)
            .cloned()
    }

    pub fn favorites(&self) -> Vec<FavoriteState> {
        self.store.borrow().favorites.clone()
    }

    /// The first network, if it is connected.
    pub fn default_network(&self) -> Option<NetworkState> {
        self.store
            .borrow()
            .networks
            .first()
            .filter(|n| n.is_connected_state())
            .cloned()
    }

    pub fn connected_network_by_type(&self, network_type: &str) -> Option<NetworkState> {
        self.store
            .borrow()
            .networks
            .iter()
            .find(|n| n.network_type == network_type && n.is_connected_state())
            .cloned()
    }

    pub fn connecting_network_by_type(&self, network_type: &str) -> Option<NetworkState> {
        self.store
            .borrow()
            .networks
            .iter()
            .find(|n| n.network_type == network_type && n.is_connecting_state())
            .cloned()
    }

    pub fn check_portal_list(&self) -> String {
        self.store.borrow().check_portal_list.clone()
    }

    pub fn technology_state(&self, technology: &str) -> TechnologyState {
        self.property_handler.technology_state(technology)
    }

    pub fn is_technology_enabled(&self, technology: &str) -> bool {
        self.property_handler.is_technology_enabled(technology)
    }

    pub fn set_technology_enabled(
        &self,
        technology: &str,
        enabled: bool,
    ) -> impl Future<Output = ShillResult<()>> + use<> {
        self.property_handler.set_technology_enabled(technology, enabled)
    }

    pub fn request_scan(&self) {
        self.property_handler.request_scan();
    }

    pub fn connect_to_best_services(&self) {
        self.property_handler.connect_to_best_services();
    }

    pub fn update_manager_properties(&self) {
        self.property_handler.update_manager_properties();
    }

    /// Re-fetches one network's properties.
    pub fn request_update_for_network(&self, path: &str) {
        self.property_handler.request_properties(ManagedType::Network, path);
    }

    pub fn set_check_portal_list(&self, check_portal_list: &str) {
        self.property_handler.set_check_portal_list(check_portal_list);
    }

    /// Refreshes the IPConfigs of a device. Returns false for unknown devices.
    pub fn refresh_ip_configs(&self, device_path: &str) -> bool {
        let Some(device) = self.device_state(device_path) else {
            debug!("RefreshIPConfigs: unknown device {device_path}");
            return false;
        };
        self.property_handler.refresh_ip_configs(&device.ip_configs);
        true
    }

    fn notify<F>(&self, notify: F)
    where
        F: Fn(&dyn NetworkStateObserver),
    {
        let live: Vec<Rc<dyn NetworkStateObserver>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            notify(observer.as_ref());
        }
    }

    fn apply_network_properties(&self, path: &str, properties: &PropertyMap) -> Option<NetworkState> {
        let mut store = self.store.borrow_mut();
        let network = find_mut(&mut store.networks, path)?;
        network.apply_properties(properties);
        Some(network.clone())
    }
}

impl PropertyListener for NetworkStateHandler {
    fn update_managed_list(&self, kind: ManagedType, paths: &[String]) {
        debug!("{kind} list: {} entries", paths.len());
        let mut store = self.store.borrow_mut();
        match kind {
            ManagedType::Network => rebuild_list(&mut store.networks, paths),
            ManagedType::Device => rebuild_list(&mut store.devices, paths),
            ManagedType::Favorite => rebuild_list(&mut store.favorites, paths),
        }
    }

    fn update_managed_state_properties(&self, kind: ManagedType, path: &str, properties: &PropertyMap) {
        match kind {
            ManagedType::Network => match self.apply_network_properties(path, properties) {
                Some(snapshot) => self.notify(|o| o.network_properties_updated(&snapshot)),
                None => debug!("Properties for unlisted network ignored: {path}"),
            },
            ManagedType::Device => {
                let snapshot = {
                    let mut store = self.store.borrow_mut();
                    find_mut(&mut store.devices, path).map(|device| {
                        device.apply_properties(properties);
                        device.clone()
                    })
                };
                match snapshot {
                    Some(device) => self.notify(|o| o.device_properties_updated(&device)),
                    None => debug!("Properties for unlisted device ignored: {path}"),
                }
            }
            ManagedType::Favorite => {
                let mut store = self.store.borrow_mut();
                // A service can be saved before ServiceCompleteList lists it.
                if find_mut(&mut store.favorites, path).is_none() {
                    debug!("Adding favorite: {path}");
                    store.favorites.push(FavoriteState::new(path));
                }
                if let Some(favorite) = find_mut(&mut store.favorites, path) {
                    favorite.apply_properties(properties);
                }
            }
        }
    }

    fn update_network_service_property(&self, path: &str, key: &str, value: &PropertyValue) {
        let (snapshot, previous_state) = {
            let mut store = self.store.borrow_mut();
            let Some(network) = find_mut(&mut store.networks, path) else {
                debug!("Property {key} for unlisted network ignored: {path}");
                return;
            };
            let previous_state = network.connection_state.clone();
            if !network.property_changed(key, value) {
                return;
            }
            (network.clone(), previous_state)
        };
        if key == service_property::STATE && snapshot.connection_state != previous_state {
            info!(
                "Network {path} state: {previous_state} -> {}",
                snapshot.connection_state
            );
        }
        self.notify(|o| o.network_properties_updated(&snapshot));
    }

    fn update_device_property(&self, path: &str, key: &str, value: &PropertyValue) {
        let snapshot = {
            let mut store = self.store.borrow_mut();
            let Some(device) = find_mut(&mut store.devices, path) else {
                debug!("Property {key} for unlisted device ignored: {path}");
                return;
            };
            if !device.property_changed(key, value) {
                return;
            }
            device.clone()
        };
        self.notify(|o| o.device_properties_updated(&snapshot));
    }

    fn profile_list_changed(&self) {
        // Profile membership is part of each network's properties.
        let paths: Vec<String> = self
            .store
            .borrow()
            .networks
            .iter()
            .map(|n| n.path.clone())
            .collect();
        debug!("Profiles changed, refreshing {} networks", paths.len());
        for path in paths {
            self.property_handler.request_properties(ManagedType::Network, &path);
        }
    }

    fn check_portal_list_changed(&self, check_portal_list: &str) {
        self.store.borrow_mut().check_portal_list = check_portal_list.to_owned();
    }

    fn notify_manager_property_changed(&self) {
        self.notify(|o| o.manager_changed());
    }

    fn managed_state_list_changed(&self, kind: ManagedType) {
        match kind {
            ManagedType::Network => self.notify(|o| o.network_list_changed()),
            ManagedType::Device => self.notify(|o| o.device_list_changed()),
            ManagedType::Favorite => self.notify(|o| o.favorite_list_changed()),
        }
    }
}
