//! Synchronization of local state with the shill Manager and its entities.
//!
//! [`ShillPropertyHandler`] watches the Manager for list and technology
//! changes, fetches properties for every listed entity, keeps live
//! subscriptions on a bounded number of networks and devices, and forwards
//! everything it learns to a [`PropertyListener`].

use futures::stream::StreamExt;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::{Rc, Weak};
use tokio_util::sync::DropGuard;

use crate::api::models::{ManagedType, ShillError, TechnologyState};
use crate::client::{ShillClients, ShillResult};
use crate::core::task::TaskScope;
use crate::core::technology::TechnologySets;
use crate::types::constants::{ipconfig_property, manager_property, service_property};
use crate::types::property::{PropertyMap, PropertyValue};

/// Receives everything the property handler learns from shill.
///
/// Implemented by the canonical store. Methods are called synchronously from
/// the handler's tasks; implementations must not block.
pub trait PropertyListener {
    /// A Manager list for `kind` changed to `paths`.
    fn update_managed_list(&self, kind: ManagedType, paths: &[String]);

    /// A full property fetch for one entity completed.
    fn update_managed_state_properties(&self, kind: ManagedType, path: &str, properties: &PropertyMap);

    /// A single network property changed. IPConfig values arrive as
    /// `IPConfig.<key>`.
    fn update_network_service_property(&self, path: &str, key: &str, value: &PropertyValue);

    fn update_device_property(&self, path: &str, key: &str, value: &PropertyValue);

    fn profile_list_changed(&self);

    fn check_portal_list_changed(&self, check_portal_list: &str);

    /// Technology sets or other Manager state changed.
    fn notify_manager_property_changed(&self);

    /// Every outstanding fetch for `kind` has completed.
    fn managed_state_list_changed(&self, kind: ManagedType);
}

/// Live subscriptions keyed by entity path.
///
/// Dropping an entry cancels its subscription task.
#[derive(Default)]
struct ObservedEntityRegistry {
    entries: HashMap<String, DropGuard>,
}

impl ObservedEntityRegistry {
    /// Rebuilds the registry for `paths`, keeping existing subscriptions and
    /// creating new ones, up to `cap` entries. Returns the number created.
    fn update<F>(&mut self, paths: &[String], cap: usize, mut subscribe: F) -> usize
    where
        F: FnMut(&str) -> DropGuard,
    {
        let mut next = HashMap::new();
        let mut created = 0;
        for path in paths {
            if next.len() >= cap {
                break;
            }
            if path.is_empty() || next.contains_key(path) {
                continue;
            }
            let guard = match self.entries.remove(path) {
                Some(existing) => existing,
                None => {
                    created += 1;
                    subscribe(path)
                }
            };
            next.insert(path.clone(), guard);
        }
        // Whatever is left in the old map drops here, unsubscribing it.
        self.entries = next;
        created
    }

    fn remove(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }
}

#[derive(Default)]
struct SyncState {
    technologies: TechnologySets,
    observed_networks: ObservedEntityRegistry,
    observed_devices: ObservedEntityRegistry,
    /// Property fetches in flight, per type.
    pending_updates: HashMap<ManagedType, HashSet<String>>,
    /// Paths seen in the most recent list update, per type.
    requested_updates: HashMap<ManagedType, HashSet<String>>,
    manager_subscription: Option<DropGuard>,
}

impl SyncState {
    fn pending_is_empty(&self, kind: ManagedType) -> bool {
        self.pending_updates.get(&kind).is_none_or(HashSet::is_empty)
    }

    fn was_requested(&self, kind: ManagedType, path: &str) -> bool {
        self.requested_updates
            .get(&kind)
            .is_some_and(|paths| paths.contains(path))
    }
}

/// Keeps local network, device and favorite state in sync with shill.
///
/// Create with [`ShillPropertyHandler::new`], then call
/// [`init`](Self::init) from inside a `tokio::task::LocalSet`.
pub struct ShillPropertyHandler {
    clients: ShillClients,
    listener: Weak<dyn PropertyListener>,
    max_observed: usize,
    state: RefCell<SyncState>,
    tasks: TaskScope,
    weak_self: Weak<Self>,
}

impl ShillPropertyHandler {
    /// Creates a handler reporting to `listener`.
    ///
    /// The listener is held weakly; once it is gone, updates are dropped.
    pub fn new(
        clients: ShillClients,
        listener: Weak<dyn PropertyListener>,
        max_observed: usize,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            clients,
            listener,
            max_observed,
            state: RefCell::new(SyncState::default()),
            tasks: TaskScope::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Subscribes to Manager property changes and requests the initial
    /// Manager properties.
    pub fn init(&self) {
        let weak = self.weak_self.clone();
        let manager = self.clients.manager.clone();
        let guard = self.tasks.spawn_guarded(async move {
            let mut updates = match manager.receive_property_changed().await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Failed to subscribe to Manager property changes: {e}");
                    return;
                }
            };
            while let Some((key, value)) = updates.next().await {
                let Some(handler) = weak.upgrade() else {
                    break;
                };
                handler.manager_property_changed(&key, &value);
            }
            debug!("Manager property stream ended");
        });
        self.state.borrow_mut().manager_subscription = Some(guard);
        self.update_manager_properties();
    }

    /// Requests a full Manager property refresh.
    pub fn update_manager_properties(&self) {
        debug!("Requesting Manager properties");
        let weak = self.weak_self.clone();
        let manager = self.clients.manager.clone();
        self.tasks.spawn(async move {
            let result = manager.get_properties().await;
            if let Some(handler) = weak.upgrade() {
                handler.manager_properties_callback(result);
            }
        });
    }

    /// Returns true if `technology` is listed as available.
    pub fn is_technology_available(&self, technology: &str) -> bool {
        self.state.borrow().technologies.is_available(technology)
    }

    pub fn is_technology_enabled(&self, technology: &str) -> bool {
        self.state.borrow().technologies.is_enabled(technology)
    }

    pub fn is_technology_enabling(&self, technology: &str) -> bool {
        self.state.borrow().technologies.is_enabling(technology)
    }

    pub fn is_technology_uninitialized(&self, technology: &str) -> bool {
        self.state.borrow().technologies.is_uninitialized(technology)
    }

    pub fn technology_state(&self, technology: &str) -> TechnologyState {
        self.state.borrow().technologies.state(technology)
    }

    /// Enables or disables a technology.
    ///
    /// The local technology sets are updated before this returns: enabling
    /// marks the technology as `Enabling`, disabling removes it from both the
    /// enabled and enabling sets. The returned future resolves with shill's
    /// answer. A failed enable is reverted; a failed disable is not.
    pub fn set_technology_enabled(
        &self,
        technology: &str,
        enabled: bool,
    ) -> impl Future<Output = ShillResult<()>> + use<> {
        let (tx, rx) = futures::channel::oneshot::channel();
        let technology = technology.to_owned();
        {
            let mut state = self.state.borrow_mut();
            if enabled {
                state.technologies.begin_enabling(&technology);
            } else {
                state.technologies.disable(&technology);
            }
        }
        self.notify_manager_changed();

        let weak = self.weak_self.clone();
        let manager = self.clients.manager.clone();
        let requested = technology.clone();
        self.tasks.spawn(async move {
            let result = if enabled {
                info!("Enabling technology: {technology}");
                manager.enable_technology(&technology).await
            } else {
                info!("Disabling technology: {technology}");
                manager.disable_technology(&technology).await
            };
            if let Err(e) = &result {
                error!("Failed to set {technology} enabled={enabled}: {e}");
                if enabled && let Some(handler) = weak.upgrade() {
                    handler.state.borrow_mut().technologies.enable_failed(&technology);
                    handler.notify_manager_changed();
                }
            }
            let _ = tx.send(result);
        });

        async move {
            rx.await.unwrap_or_else(|_| {
                Err(ShillError::new(
                    "org.freedesktop.DBus.Error.NoReply",
                    format!("handler dropped before {requested} completed"),
                ))
            })
        }
    }

    /// Requests a scan on all technologies.
    pub fn request_scan(&self) {
        let manager = self.clients.manager.clone();
        self.tasks.spawn(async move {
            if let Err(e) = manager.request_scan("").await {
                warn!("RequestScan failed: {e}");
            }
        });
    }

    /// Asks shill to connect the best available services.
    pub fn connect_to_best_services(&self) {
        let manager = self.clients.manager.clone();
        self.tasks.spawn(async move {
            if let Err(e) = manager.connect_to_best_services().await {
                warn!("ConnectToBestServices failed: {e}");
            }
        });
    }

    /// Sets the technologies on which shill performs portal detection.
    pub fn set_check_portal_list(&self, check_portal_list: &str) {
        let manager = self.clients.manager.clone();
        let value = PropertyValue::from(check_portal_list);
        self.tasks.spawn(async move {
            if let Err(e) = manager
                .set_property(manager_property::CHECK_PORTAL_LIST, &value)
                .await
            {
                warn!("Failed to set CheckPortalList: {e}");
            }
        });
    }

    /// Refreshes each IPConfig object, e.g. after a device resumed.
    pub fn refresh_ip_configs(&self, ipconfig_paths: &[String]) {
        for path in ipconfig_paths {
            let ip_config = self.clients.ip_config.clone();
            let path = path.clone();
            self.tasks.spawn(async move {
                if let Err(e) = ip_config.refresh(&path).await {
                    warn!("IPConfig refresh failed for {path}: {e}");
                }
            });
        }
    }

    /// Fetches the properties of one entity unless a fetch is already in flight.
    pub fn request_properties(&self, kind: ManagedType, path: &str) {
        let inserted = self
            .state
            .borrow_mut()
            .pending_updates
            .entry(kind)
            .or_default()
            .insert(path.to_owned());
        if !inserted {
            debug!("{kind} properties already pending: {path}");
            return;
        }

        let weak = self.weak_self.clone();
        let clients = self.clients.clone();
        let path = path.to_owned();
        self.tasks.spawn(async move {
            let result = match kind {
                ManagedType::Network | ManagedType::Favorite => {
                    clients.service.get_properties(&path).await
                }
                ManagedType::Device => clients.device.get_properties(&path).await,
            };
            if let Some(handler) = weak.upgrade() {
                handler.get_properties_callback(kind, &path, result);
            }
        });
    }

    /// Number of entities of `kind` with a live property subscription.
    pub fn observed_count(&self, kind: ManagedType) -> usize {
        let state = self.state.borrow();
        match kind {
            ManagedType::Network => state.observed_networks.len(),
            ManagedType::Device => state.observed_devices.len(),
            ManagedType::Favorite => 0,
        }
    }

    pub fn is_observed(&self, kind: ManagedType, path: &str) -> bool {
        let state = self.state.borrow();
        match kind {
            ManagedType::Network => state.observed_networks.contains(path),
            ManagedType::Device => state.observed_devices.contains(path),
            ManagedType::Favorite => false,
        }
    }

    /// True while any property fetch of `kind` is in flight.
    pub fn has_pending_updates(&self, kind: ManagedType) -> bool {
        !self.state.borrow().pending_is_empty(kind)
    }

    fn listener(&self) -> Option<Rc<dyn PropertyListener>> {
        self.listener.upgrade()
    }

    fn notify_manager_changed(&self) {
        if let Some(listener) = self.listener() {
            listener.notify_manager_property_changed();
        }
    }

    fn manager_properties_callback(&self, result: ShillResult<PropertyMap>) {
        let properties = match result {
            Ok(properties) => properties,
            Err(e) => {
                warn!("Failed to get Manager properties: {e}");
                return;
            }
        };
        debug!("Manager properties received: {} keys", properties.len());

        // The service lists go last so favorites can skip paths already
        // requested as networks.
        let mut services = None;
        let mut complete_list = None;
        for (key, value) in &properties {
            match key.as_str() {
                manager_property::SERVICES => services = Some(value),
                manager_property::SERVICE_COMPLETE_LIST => complete_list = Some(value),
                _ => self.apply_manager_property(key, value),
            }
        }
        if let Some(value) = services {
            self.apply_manager_property(manager_property::SERVICES, value);
        }
        if let Some(value) = complete_list {
            self.apply_manager_property(manager_property::SERVICE_COMPLETE_LIST, value);
        }
        self.check_pending_state_list_updates(None);
    }

    /// Handles a Manager `PropertyChanged` signal.
    fn manager_property_changed(&self, key: &str, value: &PropertyValue) {
        self.apply_manager_property(key, value);
        self.check_pending_state_list_updates(Some(key));
    }

    fn apply_manager_property(&self, key: &str, value: &PropertyValue) {
        let Some(listener) = self.listener() else {
            return;
        };
        match key {
            manager_property::SERVICES => {
                if let Some(paths) = list_value(key, value) {
                    listener.update_managed_list(ManagedType::Network, paths);
                    self.update_properties(ManagedType::Network, paths);
                    self.update_observed(ManagedType::Network, paths);
                }
            }
            manager_property::SERVICE_COMPLETE_LIST => {
                if let Some(paths) = list_value(key, value) {
                    listener.update_managed_list(ManagedType::Favorite, paths);
                    self.update_properties(ManagedType::Favorite, paths);
                }
            }
            manager_property::DEVICES => {
                if let Some(paths) = list_value(key, value) {
                    listener.update_managed_list(ManagedType::Device, paths);
                    self.update_properties(ManagedType::Device, paths);
                    self.update_observed(ManagedType::Device, paths);
                }
            }
            manager_property::AVAILABLE_TECHNOLOGIES => {
                if let Some(list) = list_value(key, value) {
                    self.state.borrow_mut().technologies.replace_available(list);
                    listener.notify_manager_property_changed();
                }
            }
            manager_property::ENABLED_TECHNOLOGIES => {
                if let Some(list) = list_value(key, value) {
                    self.state.borrow_mut().technologies.replace_enabled(list);
                    listener.notify_manager_property_changed();
                }
            }
            manager_property::UNINITIALIZED_TECHNOLOGIES => {
                if let Some(list) = list_value(key, value) {
                    self.state.borrow_mut().technologies.replace_uninitialized(list);
                    listener.notify_manager_property_changed();
                }
            }
            manager_property::PROFILES => listener.profile_list_changed(),
            manager_property::CHECK_PORTAL_LIST => match value.as_str() {
                Some(list) => {
                    listener.check_portal_list_changed(list);
                    listener.notify_manager_property_changed();
                }
                None => warn!("CheckPortalList is not a string"),
            },
            _ => debug!("Ignored Manager property: {key}"),
        }
    }

    /// Requests properties for paths that were not in the previous list.
    fn update_properties(&self, kind: ManagedType, paths: &[String]) {
        let to_request = {
            let mut state = self.state.borrow_mut();
            let mut requested = HashSet::new();
            let mut to_request = Vec::new();
            for path in paths {
                if path.is_empty() {
                    continue;
                }
                // A favorite that is also visible is fetched as a network.
                if kind == ManagedType::Favorite && state.was_requested(ManagedType::Network, path) {
                    continue;
                }
                if !state.was_requested(kind, path) {
                    to_request.push(path.clone());
                }
                requested.insert(path.clone());
            }
            state.requested_updates.insert(kind, requested);
            to_request
        };
        debug!(
            "UpdateProperties {kind}: {} entries, {} new",
            paths.len(),
            to_request.len()
        );
        for path in to_request {
            self.request_properties(kind, &path);
        }
    }

    fn update_observed(&self, kind: ManagedType, paths: &[String]) {
        let mut state = self.state.borrow_mut();
        let registry = match kind {
            ManagedType::Network => &mut state.observed_networks,
            ManagedType::Device => &mut state.observed_devices,
            ManagedType::Favorite => return,
        };
        if paths.len() > self.max_observed {
            debug!(
                "Observing only {} of {} {kind} entries",
                self.max_observed,
                paths.len()
            );
        }
        let created = registry.update(paths, self.max_observed, |path| self.subscribe_entity(kind, path));
        debug!("Observing {} {kind} entries ({created} new)", registry.len());
    }

    fn subscribe_entity(&self, kind: ManagedType, path: &str) -> DropGuard {
        let weak = self.weak_self.clone();
        let clients = self.clients.clone();
        let path = path.to_owned();
        self.tasks.spawn_guarded(async move {
            let subscription = match kind {
                ManagedType::Device => clients.device.receive_property_changed(&path).await,
                _ => clients.service.receive_property_changed(&path).await,
            };
            let mut updates = match subscription {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Failed to observe {kind} {path}: {e}");
                    if let Some(handler) = weak.upgrade() {
                        handler.forget_observed(kind, &path);
                    }
                    return;
                }
            };
            while let Some((key, value)) = updates.next().await {
                let Some(handler) = weak.upgrade() else {
                    break;
                };
                handler.property_changed_callback(kind, &path, &key, &value);
            }
        })
    }

    /// Drops a subscription that never started, so the next list update
    /// subscribes to `path` again.
    fn forget_observed(&self, kind: ManagedType, path: &str) {
        let mut state = self.state.borrow_mut();
        let registry = match kind {
            ManagedType::Network => &mut state.observed_networks,
            ManagedType::Device => &mut state.observed_devices,
            ManagedType::Favorite => return,
        };
        if registry.remove(path) {
            debug!("Stopped observing {kind} {path}");
        }
    }

    fn property_changed_callback(&self, kind: ManagedType, path: &str, key: &str, value: &PropertyValue) {
        if kind == ManagedType::Network && key == service_property::IP_CONFIG {
            match value.as_str() {
                Some(ipconfig_path) if !ipconfig_path.is_empty() => {
                    self.request_ip_config(path, ipconfig_path);
                }
                _ => debug!("Network {path}: IPConfig cleared"),
            }
            return;
        }
        let Some(listener) = self.listener() else {
            return;
        };
        match kind {
            ManagedType::Network => listener.update_network_service_property(path, key, value),
            ManagedType::Device => listener.update_device_property(path, key, value),
            ManagedType::Favorite => {}
        }
    }

    fn get_properties_callback(&self, kind: ManagedType, path: &str, result: ShillResult<PropertyMap>) {
        debug!("GetProperties {kind}: {path}");
        if let Some(pending) = self.state.borrow_mut().pending_updates.get_mut(&kind) {
            pending.remove(path);
        }
        let properties = match result {
            Ok(properties) => properties,
            Err(e) => {
                // The entity may have been removed since it was listed.
                debug!("Failed to get {kind} properties for {path}: {e}");
                return;
            }
        };
        let Some(listener) = self.listener() else {
            return;
        };

        listener.update_managed_state_properties(kind, path, &properties);

        if kind == ManagedType::Network {
            // Only saved networks are favorites.
            let has_profile = properties
                .get(service_property::PROFILE)
                .and_then(PropertyValue::as_str)
                .is_some_and(|profile| !profile.is_empty());
            if has_profile {
                listener.update_managed_state_properties(ManagedType::Favorite, path, &properties);
            }
            if let Some(ipconfig_path) = properties
                .get(service_property::IP_CONFIG)
                .and_then(PropertyValue::as_str)
                .filter(|p| !p.is_empty())
            {
                self.request_ip_config(path, ipconfig_path);
            }
        }

        let (type_done, favorites_done) = {
            let state = self.state.borrow();
            (
                state.pending_is_empty(kind),
                state.pending_is_empty(ManagedType::Favorite),
            )
        };
        if type_done {
            listener.managed_state_list_changed(kind);
            if kind == ManagedType::Network && favorites_done {
                listener.managed_state_list_changed(ManagedType::Favorite);
            }
        }
    }

    fn request_ip_config(&self, service_path: &str, ipconfig_path: &str) {
        let weak = self.weak_self.clone();
        let ip_config = self.clients.ip_config.clone();
        let service_path = service_path.to_owned();
        let ipconfig_path = ipconfig_path.to_owned();
        self.tasks.spawn(async move {
            let result = ip_config.get_properties(&ipconfig_path).await;
            if let Some(handler) = weak.upgrade() {
                handler.ip_config_callback(&service_path, result);
            }
        });
    }

    fn ip_config_callback(&self, service_path: &str, result: ShillResult<PropertyMap>) {
        let properties = match result {
            Ok(properties) => properties,
            Err(e) => {
                warn!("Failed to get IPConfig properties for {service_path}: {e}");
                return;
            }
        };
        let Some(listener) = self.listener() else {
            return;
        };
        for key in ipconfig_property::FORWARDED {
            if let Some(value) = properties.get(key) {
                let flattened = format!("{}{key}", ipconfig_property::PREFIX);
                listener.update_network_service_property(service_path, &flattened, value);
            }
        }
    }

    /// Reports list completion for lists with no fetches in flight.
    ///
    /// `None` checks every list.
    fn check_pending_state_list_updates(&self, key: Option<&str>) {
        let (networks_done, favorites_done, devices_done) = {
            let state = self.state.borrow();
            (
                state.pending_is_empty(ManagedType::Network),
                state.pending_is_empty(ManagedType::Favorite),
                state.pending_is_empty(ManagedType::Device),
            )
        };
        let Some(listener) = self.listener() else {
            return;
        };
        let matches = |name: &str| key.is_none_or(|k| k == name);
        if matches(manager_property::SERVICES) && networks_done {
            listener.managed_state_list_changed(ManagedType::Network);
        }
        if matches(manager_property::SERVICE_COMPLETE_LIST) && networks_done && favorites_done {
            listener.managed_state_list_changed(ManagedType::Favorite);
        }
        if matches(manager_property::DEVICES) && devices_done {
            listener.managed_state_list_changed(ManagedType::Device);
        }
    }
}

fn list_value<'a>(key: &str, value: &'a PropertyValue) -> Option<&'a [String]> {
    let list = value.as_str_list();
    if list.is_none() {
        warn!("Manager property {key} is not a list");
    }
    list
}
