//! Tracking of shill configuration profiles.
//!
//! Follows the Manager `Profiles` list, fetches each new profile's owner
//! and tells observers when profiles come and go.

use futures::stream::StreamExt;
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use crate::api::models::NetworkProfile;
use crate::client::{ShillClients, ShillResult};
use crate::core::network_state_handler::NetworkStateHandler;
use crate::core::task::TaskScope;
use crate::types::constants::{manager_property, profile_property};
use crate::types::property::{PropertyMap, PropertyMapExt, PropertyValue};

/// Notified when a profile is added or removed.
pub trait NetworkProfileObserver {
    fn on_profile_added(&self, profile: &NetworkProfile);
    fn on_profile_removed(&self, profile: &NetworkProfile);
}

#[derive(Default)]
struct Profiles {
    known: Vec<NetworkProfile>,
    /// Paths whose properties are being fetched.
    in_flight: HashSet<String>,
}

impl Profiles {
    fn is_tracked(&self, path: &str) -> bool {
        self.in_flight.contains(path) || self.known.iter().any(|p| p.path == path)
    }
}

/// Keeps the list of shill profiles and their owners.
pub struct NetworkProfileHandler {
    clients: ShillClients,
    state_handler: Weak<NetworkStateHandler>,
    profiles: RefCell<Profiles>,
    observers: RefCell<Vec<Weak<dyn NetworkProfileObserver>>>,
    tasks: TaskScope,
    weak_self: Weak<Self>,
}

impl NetworkProfileHandler {
    /// Creates the handler. Profile changes trigger a Manager refresh on
    /// `state_handler`, if it is still alive.
    pub fn new(clients: ShillClients, state_handler: Weak<NetworkStateHandler>) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            clients,
            state_handler,
            profiles: RefCell::new(Profiles::default()),
            observers: RefCell::new(Vec::new()),
            tasks: TaskScope::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Subscribes to Manager changes and requests the initial profile list.
    pub fn init(&self) {
        let weak = self.weak_self.clone();
        let manager = self.clients.manager.clone();
        self.tasks.spawn(async move {
            let mut updates = match manager.receive_property_changed().await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Failed to subscribe to Manager for profiles: {e}");
                    return;
                }
            };
            while let Some((key, value)) = updates.next().await {
                let Some(handler) = weak.upgrade() else {
                    break;
                };
                handler.on_property_changed(&key, &value);
            }
        });

        let weak = self.weak_self.clone();
        let manager = self.clients.manager.clone();
        self.tasks.spawn(async move {
            let result = manager.get_properties().await;
            let Some(handler) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(properties) => {
                    if let Some(value) = properties.get(manager_property::PROFILES) {
                        handler.on_property_changed(manager_property::PROFILES, value);
                    }
                }
                Err(e) => warn!("Failed to request initial profile list: {e}"),
            }
        });
    }

    pub fn add_observer(&self, observer: Weak<dyn NetworkProfileObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Profiles whose properties have been fetched, in arrival order.
    pub fn profiles(&self) -> Vec<NetworkProfile> {
        self.profiles.borrow().known.clone()
    }

    pub fn profile_for_path(&self, path: &str) -> Option<NetworkProfile> {
        self.profiles
            .borrow()
            .known
            .iter()
            .find(|p| p.path == path)
            .cloned()
    }

    pub fn profile_for_userhash(&self, userhash: &str) -> Option<NetworkProfile> {
        self.profiles
            .borrow()
            .known
            .iter()
            .find(|p| p.userhash == userhash)
            .cloned()
    }

    /// Path of the signed-in user's profile, or the shared profile if no
    /// user profile is loaded.
    pub fn default_user_profile_path(&self) -> String {
        self.profiles
            .borrow()
            .known
            .iter()
            .find(|p| !p.userhash.is_empty())
            .map_or_else(
                || profile_property::SHARED_PROFILE_PATH.to_owned(),
                |p| p.path.clone(),
            )
    }

    fn on_property_changed(&self, key: &str, value: &PropertyValue) {
        if key != manager_property::PROFILES {
            return;
        }
        match value.as_str_list() {
            Some(paths) => self.profile_list_changed(paths),
            None => warn!("Profiles is not a list"),
        }
    }

    fn profile_list_changed(&self, paths: &[String]) {
        let (removed, added) = {
            let mut profiles = self.profiles.borrow_mut();
            let (keep, removed): (Vec<_>, Vec<_>) = profiles
                .known
                .drain(..)
                .partition(|p| paths.contains(&p.path));
            profiles.known = keep;
            profiles.in_flight.retain(|path| paths.contains(path));

            let mut added = Vec::new();
            for path in paths {
                if path.is_empty() || profiles.is_tracked(path) {
                    continue;
                }
                // Tracked right away so a second update does not refetch it.
                profiles.in_flight.insert(path.clone());
                added.push(path.clone());
            }
            (removed, added)
        };

        for profile in &removed {
            info!("Profile removed: {profile}");
            self.notify(|o| o.on_profile_removed(profile));
        }
        for path in &added {
            debug!("Requesting properties of profile {path}");
            self.request_profile(path);
        }

        if (!removed.is_empty() || !added.is_empty())
            && let Some(state_handler) = self.state_handler.upgrade()
        {
            state_handler.update_manager_properties();
        }
    }

    fn request_profile(&self, path: &str) {
        let weak = self.weak_self.clone();
        let profile_client = self.clients.profile.clone();
        let path = path.to_owned();
        self.tasks.spawn(async move {
            let result = profile_client.get_properties(&path).await;
            if let Some(handler) = weak.upgrade() {
                handler.profile_properties_callback(&path, result);
            }
        });
    }

    fn profile_properties_callback(&self, path: &str, result: ShillResult<PropertyMap>) {
        let still_listed = self.profiles.borrow_mut().in_flight.remove(path);
        if !still_listed {
            debug!("Profile {path} was removed while being fetched");
            return;
        }
        let properties = match result {
            Ok(properties) => properties,
            Err(e) => {
                warn!("Failed to get properties of profile {path}: {e}");
                return;
            }
        };
        let profile = NetworkProfile::new(path, properties.str_or_empty(profile_property::USER_HASH));
        info!("Profile added: {profile}");
        self.profiles.borrow_mut().known.push(profile.clone());
        self.notify(|o| o.on_profile_added(&profile));
    }

    fn notify<F>(&self, notify: F)
    where
        F: Fn(&dyn NetworkProfileObserver),
    {
        let live: Vec<Rc<dyn NetworkProfileObserver>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            notify(observer.as_ref());
        }
    }
}
