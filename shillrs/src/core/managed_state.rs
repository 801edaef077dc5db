//! Applying shill properties to cached entity state.

use log::debug;

use crate::api::models::{DeviceState, FavoriteState, NetworkState};
use crate::types::constants::{device_property, ipconfig_property, provider_property, service_property};
use crate::types::property::{PropertyMap, PropertyMapExt, PropertyValue};

/// An entity kept in one of the canonical lists.
pub(crate) trait ManagedState {
    fn new_for_path(path: &str) -> Self;

    fn path(&self) -> &str;

    /// Applies one property. Returns false for keys this type does not track.
    fn property_changed(&mut self, key: &str, value: &PropertyValue) -> bool;

    fn mark_received(&mut self);

    /// Applies a full property dictionary.
    fn apply_properties(&mut self, properties: &PropertyMap) {
        for (key, value) in properties {
            self.property_changed(key, value);
        }
        self.mark_received();
    }
}

fn set_string(target: &mut String, value: &PropertyValue) -> bool {
    match value.as_str() {
        Some(s) => {
            *target = s.to_owned();
            true
        }
        None => false,
    }
}

fn set_bool(target: &mut bool, value: &PropertyValue) -> bool {
    match value.as_bool() {
        Some(b) => {
            *target = b;
            true
        }
        None => false,
    }
}

fn set_int(target: &mut i32, value: &PropertyValue) -> bool {
    match value.as_int() {
        Some(i) => {
            *target = i32::try_from(i).unwrap_or(i32::MAX);
            true
        }
        None => false,
    }
}

impl ManagedState for NetworkState {
    fn new_for_path(path: &str) -> Self {
        NetworkState::new(path)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn property_changed(&mut self, key: &str, value: &PropertyValue) -> bool {
        match key {
            service_property::NAME => set_string(&mut self.name, value),
            service_property::TYPE => set_string(&mut self.network_type, value),
            service_property::SECURITY => set_string(&mut self.security, value),
            service_property::STATE => set_string(&mut self.connection_state, value),
            service_property::ERROR => set_string(&mut self.error, value),
            service_property::CONNECTABLE => set_bool(&mut self.connectable, value),
            service_property::PASSPHRASE_REQUIRED => set_bool(&mut self.passphrase_required, value),
            service_property::PROFILE => set_string(&mut self.profile_path, value),
            service_property::GUID => set_string(&mut self.guid, value),
            service_property::DEVICE => set_string(&mut self.device_path, value),
            service_property::STRENGTH => set_int(&mut self.signal_strength, value),
            service_property::ACTIVATION_STATE => set_string(&mut self.activation_state, value),
            service_property::PROVIDER => match value.as_dict() {
                Some(provider) => {
                    self.vpn_provider_type = provider.str_or_empty(provider_property::TYPE).to_owned();
                    self.vpn_provider_host = provider.str_or_empty(provider_property::HOST).to_owned();
                    true
                }
                None => false,
            },
            _ => match key.strip_prefix(ipconfig_property::PREFIX) {
                Some(ipconfig_property::ADDRESS) => set_string(&mut self.ip_address, value),
                Some(ipconfig_property::GATEWAY) => set_string(&mut self.gateway, value),
                Some(ipconfig_property::PREFIXLEN) => set_int(&mut self.prefix_length, value),
                Some(ipconfig_property::NAME_SERVERS) => match value.as_str_list() {
                    Some(servers) => {
                        self.name_servers = servers.to_vec();
                        true
                    }
                    None => false,
                },
                _ => {
                    debug!("Network {}: untracked property {key}", self.path);
                    false
                }
            },
        }
    }

    fn mark_received(&mut self) {
        self.properties_received = true;
    }
}

impl ManagedState for DeviceState {
    fn new_for_path(path: &str) -> Self {
        DeviceState::new(path)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn property_changed(&mut self, key: &str, value: &PropertyValue) -> bool {
        match key {
            device_property::NAME => set_string(&mut self.name, value),
            device_property::TYPE => set_string(&mut self.device_type, value),
            device_property::ADDRESS => set_string(&mut self.mac_address, value),
            device_property::POWERED => set_bool(&mut self.powered, value),
            device_property::SCANNING => set_bool(&mut self.scanning, value),
            device_property::IP_CONFIGS => match value.as_str_list() {
                Some(paths) => {
                    self.ip_configs = paths.to_vec();
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn mark_received(&mut self) {
        self.properties_received = true;
    }
}

impl ManagedState for FavoriteState {
    fn new_for_path(path: &str) -> Self {
        FavoriteState::new(path)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn property_changed(&mut self, key: &str, value: &PropertyValue) -> bool {
        match key {
            service_property::NAME => set_string(&mut self.name, value),
            service_property::TYPE => set_string(&mut self.network_type, value),
            service_property::PROFILE => set_string(&mut self.profile_path, value),
            service_property::GUID => set_string(&mut self.guid, value),
            service_property::UI_DATA => set_string(&mut self.ui_data, value),
            _ => false,
        }
    }

    fn mark_received(&mut self) {
        self.properties_received = true;
    }
}
