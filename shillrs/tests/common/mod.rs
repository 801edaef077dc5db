//! In-memory shill used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use shillrs::client::{
    PropertyUpdates, ShillDeviceClient, ShillIpConfigClient, ShillManagerClient,
    ShillProfileClient, ShillResult, ShillServiceClient,
};
use shillrs::{PropertyMap, PropertyValue, ShillClients, ShillError};

/// A remote call observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ManagerGetProperties,
    ManagerSetProperty(String, PropertyValue),
    RequestScan(String),
    EnableTechnology(String),
    DisableTechnology(String),
    ConfigureService,
    ConfigureServiceForProfile(String),
    ConnectToBestServices,
    ServiceGetProperties(String),
    ServiceSetProperty(String, String, PropertyValue),
    Connect(String),
    Disconnect(String),
    ActivateCellularModem(String, String),
    DeviceGetProperties(String),
    IpConfigGetProperties(String),
    IpConfigRefresh(String),
    ProfileGetProperties(String),
    SubscribeManager,
    SubscribeService(String),
    SubscribeDevice(String),
}

#[derive(Default)]
pub struct FakeShill {
    manager: RefCell<PropertyMap>,
    services: RefCell<HashMap<String, PropertyMap>>,
    devices: RefCell<HashMap<String, PropertyMap>>,
    ip_configs: RefCell<HashMap<String, PropertyMap>>,
    profiles: RefCell<HashMap<String, PropertyMap>>,
    failures: RefCell<HashMap<&'static str, ShillError>>,
    calls: RefCell<Vec<Call>>,
    manager_listeners: RefCell<Vec<UnboundedSender<(String, PropertyValue)>>>,
    entity_listeners: RefCell<HashMap<String, Vec<UnboundedSender<(String, PropertyValue)>>>>,
}

impl FakeShill {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn clients(self: &Rc<Self>) -> ShillClients {
        ShillClients::from_client(self.clone())
    }

    pub fn set_manager_property(&self, key: &str, value: impl Into<PropertyValue>) {
        self.manager.borrow_mut().insert(key.to_owned(), value.into());
    }

    pub fn add_service(&self, path: &str, properties: PropertyMap) {
        self.services.borrow_mut().insert(path.to_owned(), properties);
    }

    pub fn add_device(&self, path: &str, properties: PropertyMap) {
        self.devices.borrow_mut().insert(path.to_owned(), properties);
    }

    pub fn add_ip_config(&self, path: &str, properties: PropertyMap) {
        self.ip_configs.borrow_mut().insert(path.to_owned(), properties);
    }

    pub fn add_profile(&self, path: &str, properties: PropertyMap) {
        self.profiles.borrow_mut().insert(path.to_owned(), properties);
    }

    /// Makes every later call of `method` fail.
    pub fn fail(&self, method: &'static str, name: &str, message: &str) {
        self.failures
            .borrow_mut()
            .insert(method, ShillError::new(name, message));
    }

    pub fn succeed(&self, method: &'static str) {
        self.failures.borrow_mut().remove(method);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn count_matching(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Emits a Manager `PropertyChanged` signal.
    pub fn emit_manager(&self, key: &str, value: impl Into<PropertyValue>) {
        let value = value.into();
        self.manager.borrow_mut().insert(key.to_owned(), value.clone());
        self.manager_listeners
            .borrow_mut()
            .retain(|tx| tx.unbounded_send((key.to_owned(), value.clone())).is_ok());
    }

    /// Emits a `PropertyChanged` signal on a service or device and updates
    /// its stored properties.
    pub fn emit(&self, path: &str, key: &str, value: impl Into<PropertyValue>) {
        let value = value.into();
        if let Some(props) = self.services.borrow_mut().get_mut(path) {
            props.insert(key.to_owned(), value.clone());
        }
        if let Some(props) = self.devices.borrow_mut().get_mut(path) {
            props.insert(key.to_owned(), value.clone());
        }
        if let Some(listeners) = self.entity_listeners.borrow_mut().get_mut(path) {
            listeners.retain(|tx| tx.unbounded_send((key.to_owned(), value.clone())).is_ok());
        }
    }

    /// Number of live subscriptions on `path`.
    pub fn subscribers(&self, path: &str) -> usize {
        self.entity_listeners
            .borrow()
            .get(path)
            .map_or(0, |listeners| listeners.iter().filter(|tx| !tx.is_closed()).count())
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn check(&self, method: &'static str) -> ShillResult<()> {
        match self.failures.borrow().get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn lookup(map: &RefCell<HashMap<String, PropertyMap>>, path: &str) -> ShillResult<PropertyMap> {
        map.borrow().get(path).cloned().ok_or_else(|| {
            ShillError::new("org.chromium.flimflam.Error.NotFound", format!("{path} not found"))
        })
    }

    fn subscribe(&self, path: &str) -> PropertyUpdates {
        let (tx, rx) = mpsc::unbounded();
        self.entity_listeners
            .borrow_mut()
            .entry(path.to_owned())
            .or_default()
            .push(tx);
        Box::pin(rx)
    }
}

#[async_trait(?Send)]
impl ShillManagerClient for FakeShill {
    async fn get_properties(&self) -> ShillResult<PropertyMap> {
        self.record(Call::ManagerGetProperties);
        self.check("Manager.GetProperties")?;
        Ok(self.manager.borrow().clone())
    }

    async fn set_property(&self, name: &str, value: &PropertyValue) -> ShillResult<()> {
        self.record(Call::ManagerSetProperty(name.to_owned(), value.clone()));
        self.check("Manager.SetProperty")
    }

    async fn request_scan(&self, technology: &str) -> ShillResult<()> {
        self.record(Call::RequestScan(technology.to_owned()));
        self.check("RequestScan")
    }

    async fn enable_technology(&self, technology: &str) -> ShillResult<()> {
        self.record(Call::EnableTechnology(technology.to_owned()));
        self.check("EnableTechnology")
    }

    async fn disable_technology(&self, technology: &str) -> ShillResult<()> {
        self.record(Call::DisableTechnology(technology.to_owned()));
        self.check("DisableTechnology")
    }

    async fn configure_service(&self, properties: &PropertyMap) -> ShillResult<String> {
        self.record(Call::ConfigureService);
        self.check("ConfigureService")?;
        let path = format!("/service/configured{}", self.services.borrow().len());
        self.add_service(&path, properties.clone());
        Ok(path)
    }

    async fn configure_service_for_profile(
        &self,
        profile_path: &str,
        properties: &PropertyMap,
    ) -> ShillResult<String> {
        self.record(Call::ConfigureServiceForProfile(profile_path.to_owned()));
        self.check("ConfigureServiceForProfile")?;
        let path = format!("/service/configured{}", self.services.borrow().len());
        let mut properties = properties.clone();
        properties.insert("Profile".into(), profile_path.into());
        self.add_service(&path, properties);
        Ok(path)
    }

    async fn connect_to_best_services(&self) -> ShillResult<()> {
        self.record(Call::ConnectToBestServices);
        self.check("ConnectToBestServices")
    }

    async fn receive_property_changed(&self) -> ShillResult<PropertyUpdates> {
        self.record(Call::SubscribeManager);
        let (tx, rx) = mpsc::unbounded();
        self.manager_listeners.borrow_mut().push(tx);
        Ok(Box::pin(rx))
    }
}

#[async_trait(?Send)]
impl ShillServiceClient for FakeShill {
    async fn get_properties(&self, service_path: &str) -> ShillResult<PropertyMap> {
        self.record(Call::ServiceGetProperties(service_path.to_owned()));
        self.check("Service.GetProperties")?;
        Self::lookup(&self.services, service_path)
    }

    async fn set_property(
        &self,
        service_path: &str,
        name: &str,
        value: &PropertyValue,
    ) -> ShillResult<()> {
        self.record(Call::ServiceSetProperty(
            service_path.to_owned(),
            name.to_owned(),
            value.clone(),
        ));
        self.check("Service.SetProperty")?;
        if let Some(props) = self.services.borrow_mut().get_mut(service_path) {
            props.insert(name.to_owned(), value.clone());
        }
        Ok(())
    }

    async fn connect(&self, service_path: &str) -> ShillResult<()> {
        self.record(Call::Connect(service_path.to_owned()));
        self.check("Connect")
    }

    async fn disconnect(&self, service_path: &str) -> ShillResult<()> {
        self.record(Call::Disconnect(service_path.to_owned()));
        self.check("Disconnect")
    }

    async fn activate_cellular_modem(&self, service_path: &str, carrier: &str) -> ShillResult<()> {
        self.record(Call::ActivateCellularModem(
            service_path.to_owned(),
            carrier.to_owned(),
        ));
        self.check("ActivateCellularModem")
    }

    async fn receive_property_changed(&self, service_path: &str) -> ShillResult<PropertyUpdates> {
        self.record(Call::SubscribeService(service_path.to_owned()));
        self.check("Service.PropertyChanged")?;
        Ok(self.subscribe(service_path))
    }
}

#[async_trait(?Send)]
impl ShillDeviceClient for FakeShill {
    async fn get_properties(&self, device_path: &str) -> ShillResult<PropertyMap> {
        self.record(Call::DeviceGetProperties(device_path.to_owned()));
        self.check("Device.GetProperties")?;
        Self::lookup(&self.devices, device_path)
    }

    async fn set_property(
        &self,
        device_path: &str,
        name: &str,
        value: &PropertyValue,
    ) -> ShillResult<()> {
        if let Some(props) = self.devices.borrow_mut().get_mut(device_path) {
            props.insert(name.to_owned(), value.clone());
        }
        Ok(())
    }

    async fn receive_property_changed(&self, device_path: &str) -> ShillResult<PropertyUpdates> {
        self.record(Call::SubscribeDevice(device_path.to_owned()));
        Ok(self.subscribe(device_path))
    }
}

#[async_trait(?Send)]
impl ShillIpConfigClient for FakeShill {
    async fn get_properties(&self, ipconfig_path: &str) -> ShillResult<PropertyMap> {
        self.record(Call::IpConfigGetProperties(ipconfig_path.to_owned()));
        Self::lookup(&self.ip_configs, ipconfig_path)
    }

    async fn refresh(&self, ipconfig_path: &str) -> ShillResult<()> {
        self.record(Call::IpConfigRefresh(ipconfig_path.to_owned()));
        self.check("IPConfig.Refresh")
    }
}

#[async_trait(?Send)]
impl ShillProfileClient for FakeShill {
    async fn get_properties(&self, profile_path: &str) -> ShillResult<PropertyMap> {
        self.record(Call::ProfileGetProperties(profile_path.to_owned()));
        self.check("Profile.GetProperties")?;
        Self::lookup(&self.profiles, profile_path)
    }
}

/// Builds a property map from `(key, value)` pairs.
pub fn props<const N: usize>(entries: [(&str, PropertyValue); N]) -> PropertyMap {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

pub fn list(items: &[&str]) -> PropertyValue {
    PropertyValue::StrList(items.iter().map(|s| (*s).to_owned()).collect())
}

/// Lets spawned local tasks run until they are all blocked.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Runs `test` inside a `LocalSet`.
pub async fn run_local<F>(test: F)
where
    F: Future<Output = ()>,
{
    tokio::task::LocalSet::new().run_until(test).await;
}

/// Drives `future` on the local set and exposes its result once ready.
pub fn spawn_result<F>(future: F) -> Rc<RefCell<Option<F::Output>>>
where
    F: Future + 'static,
{
    let slot = Rc::new(RefCell::new(None));
    let target = slot.clone();
    tokio::task::spawn_local(async move {
        let output = future.await;
        *target.borrow_mut() = Some(output);
    });
    slot
}
