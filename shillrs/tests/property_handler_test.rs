mod common;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use common::{Call, FakeShill, list, props, run_local, settle};
use shillrs::{
    ManagedType, PropertyListener, PropertyMap, PropertyValue, ShillPropertyHandler,
    TechnologyState,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    List(ManagedType, Vec<String>),
    Properties(ManagedType, String),
    NetworkProperty(String, String, PropertyValue),
    DeviceProperty(String, String, PropertyValue),
    ProfilesChanged,
    CheckPortal(String),
    ManagerChanged,
    ListChanged(ManagedType),
}

#[derive(Default)]
struct RecordingListener {
    events: RefCell<Vec<Event>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn count(&self, event: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }
}

impl PropertyListener for RecordingListener {
    fn update_managed_list(&self, kind: ManagedType, paths: &[String]) {
        self.events.borrow_mut().push(Event::List(kind, paths.to_vec()));
    }

    fn update_managed_state_properties(&self, kind: ManagedType, path: &str, _properties: &PropertyMap) {
        self.events
            .borrow_mut()
            .push(Event::Properties(kind, path.to_owned()));
    }

    fn update_network_service_property(&self, path: &str, key: &str, value: &PropertyValue) {
        self.events.borrow_mut().push(Event::NetworkProperty(
            path.to_owned(),
            key.to_owned(),
            value.clone(),
        ));
    }

    fn update_device_property(&self, path: &str, key: &str, value: &PropertyValue) {
        self.events.borrow_mut().push(Event::DeviceProperty(
            path.to_owned(),
            key.to_owned(),
            value.clone(),
        ));
    }

    fn profile_list_changed(&self) {
        self.events.borrow_mut().push(Event::ProfilesChanged);
    }

    fn check_portal_list_changed(&self, check_portal_list: &str) {
        self.events
            .borrow_mut()
            .push(Event::CheckPortal(check_portal_list.to_owned()));
    }

    fn notify_manager_property_changed(&self) {
        self.events.borrow_mut().push(Event::ManagerChanged);
    }

    fn managed_state_list_changed(&self, kind: ManagedType) {
        self.events.borrow_mut().push(Event::ListChanged(kind));
    }
}

fn setup(fake: &Rc<FakeShill>, max_observed: usize) -> (Rc<RecordingListener>, Rc<ShillPropertyHandler>) {
    let listener = Rc::new(RecordingListener::default());
    let weak: Weak<RecordingListener> = Rc::downgrade(&listener);
    let handler = ShillPropertyHandler::new(fake.clients(), weak, max_observed);
    (listener, handler)
}

fn wifi(name: &str) -> PropertyMap {
    props([
        ("Name", name.into()),
        ("Type", "wifi".into()),
        ("State", "idle".into()),
    ])
}

fn service_fetches(fake: &FakeShill, path: &str) -> usize {
    fake.count(&Call::ServiceGetProperties(path.to_owned()))
}

#[tokio::test]
async fn initial_sync_fetches_every_listed_entity() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1", "/service/2"]));
        fake.set_manager_property("Devices", list(&["/device/wlan0"]));
        fake.add_service("/service/1", wifi("one"));
        fake.add_service("/service/2", wifi("two"));
        fake.add_device("/device/wlan0", props([("Type", "wifi".into())]));

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        let events = listener.events();
        assert!(events.contains(&Event::List(
            ManagedType::Network,
            vec!["/service/1".into(), "/service/2".into()]
        )));
        assert_eq!(service_fetches(&fake, "/service/1"), 1);
        assert_eq!(service_fetches(&fake, "/service/2"), 1);
        assert_eq!(fake.count(&Call::DeviceGetProperties("/device/wlan0".into())), 1);
        assert_eq!(
            listener.count(&Event::Properties(ManagedType::Network, "/service/1".into())),
            1
        );
        assert!(events.contains(&Event::ListChanged(ManagedType::Network)));
        assert!(events.contains(&Event::ListChanged(ManagedType::Device)));
        assert!(!handler.has_pending_updates(ManagedType::Network));
        assert!(handler.is_observed(ManagedType::Network, "/service/1"));
        assert!(handler.is_observed(ManagedType::Device, "/device/wlan0"));
    })
    .await;
}

#[tokio::test]
async fn only_new_paths_are_fetched_on_list_change() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1"]));
        fake.add_service("/service/1", wifi("one"));
        fake.add_service("/service/2", wifi("two"));

        let (_listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        fake.emit_manager("Services", list(&["/service/1"]));
        settle().await;
        assert_eq!(service_fetches(&fake, "/service/1"), 1);

        fake.emit_manager("Services", list(&["/service/2", "/service/1"]));
        settle().await;
        assert_eq!(service_fetches(&fake, "/service/1"), 1);
        assert_eq!(service_fetches(&fake, "/service/2"), 1);
    })
    .await;
}

#[tokio::test]
async fn duplicate_requests_share_one_fetch() {
    run_local(async {
        let fake = FakeShill::new();
        fake.add_service("/service/1", wifi("one"));
        let (listener, handler) = setup(&fake, 100);

        handler.request_properties(ManagedType::Network, "/service/1");
        handler.request_properties(ManagedType::Network, "/service/1");
        assert!(handler.has_pending_updates(ManagedType::Network));
        settle().await;

        assert_eq!(service_fetches(&fake, "/service/1"), 1);
        assert_eq!(listener.count(&Event::ListChanged(ManagedType::Network)), 1);
    })
    .await;
}

#[tokio::test]
async fn visible_favorites_are_fetched_as_networks() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1"]));
        fake.set_manager_property("ServiceCompleteList", list(&["/service/1", "/service/saved"]));
        fake.add_service("/service/1", wifi("one"));
        fake.add_service("/service/saved", wifi("saved"));

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        assert_eq!(service_fetches(&fake, "/service/1"), 1);
        assert_eq!(service_fetches(&fake, "/service/saved"), 1);
        assert_eq!(
            listener.count(&Event::Properties(ManagedType::Favorite, "/service/saved".into())),
            1
        );
        assert!(listener.events().contains(&Event::ListChanged(ManagedType::Favorite)));
    })
    .await;
}

#[tokio::test]
async fn saved_network_updates_network_and_favorite_once() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/home"]));
        let mut home = wifi("home");
        home.insert("Profile".into(), "/profile/default".into());
        fake.add_service("/service/home", home);

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        assert_eq!(
            listener.count(&Event::Properties(ManagedType::Network, "/service/home".into())),
            1
        );
        assert_eq!(
            listener.count(&Event::Properties(ManagedType::Favorite, "/service/home".into())),
            1
        );
    })
    .await;
}

#[tokio::test]
async fn unsaved_network_is_not_a_favorite() {
    run_local(async {
        let fake = FakeShill::new();
        let mut cafe = wifi("cafe");
        cafe.insert("Profile".into(), "".into());
        fake.add_service("/service/cafe", cafe);
        let (listener, handler) = setup(&fake, 100);

        handler.request_properties(ManagedType::Network, "/service/cafe");
        settle().await;

        assert_eq!(
            listener.count(&Event::Properties(ManagedType::Favorite, "/service/cafe".into())),
            0
        );
    })
    .await;
}

#[tokio::test]
async fn observation_is_capped_and_follows_the_list() {
    run_local(async {
        let fake = FakeShill::new();
        let paths: Vec<String> = (0..150).map(|i| format!("/service/{i}")).collect();
        for path in &paths {
            fake.add_service(path, wifi(path));
        }
        let all: Vec<&str> = paths.iter().map(String::as_str).collect();
        fake.set_manager_property("Services", list(&all));

        let (_listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        assert_eq!(handler.observed_count(ManagedType::Network), 100);
        assert!(handler.is_observed(ManagedType::Network, "/service/99"));
        assert!(!handler.is_observed(ManagedType::Network, "/service/100"));
        assert_eq!(
            fake.count_matching(|c| matches!(c, Call::SubscribeService(_))),
            100
        );
        assert_eq!(fake.subscribers("/service/50"), 1);

        fake.emit_manager("Services", list(&all[..10]));
        settle().await;

        assert_eq!(handler.observed_count(ManagedType::Network), 10);
        assert_eq!(fake.subscribers("/service/50"), 0);
        assert_eq!(fake.subscribers("/service/5"), 1);
        assert_eq!(
            fake.count_matching(|c| matches!(c, Call::SubscribeService(_))),
            100
        );
    })
    .await;
}

#[tokio::test]
async fn failed_subscription_is_retried_on_next_list() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1"]));
        fake.add_service("/service/1", wifi("one"));
        fake.fail("Service.PropertyChanged", "org.chromium.flimflam.Error.Failure", "busy");

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        assert!(!handler.is_observed(ManagedType::Network, "/service/1"));
        assert_eq!(fake.subscribers("/service/1"), 0);

        fake.succeed("Service.PropertyChanged");
        fake.emit_manager("Services", list(&["/service/1"]));
        settle().await;

        assert!(handler.is_observed(ManagedType::Network, "/service/1"));
        assert_eq!(fake.count(&Call::SubscribeService("/service/1".into())), 2);
        fake.emit("/service/1", "State", "association");
        settle().await;
        assert!(listener.events().contains(&Event::NetworkProperty(
            "/service/1".into(),
            "State".into(),
            "association".into()
        )));
    })
    .await;
}

#[tokio::test]
async fn observed_properties_are_forwarded() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1"]));
        fake.set_manager_property("Devices", list(&["/device/wlan0"]));
        fake.add_service("/service/1", wifi("one"));
        fake.add_device("/device/wlan0", props([("Powered", true.into())]));

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        fake.emit("/service/1", "State", "association");
        fake.emit("/device/wlan0", "Scanning", true);
        settle().await;

        let events = listener.events();
        assert!(events.contains(&Event::NetworkProperty(
            "/service/1".into(),
            "State".into(),
            "association".into()
        )));
        assert!(events.contains(&Event::DeviceProperty(
            "/device/wlan0".into(),
            "Scanning".into(),
            true.into()
        )));
    })
    .await;
}

#[tokio::test]
async fn ipconfig_is_flattened_onto_the_network() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1"]));
        let mut one = wifi("one");
        one.insert("IPConfig".into(), "/ipconfig/1".into());
        fake.add_service("/service/1", one);
        fake.add_ip_config(
            "/ipconfig/1",
            props([
                ("Address", "192.168.1.20".into()),
                ("Gateway", "192.168.1.1".into()),
                ("Method", "dhcp".into()),
            ]),
        );
        fake.add_ip_config("/ipconfig/2", props([("Address", "10.0.0.5".into())]));

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        let address = Event::NetworkProperty(
            "/service/1".into(),
            "IPConfig.Address".into(),
            "192.168.1.20".into(),
        );
        assert_eq!(listener.count(&address), 1);
        assert!(listener.events().contains(&Event::NetworkProperty(
            "/service/1".into(),
            "IPConfig.Gateway".into(),
            "192.168.1.1".into()
        )));
        assert!(!listener.events().iter().any(|e| matches!(
            e,
            Event::NetworkProperty(_, key, _) if key == "IPConfig.Method" || key == "IPConfig"
        )));

        fake.emit("/service/1", "IPConfig", "/ipconfig/2");
        settle().await;

        assert_eq!(fake.count(&Call::IpConfigGetProperties("/ipconfig/2".into())), 1);
        assert!(listener.events().contains(&Event::NetworkProperty(
            "/service/1".into(),
            "IPConfig.Address".into(),
            "10.0.0.5".into()
        )));
        assert!(!listener.events().iter().any(|e| matches!(
            e,
            Event::NetworkProperty(_, key, _) if key == "IPConfig"
        )));
    })
    .await;
}

#[tokio::test]
async fn technology_lists_replace_wholesale() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("AvailableTechnologies", list(&["wifi", "ethernet", "cellular"]));
        fake.set_manager_property("EnabledTechnologies", list(&["wifi", "ethernet"]));

        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        assert!(handler.is_technology_available("cellular"));
        assert!(handler.is_technology_enabled("ethernet"));

        fake.emit_manager("AvailableTechnologies", list(&["wifi"]));
        settle().await;

        assert!(handler.is_technology_available("wifi"));
        assert!(!handler.is_technology_available("ethernet"));
        assert!(!handler.is_technology_available("cellular"));
        assert_eq!(handler.technology_state("ethernet"), TechnologyState::Unavailable);
        assert!(listener.count(&Event::ManagerChanged) >= 3);
    })
    .await;
}

#[tokio::test]
async fn enabling_is_optimistic_and_cleared_by_enabled_list() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("AvailableTechnologies", list(&["wifi", "cellular"]));
        let (_listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        let result = handler.set_technology_enabled("cellular", true);
        assert!(handler.is_technology_enabling("cellular"));
        assert_eq!(handler.technology_state("cellular"), TechnologyState::Enabling);
        assert_eq!(result.await, Ok(()));
        assert_eq!(fake.count(&Call::EnableTechnology("cellular".into())), 1);

        fake.emit_manager("EnabledTechnologies", list(&["cellular"]));
        settle().await;
        assert!(!handler.is_technology_enabling("cellular"));
        assert_eq!(handler.technology_state("cellular"), TechnologyState::Enabled);
    })
    .await;
}

#[tokio::test]
async fn failed_enable_is_reverted() {
    run_local(async {
        let fake = FakeShill::new();
        fake.fail("EnableTechnology", "org.chromium.flimflam.Error.PermissionDenied", "no");
        let (_listener, handler) = setup(&fake, 100);

        let result = handler.set_technology_enabled("wifi", true).await;
        let err = result.unwrap_err();
        assert_eq!(err.name, "org.chromium.flimflam.Error.PermissionDenied");
        assert!(!handler.is_technology_enabling("wifi"));
    })
    .await;
}

#[tokio::test]
async fn failed_disable_is_not_reverted() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("AvailableTechnologies", list(&["wifi"]));
        fake.set_manager_property("EnabledTechnologies", list(&["wifi"]));
        fake.fail("DisableTechnology", "org.chromium.flimflam.Error.Failure", "busy");
        let (_listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;
        assert!(handler.is_technology_enabled("wifi"));

        let result = handler.set_technology_enabled("wifi", false);
        assert!(!handler.is_technology_enabled("wifi"));
        assert!(result.await.is_err());
        assert!(!handler.is_technology_enabled("wifi"));
        assert!(!handler.is_technology_enabling("wifi"));
    })
    .await;
}

#[tokio::test]
async fn profiles_and_portal_list_are_forwarded() {
    run_local(async {
        let fake = FakeShill::new();
        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        fake.emit_manager("Profiles", list(&["/profile/default"]));
        fake.emit_manager("CheckPortalList", "ethernet,wifi");
        fake.emit_manager("ArpGateway", true);
        settle().await;

        assert_eq!(listener.count(&Event::ProfilesChanged), 1);
        assert_eq!(listener.count(&Event::CheckPortal("ethernet,wifi".into())), 1);
    })
    .await;
}

#[tokio::test]
async fn failed_fetch_clears_pending_without_updates() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/gone"]));
        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;

        assert_eq!(service_fetches(&fake, "/service/gone"), 1);
        assert!(!handler.has_pending_updates(ManagedType::Network));
        assert_eq!(
            listener.count(&Event::Properties(ManagedType::Network, "/service/gone".into())),
            0
        );
    })
    .await;
}

#[tokio::test]
async fn manager_actions_reach_shill() {
    run_local(async {
        let fake = FakeShill::new();
        let (_listener, handler) = setup(&fake, 100);

        handler.request_scan();
        handler.connect_to_best_services();
        handler.set_check_portal_list("wifi");
        handler.refresh_ip_configs(&["/ipconfig/1".to_string()]);
        settle().await;

        assert_eq!(fake.count(&Call::RequestScan(String::new())), 1);
        assert_eq!(fake.count(&Call::ConnectToBestServices), 1);
        assert_eq!(
            fake.count(&Call::ManagerSetProperty("CheckPortalList".into(), "wifi".into())),
            1
        );
        assert_eq!(fake.count(&Call::IpConfigRefresh("/ipconfig/1".into())), 1);
    })
    .await;
}

#[tokio::test]
async fn dropped_handler_stops_reporting() {
    run_local(async {
        let fake = FakeShill::new();
        fake.set_manager_property("Services", list(&["/service/1"]));
        fake.add_service("/service/1", wifi("one"));
        let (listener, handler) = setup(&fake, 100);
        handler.init();
        settle().await;
        let before = listener.events().len();

        drop(handler);
        fake.emit("/service/1", "State", "online");
        fake.emit_manager("Services", list(&["/service/1", "/service/2"]));
        settle().await;

        assert_eq!(listener.events().len(), before);
        assert_eq!(fake.subscribers("/service/1"), 0);
    })
    .await;
}
