/// Print shill's networks and technologies once the initial sync settles,
/// then report network state changes for a minute.
use std::rc::Rc;
use std::time::Duration;

use shillrs::{NetworkHandler, NetworkState, NetworkStateObserver};

struct Printer;

impl NetworkStateObserver for Printer {
    fn network_properties_updated(&self, network: &NetworkState) {
        println!("{:40} {:12} {}", network.path, network.connection_state, network.name);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> shillrs::Result<()> {
    tokio::task::LocalSet::new()
        .run_until(async {
            let handler = NetworkHandler::new().await?;
            handler.init();
            tokio::time::sleep(Duration::from_secs(2)).await;

            for technology in ["ethernet", "wifi", "cellular", "vpn"] {
                println!("{technology:10} {:?}", handler.technology_state(technology));
            }
            for network in handler.networks() {
                println!(
                    "{:30} {:10} {:12} {}%",
                    network.name, network.network_type, network.connection_state, network.signal_strength
                );
            }

            let printer = Rc::new(Printer);
            let observer: std::rc::Weak<Printer> = Rc::downgrade(&printer);
            handler.add_state_observer(observer);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await
}
