use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use shillrs::{
    BusType, DeviceState, HandlerConfig, NetworkHandler, NetworkProfile, NetworkProfileObserver,
    NetworkState, NetworkStateObserver,
};

#[derive(Debug, Parser)]
#[command(name = "shillctl", version, about = "Inspect and drive the shill connection manager")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Talk to shill on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    /// Maximum number of networks and devices to watch for live changes
    #[arg(long, default_value_t = 100, global = true)]
    max_observed: usize,

    /// Seconds to wait for the initial sync before running the command
    #[arg(long, default_value_t = 2, global = true)]
    settle: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print state changes until interrupted
    Monitor,
    /// List technologies, networks and devices
    List {
        /// Also list saved networks
        #[arg(long)]
        favorites: bool,
    },
    /// Connect to a service
    Connect {
        /// Service object path, e.g. /service/3
        path: String,
        /// Retry even if the last attempt failed with bad credentials
        #[arg(long)]
        ignore_error_state: bool,
        /// Seconds to wait for the connection to complete
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// Disconnect a connected service
    Disconnect { path: String },
    /// Start carrier activation of a cellular service
    Activate {
        path: String,
        #[arg(long, default_value = "")]
        carrier: String,
    },
    /// Enable a technology (wifi, ethernet, cellular, ...)
    Enable { technology: String },
    /// Disable a technology
    Disable { technology: String },
    /// Request a scan and list the networks found
    Scan,
    /// List shill profiles
    Profiles,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Handlers are Rc-based and spawn local tasks.
    tokio::task::LocalSet::new().run_until(run(cli)).await
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let bus = if cli.session {
        BusType::Session
    } else {
        BusType::System
    };
    let config = HandlerConfig::new()
        .with_bus(bus)
        .with_max_observed(cli.max_observed);
    let handler = NetworkHandler::with_config(config)
        .await
        .context("failed to connect to shill")?;
    handler.init();
    tokio::time::sleep(Duration::from_secs(cli.settle)).await;

    debug!(command = ?cli.command, "dispatching command");
    match cli.command {
        Command::Monitor => monitor(&handler).await,
        Command::List { favorites } => {
            print_technologies(&handler);
            print_networks(&handler.networks());
            print_devices(&handler.devices());
            if favorites {
                println!();
                for favorite in handler.favorites() {
                    println!(
                        "{:40} {:10} {:24} {}",
                        favorite.path, favorite.network_type, favorite.profile_path, favorite.name
                    );
                }
            }
            Ok(())
        }
        Command::Connect {
            path,
            ignore_error_state,
            timeout,
        } => {
            println!("Connecting to {path}...");
            let connect = handler.connect_to_network(&path, !ignore_error_state);
            tokio::time::timeout(Duration::from_secs(timeout), connect)
                .await
                .map_err(|_| anyhow!("timed out connecting to {path}"))?
                .with_context(|| format!("failed to connect to {path}"))?;
            match handler.network(&path) {
                Some(network) => println!("Connected to {} ({})", network.name, network.connection_state),
                None => println!("Connected to {path}"),
            }
            Ok(())
        }
        Command::Disconnect { path } => {
            handler
                .disconnect_network(&path)
                .await
                .with_context(|| format!("failed to disconnect {path}"))?;
            println!("Disconnected {path}");
            Ok(())
        }
        Command::Activate { path, carrier } => {
            handler
                .activate_network(&path, &carrier)
                .await
                .with_context(|| format!("failed to activate {path}"))?;
            println!("Activation started for {path}");
            Ok(())
        }
        Command::Enable { technology } => {
            handler
                .set_technology_enabled(&technology, true)
                .await
                .with_context(|| format!("failed to enable {technology}"))?;
            println!("Enabled {technology}");
            Ok(())
        }
        Command::Disable { technology } => {
            handler
                .set_technology_enabled(&technology, false)
                .await
                .with_context(|| format!("failed to disable {technology}"))?;
            println!("Disabled {technology}");
            Ok(())
        }
        Command::Scan => {
            handler.request_scan();
            tokio::time::sleep(Duration::from_secs(cli.settle.max(3))).await;
            print_networks(&handler.networks());
            Ok(())
        }
        Command::Profiles => {
            for profile in handler.profiles() {
                println!("{profile}");
            }
            println!(
                "default: {}",
                handler.profile_handler().default_user_profile_path()
            );
            Ok(())
        }
    }
}

fn print_technologies(handler: &NetworkHandler) {
    for technology in ["ethernet", "wifi", "cellular", "wimax", "bluetooth", "vpn"] {
        println!("{technology:10} {:?}", handler.technology_state(technology));
    }
    println!();
}

fn print_networks(networks: &[NetworkState]) {
    for network in networks {
        println!(
            "{:40} {:10} {:12} {:>4} {}",
            network.path,
            network.network_type,
            network.connection_state,
            network.signal_strength,
            network.name
        );
    }
}

fn print_devices(devices: &[DeviceState]) {
    println!();
    for device in devices {
        println!(
            "{:40} {:10} {:8} {}",
            device.path,
            device.device_type,
            if device.powered { "powered" } else { "off" },
            device.name
        );
    }
}

/// Prints every change the handlers report.
struct Monitor;

impl NetworkStateObserver for Monitor {
    fn network_list_changed(&self) {
        println!("networks: list updated");
    }

    fn network_properties_updated(&self, network: &NetworkState) {
        println!(
            "network {} [{}] {} {}",
            network.path, network.network_type, network.connection_state, network.name
        );
    }

    fn device_properties_updated(&self, device: &DeviceState) {
        println!(
            "device {} powered={} scanning={}",
            device.path, device.powered, device.scanning
        );
    }

    fn manager_changed(&self) {
        println!("manager: technologies updated");
    }
}

impl NetworkProfileObserver for Monitor {
    fn on_profile_added(&self, profile: &NetworkProfile) {
        println!("profile added: {profile}");
    }

    fn on_profile_removed(&self, profile: &NetworkProfile) {
        println!("profile removed: {profile}");
    }
}

async fn monitor(handler: &NetworkHandler) -> anyhow::Result<()> {
    let monitor = Rc::new(Monitor);
    let state_observer: std::rc::Weak<Monitor> = Rc::downgrade(&monitor);
    handler.add_state_observer(state_observer);
    let profile_observer: std::rc::Weak<Monitor> = Rc::downgrade(&monitor);
    handler.add_profile_observer(profile_observer);

    println!("Monitoring shill, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    Ok(())
}
