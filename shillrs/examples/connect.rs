/// Connect to a shill service by path and wait for the result.
///
/// Usage: `cargo run --example connect -- /service/3`
use std::time::Duration;

use shillrs::NetworkHandler;

#[tokio::main(flavor = "current_thread")]
async fn main() -> shillrs::Result<()> {
    let path = std::env::args()
        .nth(1)
        .expect("usage: connect <service path>");

    tokio::task::LocalSet::new()
        .run_until(async move {
            let handler = NetworkHandler::new().await?;
            handler.init();
            // Let the first Manager sync fill the cache.
            tokio::time::sleep(Duration::from_secs(1)).await;

            println!("Connecting to {path}...");
            handler.connect_to_network(&path, true).await?;

            if let Some(network) = handler.network(&path) {
                println!("Connected to {} ({})", network.name, network.ip_address);
            }
            Ok(())
        })
        .await
}
