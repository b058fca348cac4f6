use futures_util::StreamExt;
use kef_wireless::{Discovery, HttpExecutor};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let executor = HttpExecutor::new().shared();
    let discovery = Discovery::new(executor.clone());

    if std::env::args().any(|arg| arg == "--stream") {
        println!("Streaming discovery...");
        let devices = discovery.discover_stream();
        tokio::pin!(devices);
        while let Some(device) = devices.next().await {
            println!("  {} at {}:{}", device.name, device.host, device.port);
        }
        return Ok(());
    }

    println!("Discovering speakers for 5 seconds...");
    let devices = discovery.discover(Duration::from_secs(5)).await?;
    if devices.is_empty() {
        println!("No speakers found");
        return Ok(());
    }

    for device in devices {
        let speaker = device.connect(executor.clone());
        let volume = match speaker.volume().await {
            Ok(volume) => volume.to_string(),
            Err(e) => format!("unavailable ({})", e),
        };
        println!(
            "  {} at {} | model: {} | mac: {} | volume: {}",
            device.name,
            device.host,
            device.model.as_deref().unwrap_or("?"),
            device.mac_address.as_deref().unwrap_or("?"),
            volume
        );
    }
    Ok(())
}
