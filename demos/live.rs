use futures_util::StreamExt;
use kef_wireless::{CancellationToken, HttpExecutor, Speaker};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(host) = std::env::args().nth(1) else {
        eprintln!("usage: live <speaker-ip> [--position]");
        std::process::exit(2);
    };
    let position_tracking = std::env::args().any(|arg| arg == "--position");

    let speaker = Speaker::new(HttpExecutor::new().shared(), host);
    println!("Connected to {} ({})", speaker.name().await?, speaker.host());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let events = speaker.events(Duration::from_secs(10), position_tracking, cancel);
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        match event {
            Ok(event) if event.is_empty() => {}
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(e) => {
                eprintln!("Speaker went away: {}", e);
                break;
            }
        }
    }
    Ok(())
}
