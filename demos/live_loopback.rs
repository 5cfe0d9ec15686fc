//! Live delayed loopback.
//!
//! Captures from the default (or headset) microphone and plays everything
//! back two seconds later. Speak, then hear yourself.
//!
//! Run with: cargo run --example live_loopback

use std::time::Duration;

use echo_loopback::sink::CpalPlayback;
use echo_loopback::source::CpalCapture;
use echo_loopback::{EchoLoopback, LoopbackConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let config = LoopbackConfig {
        delay: Duration::from_secs(2),
        ..Default::default()
    };

    println!("Starting a 2-second loopback for 20 seconds...");
    println!("Press Ctrl+C to stop early.");

    let controller = EchoLoopback::builder()
        .capture(CpalCapture::provider())
        .playback(CpalPlayback::provider())
        .config(config)
        .on_event(|event| tracing::warn!(?event, "loopback event"))
        .spawn()?;

    controller.start().await;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(20)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted.");
        }
    }

    controller.stop().await;
    let stats = controller.stats();
    controller.shutdown().await;

    println!("Stats: {stats:?}");
    Ok(())
}
