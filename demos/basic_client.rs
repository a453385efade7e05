// ABOUTME: Basic example demonstrating the resilient channel
// ABOUTME: Connects, asks the backend to probe a camera, prints whatever comes back

use std::time::Duration;
use vigil::protocol::messages::{CameraRef, Event};
use vigil::{Channel, WsTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let channel = Channel::new("ws://localhost:5000/ws", WsTransport::new())?;

    channel.add_handler(|envelope| {
        println!("<- {} {}", envelope.kind, envelope.data);
    });

    println!("Connecting to {}...", channel.endpoint());

    // Sending before the socket is up queues the message and starts connecting
    channel.send(&Event::CheckCamera(CameraRef::new(1)));

    tokio::time::sleep(Duration::from_secs(5)).await;
    println!("Connected: {}", channel.is_connected());

    channel.close();
    Ok(())
}
