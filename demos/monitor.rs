// ABOUTME: Live detection monitor example
// ABOUTME: Starts analysis of one RTSP stream and prints fire/smoke alerts until Ctrl-C

use clap::Parser;
use std::time::Duration;
use vigil::protocol::messages::{CameraRef, Event, StreamRequest};
use vigil::{Channel, ChannelConfig, ChannelState, WsTransport};

/// Live fire/smoke detection monitor
#[derive(Parser, Debug)]
#[command(name = "monitor")]
#[command(about = "Stream detection events for one camera", long_about = None)]
struct Args {
    /// WebSocket URL of the detection backend (falls back to VIGIL_WS_URL)
    #[arg(short, long)]
    server: Option<String>,

    /// Camera id known to the backend
    #[arg(short, long, default_value_t = 1)]
    camera: i64,

    /// RTSP address of the camera stream
    #[arg(short, long)]
    rtsp: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = ChannelConfig::from_env();
    if let Some(server) = args.server {
        config.endpoint = server;
    }

    let ws_id = uuid::Uuid::new_v4().to_string();
    let channel = Channel::builder(config.endpoint.clone(), WsTransport::new())
        .config(config)
        .build()?;

    let camera = args.camera;
    channel.add_handler(move |envelope| match envelope.event() {
        Ok(Some(Event::FireDetected(d))) if d.camera_id == camera => {
            if d.has_fire || d.has_smoke {
                println!(
                    "ALERT camera {} fire={} ({:.2}) smoke={} ({:.2}) level={:?} at {}",
                    d.camera_id,
                    d.has_fire,
                    d.fire_confidence.unwrap_or_default(),
                    d.has_smoke,
                    d.smoke_confidence.unwrap_or_default(),
                    d.level,
                    d.location.as_deref().unwrap_or("unknown location"),
                );
            }
        }
        Ok(Some(Event::CameraStatus(s))) => println!("Camera {} status {}", s.camera_id, s.status),
        Ok(Some(Event::StreamStopped(c))) => println!("Stream for camera {} stopped", c.camera_id),
        Ok(Some(_)) => {}
        Ok(None) => println!("Unhandled message type {}", envelope.kind),
        Err(e) => eprintln!("Bad {} payload: {}", envelope.kind, e),
    });

    println!("Connecting to {}...", channel.endpoint());
    channel.send(&Event::StartStream(StreamRequest {
        camera_id: args.camera,
        rtsp_url: Some(args.rtsp),
        ws_id: Some(ws_id.clone()),
        extra: Default::default(),
    }));

    // Report when the channel gives up reconnecting
    let watcher = channel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if watcher.state() == ChannelState::Closed && !watcher.reconnect_pending() {
                eprintln!("Channel closed; press Ctrl-C to exit");
                break;
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    channel.send(&Event::StopStream(CameraRef {
        camera_id: args.camera,
        ws_id: Some(ws_id),
        extra: Default::default(),
    }));
    // Give the stop request a moment to leave
    tokio::time::sleep(Duration::from_millis(200)).await;
    channel.close();

    Ok(())
}
