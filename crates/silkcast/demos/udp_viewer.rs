//! Start a UDP stream on a SilkCast service and report frames as they land.
//!
//! Run with:
//!   cargo run --example udp-viewer -- http://192.168.1.20:8080 [device] [codec]

use std::time::Duration;

use silkcast::client::{ClientError, ServiceConfig, UdpReceiver, UdpStreamConfig};
use silkcast::frame::VideoCodec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let base_url = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let device = args.next().unwrap_or_else(|| "video0".to_string());
    let codec = args
        .next()
        .unwrap_or_else(|| "mjpeg".to_string())
        .parse::<VideoCodec>()?;

    let config = UdpStreamConfig {
        service: ServiceConfig {
            device,
            ..ServiceConfig::new(base_url)
        },
        codec,
        ..Default::default()
    };
    let receiver = UdpReceiver::open(config)?;
    eprintln!("Receiving on {}", receiver.local_addr());

    let mut seen = 0;
    for _ in 0..100 {
        match receiver.wait_for_frame(seen, Duration::from_secs(5)) {
            Ok((image, generation)) => {
                seen = generation;
                eprintln!("frame #{generation}: {} bytes", image.data.len());
            }
            Err(ClientError::Timeout(after)) => {
                eprintln!("no frame for {after:?}");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let stats = receiver.stats();
    eprintln!(
        "completed={} abandoned={} gaps={} feedback_sent={}",
        stats.completed, stats.abandoned, stats.gaps, stats.feedback_sent
    );
    Ok(())
}
