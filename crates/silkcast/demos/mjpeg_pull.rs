//! Pull frames from a device's multipart MJPEG feed and save the first few.
//!
//! Run with:
//!   cargo run --example mjpeg-pull -- http://192.168.1.20:8080 [device]

use silkcast::client::{MjpegPuller, PullConfig, ServiceConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let base_url = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let device = args.next().unwrap_or_else(|| "video0".to_string());

    let config = PullConfig {
        service: ServiceConfig {
            device,
            ..ServiceConfig::new(base_url)
        },
        width: Some(640),
        height: Some(480),
        ..Default::default()
    };

    let out_dir = std::env::temp_dir().join(format!("silkcast-pull-{}", std::process::id()));
    std::fs::create_dir_all(&out_dir)?;

    let mut puller = MjpegPuller::open(config)?;
    for frame in puller.frames().take(10) {
        let path = out_dir.join(format!("frame-{}.jpg", frame.sequence));
        std::fs::write(&path, &frame.data)?;
        eprintln!("wrote {} ({} bytes)", path.display(), frame.data.len());
    }
    puller.close();

    eprintln!("scanner: {:?}", puller.stats());
    Ok(())
}
