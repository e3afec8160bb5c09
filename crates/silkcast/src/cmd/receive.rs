use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use silkcast_client::{ClientError, Decoder, ServiceConfig, UdpReceiver, UdpStreamConfig};
use silkcast_frame::VideoCodec;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, ReceiveArgs};
use crate::exit::{CliError, CliResult, Context, TIMEOUT};
use crate::output::{FrameRecord, Printer};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: ReceiveArgs, printer: &mut Printer) -> CliResult<()> {
    let codec: VideoCodec = args.codec.parse().context("invalid --codec")?;
    let idle_timeout = parse_duration(&args.idle_timeout)?;
    let timeout = parse_duration(&args.timeout)?;
    let decoder = select_decoder(codec, args.decode)?;

    let config = UdpStreamConfig {
        service: ServiceConfig {
            base_url: args.base_url,
            device: args.device,
            timeout,
        },
        bind_addr: SocketAddr::new(args.bind, args.port),
        target_host: args.target,
        codec,
        width: args.width,
        height: args.height,
        fps: args.fps,
        bitrate_kbps: args.bitrate,
        gop: args.gop,
        ..UdpStreamConfig::default()
    };

    let running = install_ctrlc_handler()?;
    let mut receiver =
        UdpReceiver::open_with_decoder(config, decoder).context("stream start failed")?;
    let source = format!("udp://{}", receiver.local_addr());

    let mut seen = 0u64;
    let mut printed = 0u64;
    let mut last_frame = Instant::now();

    let result = loop {
        if !running.load(Ordering::SeqCst) {
            info!("interrupted");
            break Ok(());
        }

        match receiver.wait_for_frame(seen, POLL_INTERVAL) {
            Ok((image, generation)) => {
                seen = generation;
                last_frame = Instant::now();
                let record = FrameRecord::from_image(&source, generation - 1, &image);
                if let Err(err) = printer.frame(&record) {
                    break Err::<(), _>(err).context("failed writing output");
                }
                printed += 1;
                if args.count.is_some_and(|count| printed >= count) {
                    break Ok(());
                }
            }
            Err(ClientError::Timeout(_)) => {
                if last_frame.elapsed() >= idle_timeout {
                    break Err(CliError::new(
                        TIMEOUT,
                        format!("no frame received for {idle_timeout:?}"),
                    ));
                }
            }
            Err(err) => break Err::<(), _>(err).context("receive failed"),
        }
    };

    receiver.close();
    printer
        .summary("stats", &receiver.stats())
        .context("failed writing output")?;
    result
}

fn select_decoder(codec: VideoCodec, decode: bool) -> CliResult<Decoder> {
    match (decode, codec) {
        (false, _) => Ok(Decoder::Identity),
        (true, VideoCodec::Mjpeg) => Ok(Decoder::Jpeg),
        (true, other) => Err(CliError::usage(format!(
            "--decode supports mjpeg only, not {other}"
        ))),
    }
}
