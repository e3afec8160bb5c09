use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use silkcast_frame::{DatagramSink, FragmentWriter};
use silkcast_transport::DatagramSocket;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{CliError, CliResult, Context};
use crate::output::Printer;

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
struct SendReport {
    frames: u64,
    bytes: u64,
    first_id: u32,
    last_id: u32,
}

pub fn run(args: SendArgs, printer: &mut Printer) -> CliResult<()> {
    if args.mtu == 0 {
        return Err(CliError::usage("--mtu must be greater than zero"));
    }
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;
    let frames = load_frames(&args.files)?;

    let local = match args.addr.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = DatagramSocket::bind(local).context("bind failed")?;
    socket.connect(args.addr).context("connect failed")?;

    let mut writer = FragmentWriter::with_mtu(socket, args.mtu);
    let report = send_frames(&mut writer, &frames, args.start_id, args.repeat, interval)?;
    printer.summary("sent", &report).context("failed writing output")
}

fn load_frames(files: &[PathBuf]) -> CliResult<Vec<Vec<u8>>> {
    files
        .iter()
        .map(|path| {
            fs::read(path).with_context(|| format!("failed reading {}", path.display()))
        })
        .collect()
}

fn send_frames<T: DatagramSink>(
    writer: &mut FragmentWriter<T>,
    frames: &[Vec<u8>],
    start_id: u32,
    repeat: u32,
    interval: Option<Duration>,
) -> CliResult<SendReport> {
    let mut report = SendReport {
        first_id: start_id,
        last_id: start_id,
        ..SendReport::default()
    };
    let mut next_id = start_id;

    for _ in 0..repeat {
        for frame in frames {
            writer
                .send_frame_with_id(next_id, frame)
                .context("send failed")?;
            debug!(frame_id = next_id, len = frame.len(), "frame sent");

            report.last_id = next_id;
            report.frames += 1;
            report.bytes += frame.len() as u64;
            next_id = writer.next_frame_id();

            if let Some(interval) = interval {
                thread::sleep(interval);
            }
        }
    }
    Ok(report)
}
