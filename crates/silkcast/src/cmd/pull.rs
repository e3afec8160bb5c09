use std::sync::atomic::Ordering;

use serde::Serialize;
use silkcast_client::{MjpegPuller, PullConfig, ServiceConfig};
use silkcast_frame::ScanStats;
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, parse_duration, parse_param, FrameDir, PullArgs};
use crate::exit::{CliResult, Context};
use crate::output::{FrameRecord, Printer};

pub fn run(args: PullArgs, printer: &mut Printer) -> CliResult<()> {
    let timeout = parse_duration(&args.timeout)?;
    let extra_params = args
        .params
        .iter()
        .map(|param| parse_param(param))
        .collect::<CliResult<Vec<_>>>()?;
    let out = args.out.as_deref().map(FrameDir::create).transpose()?;

    let config = PullConfig {
        service: ServiceConfig {
            base_url: args.base_url,
            device: args.device,
            timeout,
        },
        width: args.width,
        height: args.height,
        fps: args.fps,
        extra_params,
        ..PullConfig::default()
    };

    let running = install_ctrlc_handler()?;
    let mut puller = MjpegPuller::open(config).context("stream open failed")?;
    let source = puller.source().to_string();

    let mut printed = 0u64;
    while running.load(Ordering::SeqCst) {
        let Some(frame) = puller.next_frame() else {
            break;
        };
        if let Some(out) = &out {
            let path = out.write(frame.sequence, &frame.data)?;
            debug!(path = %path.display(), "frame written");
        }
        let record = FrameRecord::from_jpeg(&source, frame.sequence, frame.timestamp, &frame.data);
        printer.frame(&record).context("failed writing output")?;

        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    let stats = puller.stats();
    puller.close();
    info!(frames = printed, "pull finished");
    printer
        .summary("stats", &ScanSummary::from(stats))
        .context("failed writing output")
}

/// Printable form of the scanner counters.
#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub frames: u64,
    pub discarded_bytes: u64,
    pub oversized: u64,
}

impl From<ScanStats> for ScanSummary {
    fn from(stats: ScanStats) -> Self {
        Self {
            frames: stats.frames,
            discarded_bytes: stats.discarded_bytes,
            oversized: stats.oversized,
        }
    }
}
