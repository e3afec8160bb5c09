use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use silkcast_frame::{ScanReader, ScannerConfig};

use crate::cmd::pull::ScanSummary;
use crate::cmd::{FrameDir, ScanArgs};
use crate::exit::{CliError, CliResult, Context};
use crate::output::{FrameRecord, Printer};

pub fn run(args: ScanArgs, printer: &mut Printer) -> CliResult<()> {
    if args.chunk_size == 0 {
        return Err(CliError::usage("--chunk-size must be greater than zero"));
    }
    let out = args.out.as_deref().map(FrameDir::create).transpose()?;

    let (source, input) = open_input(&args.input)?;
    let config = ScannerConfig {
        max_frame_size: args
            .max_frame_size
            .unwrap_or(ScannerConfig::default().max_frame_size),
    };
    let mut reader = ScanReader::with_config(input, config, args.chunk_size);

    let mut printed = 0u64;
    while let Some(frame) = reader.read_frame().context("scan failed")? {
        if let Some(out) = &out {
            out.write(frame.sequence, &frame.data)?;
        }
        let record = FrameRecord::from_jpeg(&source, frame.sequence, frame.timestamp, &frame.data);
        printer.frame(&record).context("failed writing output")?;

        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    printer
        .summary("stats", &ScanSummary::from(reader.scanner().stats()))
        .context("failed writing output")
}

/// `-` reads stdin; anything else is a file path.
fn open_input(path: &Path) -> CliResult<(String, Box<dyn Read>)> {
    if path.as_os_str() == "-" {
        return Ok(("stdin".to_string(), Box::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("failed opening {}", path.display()))?;
    Ok((path.display().to_string(), Box::new(file)))
}
