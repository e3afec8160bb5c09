use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, Context, INTERNAL};
use crate::output::Printer;

pub mod pull;
pub mod receive;
pub mod scan;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a UDP stream and print reassembled frames.
    Receive(ReceiveArgs),
    /// Pull frames from a device's multipart MJPEG feed.
    Pull(PullArgs),
    /// Extract JPEG frames from a recorded stream file.
    Scan(ScanArgs),
    /// Fragment files into datagrams and send them as frames.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, printer: &mut Printer) -> CliResult<()> {
    match command {
        Command::Receive(args) => receive::run(args, printer),
        Command::Pull(args) => pull::run(args, printer),
        Command::Scan(args) => scan::run(args, printer),
        Command::Send(args) => send::run(args, printer),
        Command::Version(args) => version::run(args, printer),
    }
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Service base URL (e.g. http://192.168.1.20:8080).
    pub base_url: String,
    /// Device to stream from.
    #[arg(long, default_value = "video0")]
    pub device: String,
    /// Codec to request (mjpeg or h264).
    #[arg(long, default_value = "mjpeg")]
    pub codec: String,
    /// Local UDP port to receive on.
    #[arg(long, default_value = "5000")]
    pub port: u16,
    /// Local address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// Address the service should send to. Detected when omitted.
    #[arg(long)]
    pub target: Option<IpAddr>,
    #[arg(long, default_value = "1280")]
    pub width: u32,
    #[arg(long, default_value = "720")]
    pub height: u32,
    #[arg(long, default_value = "30")]
    pub fps: u32,
    /// Target bitrate in kbit/s.
    #[arg(long)]
    pub bitrate: Option<u32>,
    /// Keyframe interval in frames.
    #[arg(long)]
    pub gop: Option<u32>,
    /// Decode JPEG frames to RGB before printing.
    #[arg(long)]
    pub decode: bool,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Give up when no frame arrives for this long (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub idle_timeout: String,
    /// Control-plane request timeout.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Service base URL (e.g. http://192.168.1.20:8080).
    pub base_url: String,
    /// Device to stream from.
    #[arg(long, default_value = "video0")]
    pub device: String,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long)]
    pub fps: Option<u32>,
    /// Extra query parameter, repeatable (e.g. --param quality=80).
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
    /// Exit after N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Write each frame to DIR/frame-{seq}.jpg.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
    /// Connect and read timeout.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Stream file to scan, or `-` for stdin.
    pub input: PathBuf,
    /// Bytes per read.
    #[arg(long, default_value = "4096")]
    pub chunk_size: usize,
    /// Drop partial frames larger than this many bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,
    /// Exit after N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Write each frame to DIR/frame-{seq}.jpg.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Receiver address (e.g. 127.0.0.1:5000).
    pub addr: SocketAddr,
    /// Files to send, one frame each.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Maximum payload bytes per datagram.
    #[arg(long, default_value = "1400")]
    pub mtu: usize,
    /// Send the file list this many times.
    #[arg(long, default_value = "1")]
    pub repeat: u32,
    /// Pause between frames (e.g. 33ms).
    #[arg(long)]
    pub interval: Option<String>,
    /// First frame id.
    #[arg(long, default_value = "0")]
    pub start_id: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Split a `KEY=VALUE` query parameter.
pub fn parse_param(input: &str) -> CliResult<(String, String)> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::usage(format!(
            "invalid parameter {input:?}, expected KEY=VALUE"
        ))),
    }
}

/// Flag cleared by Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

/// Destination directory for `--out`, created on construction.
pub struct FrameDir {
    dir: PathBuf,
}

impl FrameDir {
    pub fn create(dir: &Path) -> CliResult<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Write one frame to `frame-{sequence}.jpg`.
    pub fn write(&self, sequence: u64, data: &[u8]) -> CliResult<PathBuf> {
        let path = self.dir.join(format!("frame-{sequence}.jpg"));
        std::fs::write(&path, data).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_param_splits_on_first_equals() {
        assert_eq!(
            parse_param("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn frame_dir_names_files_by_sequence() {
        let root = std::env::temp_dir().join(format!("silkcast-frame-dir-{}", std::process::id()));
        let frames = FrameDir::create(&root.join("nested")).unwrap();
        let path = frames.write(12, b"\xff\xd8\xff\xd9").unwrap();

        assert_eq!(path.file_name().unwrap(), "frame-12.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"\xff\xd8\xff\xd9");
        let _ = std::fs::remove_dir_all(root);
    }
}
