use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use silkcast_frame::{ReassemblerConfig, ScannerConfig, VideoCodec, DEFAULT_CHUNK_SIZE, DEFAULT_COOLDOWN};
use silkcast_transport::{local_ip, ControlClient, UdpStreamRequest};

/// Default UDP port the service streams to.
pub const DEFAULT_UDP_PORT: u16 = 5000;

/// Default device identifier on the service.
pub const DEFAULT_DEVICE: &str = "video0";

/// Where the remote streaming service lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL, e.g. `http://192.168.1.20:8080`.
    pub base_url: String,
    /// Device identifier, e.g. `video0`.
    pub device: String,
    /// Timeout for control-plane requests.
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            device: DEFAULT_DEVICE.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub(crate) fn client(&self) -> ControlClient {
        ControlClient::new(&self.base_url, self.timeout)
    }
}

/// Configuration for [`UdpReceiver`](crate::UdpReceiver).
#[derive(Debug, Clone, PartialEq)]
pub struct UdpStreamConfig {
    pub service: ServiceConfig,
    /// Local address the datagram socket binds to.
    pub bind_addr: SocketAddr,
    /// Host the service should send to. Detected from the outbound
    /// interface when `None`.
    pub target_host: Option<IpAddr>,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: Option<u32>,
    pub gop: Option<u32>,
    /// How long the service keeps streaming.
    pub duration: Duration,
    /// Socket receive timeout; bounds how quickly the loop notices `close`.
    pub recv_timeout: Duration,
    /// Minimum spacing between reference-frame requests.
    pub feedback_cooldown: Duration,
    /// Total timeout of one feedback request.
    pub feedback_timeout: Duration,
    /// How long `close` waits for the background loop.
    pub close_timeout: Duration,
    pub reassembler: ReassemblerConfig,
}

impl Default for UdpStreamConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_UDP_PORT),
            target_host: None,
            codec: VideoCodec::Mjpeg,
            width: 1280,
            height: 720,
            fps: 30,
            bitrate_kbps: None,
            gop: None,
            duration: Duration::from_secs(999_999),
            recv_timeout: Duration::from_secs(1),
            feedback_cooldown: DEFAULT_COOLDOWN,
            feedback_timeout: Duration::from_secs(1),
            close_timeout: Duration::from_secs(2),
            reassembler: ReassemblerConfig::default(),
        }
    }
}

impl UdpStreamConfig {
    /// Build the stream-start request for a socket bound to `port`.
    pub(crate) fn start_request(&self, port: u16) -> UdpStreamRequest {
        let target = self.target_host.unwrap_or_else(local_ip);
        UdpStreamRequest {
            device: self.service.device.clone(),
            target: target.to_string(),
            port,
            codec: self.codec.as_str().to_string(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration: self.duration,
            bitrate_kbps: self.bitrate_kbps,
            gop: self.gop,
        }
    }
}

/// Configuration for [`MjpegPuller`](crate::MjpegPuller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullConfig {
    pub service: ServiceConfig,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    /// Additional query parameters passed through verbatim.
    pub extra_params: Vec<(String, String)>,
    /// Bytes requested from the body per read.
    pub chunk_size: usize,
    pub scanner: ScannerConfig,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            width: None,
            height: None,
            fps: None,
            extra_params: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            scanner: ScannerConfig::default(),
        }
    }
}

impl PullConfig {
    pub(crate) fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(width) = self.width {
            params.push(("w".to_string(), width.to_string()));
        }
        if let Some(height) = self.height {
            params.push(("h".to_string(), height.to_string()));
        }
        if let Some(fps) = self.fps {
            params.push(("fps".to_string(), fps.to_string()));
        }
        params.extend(self.extra_params.iter().cloned());
        params
    }
}
