//! Frame reconstruction engines.
//!
//! Two engines share one decoder adapter:
//! - [`UdpReceiver`] (push model): a background thread reassembles
//!   fragmented datagrams, requests reference frames after loss and keeps
//!   only the latest decoded image for [`UdpReceiver::read_latest`].
//! - [`MjpegPuller`] (pull model): the consumer pulls self-delimited JPEG
//!   frames out of a multipart HTTP body one at a time.
//!
//! Setup failures are returned from `open`. Everything that goes wrong
//! afterwards (lost fragments, bad datagrams, decode failures, feedback
//! that never arrives) is logged and counted instead.

pub mod config;
pub mod decoder;
pub mod error;
pub mod feedback;
pub mod puller;
pub mod receiver;
pub mod sink;

pub use config::{PullConfig, ServiceConfig, UdpStreamConfig, DEFAULT_DEVICE, DEFAULT_UDP_PORT};
pub use decoder::{Decoder, Image, PixelFormat, StreamDecoder};
pub use error::{ClientError, Result};
pub use feedback::{FeedbackDelivery, FeedbackDispatcher};
pub use puller::{MjpegPuller, PulledFrames};
pub use receiver::{ReceiverStats, UdpReceiver};
pub use sink::LatestFrame;
