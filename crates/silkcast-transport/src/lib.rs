//! Wire access for SilkCast streams.
//!
//! Provides the raw byte sources the frame reconstruction layers build on:
//! - UDP datagram sockets with a periodic receive timeout
//! - Chunked HTTP response bodies exposed as plain [`std::io::Read`]
//! - The remote service's control plane (stream start, feedback)
//!
//! Nothing in this crate knows what a frame is.

pub mod error;
pub mod http;
pub mod stream;
pub mod udp;

pub use error::{Result, TransportError};
pub use http::{ControlClient, FeedbackKind, UdpStreamRequest};
pub use stream::LiveStream;
pub use udp::{local_ip, DatagramSocket, MAX_DATAGRAM_SIZE};
