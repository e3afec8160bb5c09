//! Frame reconstruction for lossy and chunked video transports.
//!
//! SilkCast rebuilds discrete video frames from two kinds of transport:
//! fragmented UDP datagrams that may arrive out of order or not at all,
//! and multipart HTTP bodies whose chunks split frames at arbitrary points.
//!
//! # Crate Structure
//!
//! - [`transport`]: UDP sockets, chunked HTTP bodies, service control plane
//! - [`frame`]: fragment codec, reassembler, feedback controller, boundary scanner
//! - [`client`]: UDP receiver and MJPEG pull engines (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use silkcast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use silkcast_frame::*;
}

/// Re-export engine types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use silkcast_client::*;
}
