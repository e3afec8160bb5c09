/// Errors that can occur while decoding fragments or scanning frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The datagram is shorter than the fixed fragment header.
    #[error("malformed fragment header ({len} bytes, need {need})", need = crate::header::HEADER_SIZE)]
    MalformedHeader { len: usize },

    /// The payload following the header does not match the declared length.
    #[error("fragment length mismatch (declared {declared}, actual {actual})")]
    LengthMismatch { declared: u32, actual: usize },

    /// The fragment index lies outside `0..fragCount`.
    #[error("fragment index {index} out of range for {count} fragments")]
    FragmentIndexOutOfRange { index: u16, count: u16 },

    /// The fragment announces a frame made of zero fragments.
    #[error("fragment declares an empty frame (fragment count 0)")]
    EmptyFrame,

    /// A fragment disagrees with the live frame about the fragment count.
    #[error("frame {frame_id} fragment count changed ({expected} -> {actual})")]
    FragmentCountMismatch {
        frame_id: u32,
        expected: u16,
        actual: u16,
    },

    /// A frame is too large to send or buffer.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The codec name is not one the service understands.
    #[error("unknown codec {0:?} (expected \"mjpeg\" or \"h264\")")]
    UnknownCodec(String),

    /// An I/O error occurred while reading chunks or sending datagrams.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for per-fragment validation failures that the receive path drops
    /// silently instead of propagating.
    pub fn is_malformed_fragment(&self) -> bool {
        matches!(
            self,
            FrameError::MalformedHeader { .. }
                | FrameError::LengthMismatch { .. }
                | FrameError::FragmentIndexOutOfRange { .. }
                | FrameError::EmptyFrame
                | FrameError::FragmentCountMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
