//! Frame reconstruction for SilkCast streams.
//!
//! Two reassembly disciplines turn transport bytes back into frames:
//! - **UDP**: every datagram carries a 12-byte little-endian header
//!   (frame id, fragment index, fragment count, payload length). The
//!   [`Reassembler`] stitches fragments of the current frame together,
//!   reports abandoned frames and frame-id gaps, and the
//!   [`FeedbackController`] turns gaps into rate-limited reference-frame
//!   requests.
//! - **Chunked byte streams**: the [`BoundaryScanner`] extracts
//!   self-delimited JPEG frames (`FF D8` .. `FF D9`) from arbitrarily split
//!   chunks while retaining at most one partial frame.
//!
//! No socket handling and no decoding happens here.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod error;
pub mod feedback;
pub mod header;
pub mod reader;
pub mod reassembler;
pub mod scanner;
pub mod video;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::ScanCodec;
pub use error::{FrameError, Result};
pub use feedback::{
    FeedbackController, FeedbackOutcome, FeedbackSink, FeedbackStats, DEFAULT_COOLDOWN,
};
pub use header::{decode_fragment, encode_fragment, Fragment, HEADER_SIZE};
pub use reader::{ScanReader, DEFAULT_CHUNK_SIZE};
pub use reassembler::{
    CompletedFrame, Ingest, Reassembler, ReassemblerConfig, ReassemblyStats, SequenceGap,
    DEFAULT_MAX_FRAME_SIZE,
};
pub use scanner::{
    BoundaryScanner, Frames, ScanStats, ScannedFrame, ScannerConfig, END_MARKER, START_MARKER,
};
pub use video::VideoCodec;
pub use writer::{split_frame, DatagramSink, FragmentWriter, DEFAULT_MTU};
