//! `tokio-util` codec adapter for the boundary scanner.

use std::time::SystemTime;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::error::FrameError;
use crate::scanner::{ScanState, ScanStats, ScannedFrame, ScannerConfig};

/// Extracts JPEG frames from an async byte stream via `FramedRead`.
#[derive(Debug, Clone)]
pub struct ScanCodec {
    state: ScanState,
    next_sequence: u64,
}

impl Default for ScanCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCodec {
    pub fn new() -> Self {
        Self::with_config(ScannerConfig::default())
    }

    pub fn with_config(config: ScannerConfig) -> Self {
        Self {
            state: ScanState::new(config),
            next_sequence: 0,
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.state.stats
    }
}

impl Decoder for ScanCodec {
    type Item = ScannedFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ScannedFrame>, FrameError> {
        let Some(data) = self.state.extract(src) else {
            return Ok(None);
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(Some(ScannedFrame {
            sequence,
            timestamp: SystemTime::now(),
            data,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ScannedFrame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                self.state.reset();
                Ok(None)
            }
        }
    }
}
