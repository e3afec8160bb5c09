use std::io::{ErrorKind, Read};

use silkcast_transport::LiveStream;
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::scanner::{BoundaryScanner, ScannedFrame, ScannerConfig};

/// Bytes requested from the stream per read.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Reads complete JPEG frames from any `Read` stream.
///
/// Handles partial reads internally. A partial frame left when the stream
/// ends is discarded.
pub struct ScanReader<T> {
    inner: T,
    scanner: BoundaryScanner,
    chunk: Vec<u8>,
    eof: bool,
}

impl<T: Read> ScanReader<T> {
    /// Create a new scan reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, ScannerConfig::default(), DEFAULT_CHUNK_SIZE)
    }

    /// Create a new scan reader with explicit configuration.
    pub fn with_config(inner: T, config: ScannerConfig, chunk_size: usize) -> Self {
        Self {
            inner,
            scanner: BoundaryScanner::with_config(config),
            chunk: vec![0u8; chunk_size.max(1)],
            eof: false,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` once the stream is exhausted.
    pub fn read_frame(&mut self) -> Result<Option<ScannedFrame>> {
        loop {
            if let Some(frame) = self.scanner.next_frame() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                self.eof = true;
                if self.scanner.buffered() > 0 {
                    debug!(
                        buffered = self.scanner.buffered(),
                        "stream ended inside a frame"
                    );
                }
                self.scanner.clear();
                return Ok(None);
            }

            self.scanner.push(&self.chunk[..read]);
        }
    }

    /// Whether the stream has reported end of file.
    pub fn is_exhausted(&self) -> bool {
        self.eof
    }

    /// The scanner driving this reader.
    pub fn scanner(&self) -> &BoundaryScanner {
        &self.scanner
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl ScanReader<LiveStream> {
    /// Release the HTTP connection. Later reads yield no frames.
    pub fn close(&mut self) {
        self.inner.close();
        self.scanner.clear();
        self.eof = true;
    }
}

impl<T: Read> Iterator for ScanReader<T> {
    type Item = Result<ScannedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

impl<T> std::fmt::Debug for ScanReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanReader")
            .field("scanner", &self.scanner)
            .field("chunk_size", &self.chunk.len())
            .field("eof", &self.eof)
            .finish()
    }
}
