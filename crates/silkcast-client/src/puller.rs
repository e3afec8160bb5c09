use silkcast_frame::{FrameError, ScanReader, ScanStats, ScannedFrame};
use silkcast_transport::LiveStream;
use tracing::{info, warn};

use crate::config::PullConfig;
use crate::decoder::{Decoder, Image};
use crate::error::{ClientError, Result};

/// Pull-model engine for multipart MJPEG streams.
///
/// Frames are read only when asked for; the consumer's pace is the
/// stream's pace. A transport failure mid-stream ends the sequence instead
/// of surfacing as an error, and a partial trailing frame is never
/// delivered.
#[derive(Debug)]
pub struct MjpegPuller {
    reader: ScanReader<LiveStream>,
    decoder: Decoder,
    closed: bool,
}

impl MjpegPuller {
    /// Request the device's live feed and start scanning it.
    ///
    /// Fails with [`ClientError::Connection`] when the service cannot be
    /// reached or answers with anything but 200.
    pub fn open(config: PullConfig) -> Result<Self> {
        let client = config.service.client();
        let stream = client.open_live(&config.service.device, &config.query_params())?;
        info!(source = stream.source(), "mjpeg stream opened");
        Ok(Self::from_stream(stream, &config))
    }

    /// Scan an already open stream, such as a recorded file.
    pub fn from_stream(stream: LiveStream, config: &PullConfig) -> Self {
        Self {
            reader: ScanReader::with_config(stream, config.scanner, config.chunk_size),
            decoder: Decoder::Identity,
            closed: false,
        }
    }

    /// Use `decoder` for [`next_image`](Self::next_image).
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Open the feed, take the first complete frame and close again.
    pub fn grab_one(config: PullConfig) -> Result<ScannedFrame> {
        let mut puller = Self::open(config)?;
        let frame = puller.next_frame();
        puller.close();
        frame.ok_or(ClientError::Frame(FrameError::ConnectionClosed))
    }

    /// Block until the next complete frame, or `None` once the stream ended.
    pub fn next_frame(&mut self) -> Option<ScannedFrame> {
        if self.closed {
            return None;
        }
        match self.reader.read_frame() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                info!(source = self.source(), "mjpeg stream ended");
                self.close();
                None
            }
            Err(err) => {
                warn!(source = self.source(), error = %err, "mjpeg stream failed");
                self.close();
                None
            }
        }
    }

    /// Lazy sequence of frames; resumes where the previous one stopped.
    pub fn frames(&mut self) -> PulledFrames<'_> {
        PulledFrames { puller: self }
    }

    /// Next frame that the decoder turns into an image.
    ///
    /// Frames the decoder rejects, or that yield no image, are skipped.
    pub fn next_image(&mut self) -> Option<(ScannedFrame, Image)> {
        loop {
            let frame = self.next_frame()?;
            match self.decoder.decode(&frame.data) {
                Ok(images) => {
                    if let Some(image) = images.into_iter().last() {
                        return Some((frame, image));
                    }
                }
                Err(err) => {
                    warn!(sequence = frame.sequence, error = %err, "decode failed");
                }
            }
        }
    }

    /// Scanner counters.
    pub fn stats(&self) -> ScanStats {
        self.reader.scanner().stats()
    }

    /// Where the stream comes from.
    pub fn source(&self) -> &str {
        self.reader.get_ref().source()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the connection. Later calls yield nothing. Safe to call twice.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.close();
    }
}

impl Drop for MjpegPuller {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator returned by [`MjpegPuller::frames`].
#[derive(Debug)]
pub struct PulledFrames<'a> {
    puller: &'a mut MjpegPuller,
}

impl Iterator for PulledFrames<'_> {
    type Item = ScannedFrame;

    fn next(&mut self) -> Option<ScannedFrame> {
        self.puller.next_frame()
    }
}
