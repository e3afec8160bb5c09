//! Codecs the service can stream.

use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Compression used for the frames of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoCodec {
    /// Motion JPEG: every frame is a standalone JPEG image.
    #[default]
    Mjpeg,
    /// H.264 Annex-B: predictive, frames depend on earlier reference frames.
    H264,
}

impl VideoCodec {
    /// Name used on the wire and in query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::Mjpeg => "mjpeg",
            VideoCodec::H264 => "h264",
        }
    }

    /// Whether losing a frame can corrupt the frames after it.
    ///
    /// Only then does asking the sender for a fresh reference frame help.
    pub fn uses_reference_frames(self) -> bool {
        matches!(self, VideoCodec::H264)
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "jpeg" => Ok(VideoCodec::Mjpeg),
            "h264" | "avc" => Ok(VideoCodec::H264),
            other => Err(FrameError::UnknownCodec(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names() {
        assert_eq!("mjpeg".parse::<VideoCodec>().unwrap(), VideoCodec::Mjpeg);
        assert_eq!("H264".parse::<VideoCodec>().unwrap(), VideoCodec::H264);
        assert!(matches!(
            "vp9".parse::<VideoCodec>(),
            Err(FrameError::UnknownCodec(name)) if name == "vp9"
        ));
    }

    #[test]
    fn only_predictive_codecs_use_reference_frames() {
        assert!(!VideoCodec::Mjpeg.uses_reference_frames());
        assert!(VideoCodec::H264.uses_reference_frames());
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(VideoCodec::H264.to_string(), "h264");
        assert_eq!(VideoCodec::default().to_string(), "mjpeg");
    }
}
