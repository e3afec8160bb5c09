//! Decoder adapter: compressed frame bytes in, images out.
//!
//! The variant is chosen once, when the engine is built. Decoding never
//! happens while the frame sink is locked.

use bytes::Bytes;
use tracing::trace;

use crate::error::Result;

/// Layout of [`Image::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Still compressed, exactly as received (identity decoding).
    Compressed,
    /// Packed 8-bit RGB, `width * height * 3` bytes.
    Rgb8,
}

/// A frame as handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Pixel width; 0 when unknown (compressed passthrough).
    pub width: u32,
    /// Pixel height; 0 when unknown (compressed passthrough).
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
}

impl Image {
    /// Wrap undecoded frame bytes.
    pub fn compressed(data: Bytes) -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::Compressed,
            data,
        }
    }
}

/// A stateful decoder for predictive codecs.
///
/// One input may produce no image (the decoder is still buffering reference
/// data) or several (reordered frames being released).
pub trait StreamDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<Image>>;
}

/// The closed set of decoding strategies.
#[derive(Default)]
pub enum Decoder {
    /// Pass frame bytes through untouched.
    #[default]
    Identity,
    /// Decode each frame as a standalone JPEG into RGB.
    #[cfg(feature = "jpeg")]
    Jpeg,
    /// Feed frames to a stateful decoder.
    Streaming(Box<dyn StreamDecoder>),
}

impl Decoder {
    /// Wrap a stateful decoder.
    pub fn streaming(decoder: impl StreamDecoder + 'static) -> Self {
        Decoder::Streaming(Box::new(decoder))
    }

    /// Decode one complete frame buffer.
    ///
    /// An empty result is not an error.
    pub fn decode(&mut self, data: &Bytes) -> Result<Vec<Image>> {
        match self {
            Decoder::Identity => Ok(vec![Image::compressed(data.clone())]),
            #[cfg(feature = "jpeg")]
            Decoder::Jpeg => decode_jpeg(data).map(|image| vec![image]),
            Decoder::Streaming(inner) => {
                let images = inner.decode(data)?;
                trace!(len = data.len(), images = images.len(), "streaming decode");
                Ok(images)
            }
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Decoder::Identity => "identity",
            #[cfg(feature = "jpeg")]
            Decoder::Jpeg => "jpeg",
            Decoder::Streaming(_) => "streaming",
        }
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Decoder").field(&self.name()).finish()
    }
}

#[cfg(feature = "jpeg")]
fn decode_jpeg(data: &[u8]) -> Result<Image> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|err| crate::ClientError::Decode(err.to_string()))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Image {
        width,
        height,
        format: PixelFormat::Rgb8,
        data: Bytes::from(rgb.into_raw()),
    })
}
