use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Fragment header: frame id (4) + fragment index (2) + fragment count (2)
/// + payload length (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// One datagram's slice of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Frame this fragment belongs to. Increases per frame, wraps at 2^32.
    pub frame_id: u32,
    /// 0-based position of this fragment inside the frame.
    pub frag_index: u16,
    /// Total number of fragments making up the frame.
    pub frag_count: u16,
    /// The fragment's slice of the frame.
    pub payload: Bytes,
}

impl Fragment {
    /// Create a new fragment.
    pub fn new(frame_id: u32, frag_index: u16, frag_count: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_id,
            frag_index,
            frag_count,
            payload: payload.into(),
        }
    }

    /// The total wire size of this fragment (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a fragment into the wire format.
///
/// Wire format (all fields little-endian):
/// ```text
/// ┌────────────┬────────────┬────────────┬──────────────┬──────────────────┐
/// │ Frame id   │ Frag index │ Frag count │ Payload len  │ Payload          │
/// │ (4B LE)    │ (2B LE)    │ (2B LE)    │ (4B LE)      │ (len bytes)      │
/// └────────────┴────────────┴────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_fragment(fragment: &Fragment, dst: &mut BytesMut) -> Result<()> {
    if fragment.payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: fragment.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(fragment.wire_size());
    dst.put_u32_le(fragment.frame_id);
    dst.put_u16_le(fragment.frag_index);
    dst.put_u16_le(fragment.frag_count);
    dst.put_u32_le(fragment.payload.len() as u32);
    dst.put_slice(&fragment.payload);
    Ok(())
}

/// Decode one datagram into a fragment.
///
/// The payload is a zero-copy slice of `datagram`. Fails with
/// [`FrameError::MalformedHeader`] when the datagram cannot hold a header and
/// with [`FrameError::LengthMismatch`] when the bytes after the header are
/// not exactly the declared length.
pub fn decode_fragment(datagram: Bytes) -> Result<Fragment> {
    if datagram.len() < HEADER_SIZE {
        return Err(FrameError::MalformedHeader {
            len: datagram.len(),
        });
    }

    let frame_id = u32::from_le_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]);
    let frag_index = u16::from_le_bytes([datagram[4], datagram[5]]);
    let frag_count = u16::from_le_bytes([datagram[6], datagram[7]]);
    let declared = u32::from_le_bytes([datagram[8], datagram[9], datagram[10], datagram[11]]);

    let actual = datagram.len() - HEADER_SIZE;
    if actual != declared as usize {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    Ok(Fragment {
        frame_id,
        frag_index,
        frag_count,
        payload: datagram.slice(HEADER_SIZE..),
    })
}
