use std::io::{self, ErrorKind};

use bytes::{Bytes, BytesMut};
use silkcast_transport::{DatagramSocket, TransportError};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::header::{encode_fragment, Fragment, HEADER_SIZE};

/// Largest payload the sending service puts in one datagram.
pub const DEFAULT_MTU: usize = 1400;

/// Destination for encoded datagrams.
pub trait DatagramSink {
    /// Send one datagram. Partial sends are not possible.
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()>;
}

impl DatagramSink for Vec<Vec<u8>> {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.push(datagram.to_vec());
        Ok(())
    }
}

/// Sends to the socket's connected peer.
impl DatagramSink for DatagramSocket {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.send(datagram).map(|_| ()).map_err(transport_to_io_error)
    }
}

fn transport_to_io_error(err: TransportError) -> io::Error {
    match err {
        TransportError::Io(io) => io,
        TransportError::Bind { source, .. } => source,
        other => io::Error::other(other.to_string()),
    }
}

/// Splits frames into fragments and sends them as datagrams.
///
/// Frame ids start at 0 and advance by one per frame, wrapping at 2^32.
pub struct FragmentWriter<T> {
    inner: T,
    mtu: usize,
    next_frame_id: u32,
    buf: BytesMut,
}

impl<T: DatagramSink> FragmentWriter<T> {
    /// Create a writer with the default MTU.
    pub fn new(inner: T) -> Self {
        Self::with_mtu(inner, DEFAULT_MTU)
    }

    /// Create a writer that puts at most `mtu` payload bytes in each
    /// datagram (header excluded).
    pub fn with_mtu(inner: T, mtu: usize) -> Self {
        Self {
            inner,
            mtu: mtu.max(1),
            next_frame_id: 0,
            buf: BytesMut::with_capacity(HEADER_SIZE + mtu),
        }
    }

    /// Send a frame under the next frame id. Returns the id used.
    pub fn send_frame(&mut self, data: &[u8]) -> Result<u32> {
        let frame_id = self.next_frame_id;
        self.send_frame_with_id(frame_id, data)?;
        Ok(frame_id)
    }

    /// Send a frame under an explicit id. Subsequent automatic ids continue
    /// from `frame_id + 1`.
    pub fn send_frame_with_id(&mut self, frame_id: u32, data: &[u8]) -> Result<()> {
        let fragments = split_frame(frame_id, Bytes::copy_from_slice(data), self.mtu)?;
        trace!(frame_id, fragments = fragments.len(), len = data.len(), "sending frame");

        for fragment in &fragments {
            self.buf.clear();
            encode_fragment(fragment, &mut self.buf)?;
            loop {
                match self.inner.send_datagram(&self.buf) {
                    Ok(()) => break,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => return Err(FrameError::Io(err)),
                }
            }
        }

        self.next_frame_id = frame_id.wrapping_add(1);
        Ok(())
    }

    /// Id the next [`send_frame`](Self::send_frame) will use.
    pub fn next_frame_id(&self) -> u32 {
        self.next_frame_id
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Cut `data` into fragments of at most `mtu` payload bytes.
///
/// An empty frame becomes a single empty fragment.
pub fn split_frame(frame_id: u32, data: Bytes, mtu: usize) -> Result<Vec<Fragment>> {
    let mtu = mtu.max(1);
    let count = data.len().div_ceil(mtu).max(1);
    let frag_count = u16::try_from(count).map_err(|_| FrameError::PayloadTooLarge {
        size: data.len(),
        max: usize::from(u16::MAX) * mtu,
    })?;

    if data.is_empty() {
        return Ok(vec![Fragment::new(frame_id, 0, 1, data)]);
    }

    Ok((0..frag_count)
        .map(|index| {
            let start = usize::from(index) * mtu;
            let end = (start + mtu).min(data.len());
            Fragment::new(frame_id, index, frag_count, data.slice(start..end))
        })
        .collect())
}

impl<T> std::fmt::Debug for FragmentWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentWriter")
            .field("mtu", &self.mtu)
            .field("next_frame_id", &self.next_frame_id)
            .finish()
    }
}
