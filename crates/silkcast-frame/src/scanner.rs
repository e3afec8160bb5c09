use std::time::SystemTime;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::reassembler::DEFAULT_MAX_FRAME_SIZE;

/// JPEG start-of-image marker.
pub const START_MARKER: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];

const MARKER_LEN: usize = 2;

/// Configuration for the boundary scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    /// A partial frame longer than this is discarded and the scanner
    /// resynchronises on the next start marker.
    pub max_frame_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// A self-delimited frame cut out of a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFrame {
    /// 0-based extraction counter, per scanner instance.
    pub sequence: u64,
    /// Wall-clock time of extraction.
    pub timestamp: SystemTime,
    /// The frame including its start and end markers.
    pub data: Bytes,
}

/// Counters kept across the scanner's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Frames extracted.
    pub frames: u64,
    /// Bytes thrown away (inter-frame junk, multipart headers, oversize partials).
    pub discarded_bytes: u64,
    /// Partial frames dropped for exceeding the size limit.
    pub oversized: u64,
}

/// Marker search state over a buffer owned by someone else.
///
/// Shared by [`BoundaryScanner`] (owns its buffer) and the async codec
/// (buffer owned by the framed reader).
#[derive(Debug, Clone)]
pub(crate) struct ScanState {
    config: ScannerConfig,
    /// Non-zero while the buffer starts with a start marker whose end
    /// marker has not been found; the end search resumes here.
    resume_at: usize,
    pub(crate) stats: ScanStats,
}

impl ScanState {
    pub(crate) fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            resume_at: 0,
            stats: ScanStats::default(),
        }
    }

    /// Cut the next complete frame off the front of `buf`.
    ///
    /// Returns `None` once `buf` holds no complete frame. At that point
    /// `buf` is trimmed to either the one partial frame that starts at a
    /// start marker, or at most one trailing `0xFF` that may begin a marker
    /// split across chunks.
    pub(crate) fn extract(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            if self.resume_at == 0 {
                match find(buf, &START_MARKER, 0) {
                    Some(start) => {
                        self.discard(buf, start);
                        self.resume_at = MARKER_LEN;
                    }
                    None => {
                        let keep = usize::from(buf.last() == Some(&START_MARKER[0]));
                        self.discard(buf, buf.len() - keep);
                        return None;
                    }
                }
            }

            if let Some(end) = find(buf, &END_MARKER, self.resume_at) {
                self.resume_at = 0;
                self.stats.frames += 1;
                return Some(buf.split_to(end + MARKER_LEN).freeze());
            }

            if buf.len() <= self.config.max_frame_size {
                self.resume_at = buf.len().saturating_sub(1).max(MARKER_LEN);
                return None;
            }

            warn!(
                buffered = buf.len(),
                max = self.config.max_frame_size,
                "partial frame exceeds size limit; resynchronising"
            );
            self.stats.oversized += 1;
            self.resume_at = 0;
            let next_start = find(buf, &START_MARKER, MARKER_LEN).unwrap_or(buf.len());
            self.discard(buf, next_start);
        }
    }

    /// Forget any partial-frame progress.
    pub(crate) fn reset(&mut self) {
        self.resume_at = 0;
    }

    fn discard(&mut self, buf: &mut BytesMut, len: usize) {
        if len > 0 {
            self.stats.discarded_bytes += len as u64;
            buf.advance(len);
        }
    }
}

fn find(haystack: &[u8], marker: &[u8; MARKER_LEN], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(MARKER_LEN)
        .position(|window| window == marker)
        .map(|pos| pos + from)
}

/// Incremental JPEG frame extractor for chunked byte streams.
///
/// Chunks are appended with [`feed`](Self::feed); the returned iterator
/// yields every frame fully contained in the bytes seen so far, in stream
/// order, before more input is needed. Markers split across chunk
/// boundaries are handled.
#[derive(Debug)]
pub struct BoundaryScanner {
    buf: BytesMut,
    state: ScanState,
    next_sequence: u64,
}

impl Default for BoundaryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryScanner {
    /// Create a scanner with default configuration.
    pub fn new() -> Self {
        Self::with_config(ScannerConfig::default())
    }

    /// Create a scanner with explicit configuration.
    pub fn with_config(config: ScannerConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            state: ScanState::new(config),
            next_sequence: 0,
        }
    }

    /// Append a chunk and iterate the frames it completes.
    ///
    /// The iterator is lazy: frames not pulled before it is dropped stay
    /// buffered and come out of the next `feed` or [`next_frame`](Self::next_frame).
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.push(chunk);
        Frames { scanner: self }
    }

    /// Append a chunk without scanning.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extract the next complete frame from buffered bytes.
    pub fn next_frame(&mut self) -> Option<ScannedFrame> {
        let data = self.state.extract(&mut self.buf)?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Some(ScannedFrame {
            sequence,
            timestamp: SystemTime::now(),
            data,
        })
    }

    /// Bytes retained between calls (the trailing partial frame, if any).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Sequence number the next frame will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Lifetime counters.
    pub fn stats(&self) -> ScanStats {
        self.state.stats
    }

    /// Drop buffered bytes. Sequence numbering continues.
    pub fn clear(&mut self) {
        if !self.buf.is_empty() {
            debug!(buffered = self.buf.len(), "discarding buffered partial frame");
        }
        self.buf.clear();
        self.state.reset();
    }
}

/// Frames completed by one [`BoundaryScanner::feed`] call.
#[derive(Debug)]
pub struct Frames<'a> {
    scanner: &'a mut BoundaryScanner,
}

impl Iterator for Frames<'_> {
    type Item = ScannedFrame;

    fn next(&mut self) -> Option<ScannedFrame> {
        self.scanner.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = START_MARKER.to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(&END_MARKER);
        out
    }

    fn stream() -> Vec<u8> {
        let mut out = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        out.extend(jpeg(b"first-image"));
        out.extend_from_slice(b"\r\n--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        out.extend(jpeg(b"\x00\xff\x00second"));
        out.extend_from_slice(b"\r\n--frame\r\n");
        out.extend(jpeg(b""));
        out.extend_from_slice(b"\r\n");
        out
    }

    fn collect(scanner: &mut BoundaryScanner, chunks: &[&[u8]]) -> Vec<ScannedFrame> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(scanner.feed(chunk));
        }
        out
    }

    #[test]
    fn two_frames_in_one_chunk() {
        let mut input = jpeg(b"A");
        input.extend(jpeg(b"B"));

        let mut scanner = BoundaryScanner::new();
        let frames: Vec<_> = scanner.feed(&input).collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8A\xff\xd9");
        assert_eq!(frames[1].data.as_ref(), b"\xff\xd8B\xff\xd9");
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn every_two_way_split_matches_contiguous_scan() {
        let input = stream();
        let expected: Vec<Bytes> = BoundaryScanner::new()
            .feed(&input)
            .map(|f| f.data)
            .collect();
        assert_eq!(expected.len(), 3);

        for split in 0..=input.len() {
            let mut scanner = BoundaryScanner::new();
            let frames = collect(&mut scanner, &[&input[..split], &input[split..]]);
            let data: Vec<Bytes> = frames.iter().map(|f| f.data.clone()).collect();
            assert_eq!(data, expected, "split at {split}");
            let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
            assert_eq!(sequences, vec![0, 1, 2]);
        }
    }

    #[test]
    fn byte_at_a_time_matches_contiguous_scan() {
        let input = stream();
        let expected: Vec<Bytes> = BoundaryScanner::new()
            .feed(&input)
            .map(|f| f.data)
            .collect();

        let mut scanner = BoundaryScanner::new();
        let chunks: Vec<&[u8]> = input.chunks(1).collect();
        let data: Vec<Bytes> = collect(&mut scanner, &chunks)
            .into_iter()
            .map(|f| f.data)
            .collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn partial_frame_is_retained_until_completed() {
        let mut scanner = BoundaryScanner::new();
        assert_eq!(scanner.feed(b"junk\xff\xd8abc").count(), 0);
        assert_eq!(scanner.buffered(), 5);

        let frames: Vec<_> = scanner.feed(b"def\xff\xd9tail").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8abcdef\xff\xd9");
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn junk_without_marker_keeps_minimal_tail() {
        let mut scanner = BoundaryScanner::new();
        assert_eq!(scanner.feed(b"no markers here").count(), 0);
        assert_eq!(scanner.buffered(), 0);

        assert_eq!(scanner.feed(b"ends with \xff").count(), 0);
        assert_eq!(scanner.buffered(), 1);

        let frames: Vec<_> = scanner.feed(b"\xd8x\xff\xd9").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8x\xff\xd9");
    }

    #[test]
    fn end_marker_split_across_chunks() {
        let mut scanner = BoundaryScanner::new();
        assert_eq!(scanner.feed(b"\xff\xd8body\xff").count(), 0);
        let frames: Vec<_> = scanner.feed(b"\xd9").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8body\xff\xd9");
    }

    #[test]
    fn start_marker_bytes_do_not_close_frame() {
        let mut scanner = BoundaryScanner::new();
        let frames: Vec<_> = scanner.feed(b"\xff\xd8\xd9\xff\xd9").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8\xd9\xff\xd9");
    }

    #[test]
    fn unconsumed_frames_survive_dropped_iterator() {
        let mut input = jpeg(b"1");
        input.extend(jpeg(b"2"));

        let mut scanner = BoundaryScanner::new();
        let first = scanner.feed(&input).next().unwrap();
        assert_eq!(first.sequence, 0);

        let second = scanner.next_frame().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.data.as_ref(), b"\xff\xd82\xff\xd9");
    }

    #[test]
    fn oversized_partial_frame_is_dropped_and_scanner_resyncs() {
        let mut scanner = BoundaryScanner::with_config(ScannerConfig { max_frame_size: 8 });
        assert_eq!(scanner.feed(b"\xff\xd8never-ending-frame").count(), 0);
        assert_eq!(scanner.stats().oversized, 1);
        assert!(scanner.buffered() <= 1);

        let frames: Vec<_> = scanner.feed(b"\xff\xd8ok\xff\xd9").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8ok\xff\xd9");
        assert_eq!(frames[0].sequence, 0);
    }

    #[test]
    fn oversized_partial_frame_resyncs_on_embedded_start() {
        let mut scanner = BoundaryScanner::with_config(ScannerConfig { max_frame_size: 10 });
        assert_eq!(scanner.feed(b"\xff\xd8lost-end\xff\xd8go").count(), 0);
        assert_eq!(scanner.stats().oversized, 1);
        assert_eq!(scanner.buffered(), 4);

        let frames: Vec<_> = scanner.feed(b"od\xff\xd9").collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.as_ref(), b"\xff\xd8good\xff\xd9");
    }

    #[test]
    fn stats_count_frames_and_discards() {
        let mut scanner = BoundaryScanner::new();
        let count = scanner.feed(&stream()).count();
        let stats = scanner.stats();
        assert_eq!(stats.frames, count as u64);
        assert!(stats.discarded_bytes > 0);
        assert_eq!(scanner.next_sequence(), 3);
    }

    #[test]
    fn clear_drops_partial_frame() {
        let mut scanner = BoundaryScanner::new();
        assert_eq!(scanner.feed(b"\xff\xd8half").count(), 0);
        scanner.clear();
        assert_eq!(scanner.buffered(), 0);
        assert_eq!(scanner.feed(b"\xff\xd9").count(), 0);
    }
}
