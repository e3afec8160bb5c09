use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::error::{FrameError, Result};
use crate::header::Fragment;

/// Default maximum reassembled frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default backward frame-id jump treated as a sender restart.
const DEFAULT_RESTART_WINDOW: u32 = 1024;

/// Configuration for the fragment reassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblerConfig {
    /// Largest frame, in payload bytes, that will be buffered. A frame that
    /// grows past this is abandoned.
    pub max_frame_size: usize,
    /// A frame id this far or further behind the last started id is taken
    /// as the sender restarting its counter instead of a stale fragment.
    /// `None` treats every backward id as stale.
    pub restart_window: Option<u32>,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            restart_window: Some(DEFAULT_RESTART_WINDOW),
        }
    }
}

/// A frame rebuilt from all of its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub frame_id: u32,
    /// Payloads of fragments `0..fragCount` concatenated in index order.
    pub data: Bytes,
}

/// One or more whole frames that never showed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// Last frame id that started assembling before the gap.
    pub previous: u32,
    /// Frame id that revealed the gap.
    pub current: u32,
}

impl SequenceGap {
    /// Number of frame ids skipped between `previous` and `current`.
    pub fn missing(&self) -> u32 {
        self.current.wrapping_sub(self.previous).wrapping_sub(1)
    }
}

/// What a single fragment did to the reassembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingest {
    /// The frame this fragment completed.
    pub completed: Option<CompletedFrame>,
    /// Frame id whose assembly this fragment started.
    pub started: Option<u32>,
    /// Incomplete frame retired by this fragment.
    pub abandoned: Option<u32>,
    /// Frames lost in flight, detected when this fragment started its frame.
    pub gap: Option<SequenceGap>,
    /// The fragment belonged to an already-retired frame and was dropped.
    pub stale: bool,
}

/// Counters kept across the reassembler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Fragments that passed validation.
    pub fragments: u64,
    /// Frames emitted complete.
    pub completed: u64,
    /// Frames retired before all fragments arrived.
    pub abandoned: u64,
    /// Gap events.
    pub gaps: u64,
    /// Frame ids skipped across all gaps.
    pub missing_frames: u64,
    /// Fragments dropped because their frame was already retired.
    pub stale: u64,
    /// Datagrams or fragments rejected as malformed.
    pub malformed: u64,
}

#[derive(Debug)]
struct Assembly {
    frame_id: u32,
    frag_count: u16,
    fragments: BTreeMap<u16, Bytes>,
    buffered: usize,
}

impl Assembly {
    fn new(frame_id: u32, frag_count: u16) -> Self {
        Self {
            frame_id,
            frag_count,
            fragments: BTreeMap::new(),
            buffered: 0,
        }
    }

    fn insert(&mut self, index: u16, payload: Bytes) {
        let added = payload.len();
        if let Some(previous) = self.fragments.insert(index, payload) {
            self.buffered -= previous.len();
        }
        self.buffered += added;
    }

    /// Every key is below `frag_count` and keys are unique, so equal
    /// cardinality means the key set is exactly `0..frag_count`.
    fn is_complete(&self) -> bool {
        self.fragments.len() == usize::from(self.frag_count)
    }

    fn into_frame(self) -> CompletedFrame {
        let data = if self.fragments.len() == 1 {
            self.fragments.into_values().next().unwrap_or_default()
        } else {
            let mut data = BytesMut::with_capacity(self.buffered);
            for payload in self.fragments.values() {
                data.extend_from_slice(payload);
            }
            data.freeze()
        };
        CompletedFrame {
            frame_id: self.frame_id,
            data,
        }
    }
}

enum Position {
    First,
    Ahead { missing: u32 },
    Restart,
    Stale,
}

/// Rebuilds frames from UDP fragments, one frame at a time.
///
/// At most one frame is assembling at any moment. A fragment for a newer
/// frame id retires the live frame whether or not it was complete, and a
/// frame id is never assembled twice.
#[derive(Debug, Default)]
pub struct Reassembler {
    config: ReassemblerConfig,
    live: Option<Assembly>,
    last_started: Option<u32>,
    stats: ReassemblyStats,
}

impl Reassembler {
    /// Create a reassembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(ReassemblerConfig::default())
    }

    /// Create a reassembler with explicit configuration.
    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self {
            config,
            live: None,
            last_started: None,
            stats: ReassemblyStats::default(),
        }
    }

    /// Feed one decoded fragment.
    ///
    /// Returns an error only for fragments that are inconsistent on their
    /// own or with the live frame; such fragments are dropped and leave the
    /// live frame untouched.
    pub fn push(&mut self, fragment: Fragment) -> Result<Ingest> {
        if let Err(err) = self.validate(&fragment) {
            self.stats.malformed += 1;
            return Err(err);
        }

        let mut ingest = Ingest::default();
        let frame_id = fragment.frame_id;

        if self.live.as_ref().map(|live| live.frame_id) != Some(frame_id) {
            match self.position_of(frame_id) {
                Position::Stale => {
                    self.stats.stale += 1;
                    debug!(frame_id, index = fragment.frag_index, "dropping stale fragment");
                    ingest.stale = true;
                    return Ok(ingest);
                }
                Position::Ahead { missing } if missing > 0 => {
                    if let Some(previous) = self.last_started {
                        let gap = SequenceGap {
                            previous,
                            current: frame_id,
                        };
                        self.stats.gaps += 1;
                        self.stats.missing_frames += u64::from(missing);
                        warn!(previous, current = frame_id, missing, "frame gap");
                        ingest.gap = Some(gap);
                    }
                }
                Position::Restart => {
                    info!(
                        previous = ?self.last_started,
                        current = frame_id,
                        "frame id jumped backwards; assuming sender restart"
                    );
                }
                Position::First | Position::Ahead { .. } => {}
            }

            ingest.abandoned = self.retire_live();
            self.last_started = Some(frame_id);
            self.live = Some(Assembly::new(frame_id, fragment.frag_count));
            ingest.started = Some(frame_id);
        }

        self.stats.fragments += 1;
        let Some(live) = self.live.as_mut() else {
            return Ok(ingest);
        };
        live.insert(fragment.frag_index, fragment.payload);

        if live.buffered > self.config.max_frame_size {
            warn!(
                frame_id,
                buffered = live.buffered,
                max = self.config.max_frame_size,
                "frame exceeds size limit; abandoning"
            );
            self.live = None;
            self.stats.abandoned += 1;
            ingest.abandoned = Some(frame_id);
            return Ok(ingest);
        }

        if live.is_complete() {
            if let Some(done) = self.live.take() {
                self.stats.completed += 1;
                ingest.completed = Some(done.into_frame());
            }
        }

        Ok(ingest)
    }

    /// Count a datagram that failed to decode before reaching [`push`](Self::push).
    pub fn record_malformed(&mut self) {
        self.stats.malformed += 1;
    }

    /// Frame id currently assembling, if any.
    pub fn live_frame_id(&self) -> Option<u32> {
        self.live.as_ref().map(|live| live.frame_id)
    }

    /// Last frame id that started assembling.
    pub fn last_started(&self) -> Option<u32> {
        self.last_started
    }

    /// True when no frame is assembling.
    pub fn is_idle(&self) -> bool {
        self.live.is_none()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Forget all frame state. Counters are kept.
    pub fn reset(&mut self) {
        self.live = None;
        self.last_started = None;
    }

    /// Current configuration.
    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }

    fn validate(&self, fragment: &Fragment) -> Result<()> {
        if fragment.frag_count == 0 {
            return Err(FrameError::EmptyFrame);
        }
        if fragment.frag_index >= fragment.frag_count {
            return Err(FrameError::FragmentIndexOutOfRange {
                index: fragment.frag_index,
                count: fragment.frag_count,
            });
        }
        if let Some(live) = &self.live {
            if live.frame_id == fragment.frame_id && live.frag_count != fragment.frag_count {
                return Err(FrameError::FragmentCountMismatch {
                    frame_id: live.frame_id,
                    expected: live.frag_count,
                    actual: fragment.frag_count,
                });
            }
        }
        Ok(())
    }

    /// Where `frame_id` sits relative to the last started frame, using
    /// 32-bit serial-number arithmetic so the counter may wrap.
    fn position_of(&self, frame_id: u32) -> Position {
        let Some(last) = self.last_started else {
            return Position::First;
        };
        let ahead = frame_id.wrapping_sub(last);
        if ahead == 0 {
            return Position::Stale;
        }
        if (ahead as i32) > 0 {
            return Position::Ahead { missing: ahead - 1 };
        }
        let behind = last.wrapping_sub(frame_id);
        match self.config.restart_window {
            Some(window) if behind >= window => Position::Restart,
            _ => Position::Stale,
        }
    }

    fn retire_live(&mut self) -> Option<u32> {
        let live = self.live.take()?;
        self.stats.abandoned += 1;
        warn!(
            frame_id = live.frame_id,
            received = live.fragments.len(),
            expected = live.frag_count,
            "dropped incomplete frame"
        );
        Some(live.frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(frame_id: u32, index: u16, count: u16, payload: &'static [u8]) -> Fragment {
        Fragment::new(frame_id, index, count, Bytes::from_static(payload))
    }

    fn push_all(reassembler: &mut Reassembler, fragments: Vec<Fragment>) -> Vec<CompletedFrame> {
        fragments
            .into_iter()
            .filter_map(|f| reassembler.push(f).unwrap().completed)
            .collect()
    }

    /// Every ordering of `items` (Heap's algorithm).
    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            for i in 0..k {
                heap(k - 1, items, out);
                if k % 2 == 0 {
                    items.swap(i, k - 1);
                } else {
                    items.swap(0, k - 1);
                }
            }
        }
        let mut out = Vec::new();
        heap(items.len(), &mut items.to_vec(), &mut out);
        out
    }

    #[test]
    fn single_fragment_frame_completes_immediately() {
        let mut r = Reassembler::new();
        let ingest = r.push(frag(0, 0, 1, b"jpeg")).unwrap();

        assert_eq!(ingest.started, Some(0));
        let frame = ingest.completed.unwrap();
        assert_eq!(frame.frame_id, 0);
        assert_eq!(frame.data.as_ref(), b"jpeg");
        assert!(r.is_idle());
    }

    #[test]
    fn any_arrival_order_yields_one_frame_in_index_order() {
        let fragments = vec![
            frag(5, 0, 4, b"aa"),
            frag(5, 1, 4, b"bb"),
            frag(5, 2, 4, b"cc"),
            frag(5, 3, 4, b"d"),
        ];

        for order in permutations(&fragments) {
            let mut r = Reassembler::new();
            let frames = push_all(&mut r, order);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].frame_id, 5);
            assert_eq!(frames[0].data.as_ref(), b"aabbccd");
        }
    }

    #[test]
    fn incomplete_frame_is_abandoned_without_output() {
        let mut r = Reassembler::new();
        assert!(r.push(frag(1, 0, 3, b"x")).unwrap().completed.is_none());
        assert!(r.push(frag(1, 2, 3, b"z")).unwrap().completed.is_none());

        let ingest = r.push(frag(2, 0, 1, b"next")).unwrap();
        assert_eq!(ingest.abandoned, Some(1));
        assert!(ingest.gap.is_none());
        assert_eq!(ingest.completed.unwrap().frame_id, 2);
        assert_eq!(r.stats().abandoned, 1);
        assert_eq!(r.stats().completed, 1);
    }

    #[test]
    fn missing_frame_id_reports_exactly_one_gap() {
        let mut r = Reassembler::new();
        let mut gaps = Vec::new();
        for id in [0u32, 1, 3] {
            for index in 0..2 {
                let ingest = r.push(frag(id, index, 2, b"p")).unwrap();
                gaps.extend(ingest.gap);
            }
        }

        assert_eq!(
            gaps,
            vec![SequenceGap {
                previous: 1,
                current: 3
            }]
        );
        assert_eq!(gaps[0].missing(), 1);
        assert_eq!(r.stats().gaps, 1);
        assert_eq!(r.stats().missing_frames, 1);
        assert_eq!(r.stats().completed, 3);
    }

    #[test]
    fn abandoned_frame_is_not_a_gap() {
        let mut r = Reassembler::new();
        r.push(frag(0, 0, 1, b"a")).unwrap();
        r.push(frag(1, 0, 2, b"b")).unwrap();
        let ingest = r.push(frag(2, 0, 1, b"c")).unwrap();

        assert!(ingest.gap.is_none());
        assert_eq!(ingest.abandoned, Some(1));
    }

    #[test]
    fn duplicate_fragment_overwrites_without_error() {
        let mut r = Reassembler::new();
        r.push(frag(3, 0, 2, b"old")).unwrap();
        r.push(frag(3, 0, 2, b"new")).unwrap();
        let frame = r.push(frag(3, 1, 2, b"!")).unwrap().completed.unwrap();

        assert_eq!(frame.data.as_ref(), b"new!");
    }

    #[test]
    fn fragments_for_completed_frame_are_stale() {
        let mut r = Reassembler::new();
        r.push(frag(4, 0, 1, b"once")).unwrap();

        let ingest = r.push(frag(4, 0, 1, b"once")).unwrap();
        assert!(ingest.stale);
        assert!(ingest.completed.is_none());
        assert_eq!(r.stats().completed, 1);
        assert_eq!(r.stats().stale, 1);
    }

    #[test]
    fn older_frame_ids_are_ignored() {
        let mut r = Reassembler::new();
        r.push(frag(10, 0, 2, b"a")).unwrap();

        let ingest = r.push(frag(9, 0, 1, b"late")).unwrap();
        assert!(ingest.stale);
        assert_eq!(r.live_frame_id(), Some(10));

        let frame = r.push(frag(10, 1, 2, b"b")).unwrap().completed.unwrap();
        assert_eq!(frame.data.as_ref(), b"ab");
    }

    #[test]
    fn retired_frame_is_never_reassembled() {
        let mut r = Reassembler::new();
        r.push(frag(1, 0, 2, b"a")).unwrap();
        r.push(frag(2, 0, 1, b"b")).unwrap();

        let ingest = r.push(frag(1, 1, 2, b"late")).unwrap();
        assert!(ingest.stale);
        assert!(ingest.completed.is_none());
    }

    #[test]
    fn index_beyond_count_is_rejected_and_live_frame_kept() {
        let mut r = Reassembler::new();
        r.push(frag(1, 0, 2, b"a")).unwrap();

        let err = r.push(frag(2, 5, 2, b"bad")).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FragmentIndexOutOfRange { index: 5, count: 2 }
        ));
        assert_eq!(r.live_frame_id(), Some(1));
        assert_eq!(r.stats().malformed, 1);

        assert!(r.push(frag(1, 1, 2, b"b")).unwrap().completed.is_some());
    }

    #[test]
    fn zero_fragment_count_is_rejected() {
        let mut r = Reassembler::new();
        assert!(matches!(
            r.push(frag(1, 0, 0, b"")),
            Err(FrameError::EmptyFrame)
        ));
        assert!(r.last_started().is_none());
    }

    #[test]
    fn changed_fragment_count_is_rejected() {
        let mut r = Reassembler::new();
        r.push(frag(1, 0, 3, b"a")).unwrap();
        let err = r.push(frag(1, 1, 2, b"b")).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FragmentCountMismatch {
                frame_id: 1,
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn frame_ids_wrap_around() {
        let mut r = Reassembler::new();
        r.push(frag(u32::MAX, 0, 1, b"last")).unwrap();

        let ingest = r.push(frag(0, 0, 1, b"first")).unwrap();
        assert!(ingest.gap.is_none());
        assert!(!ingest.stale);
        assert_eq!(ingest.completed.unwrap().frame_id, 0);

        let ingest = r.push(frag(2, 0, 1, b"skip")).unwrap();
        assert_eq!(ingest.gap.unwrap().missing(), 1);
    }

    #[test]
    fn large_backward_jump_restarts_without_gap() {
        let mut r = Reassembler::new();
        r.push(frag(50_000, 0, 1, b"a")).unwrap();

        let ingest = r.push(frag(0, 0, 1, b"b")).unwrap();
        assert!(!ingest.stale);
        assert!(ingest.gap.is_none());
        assert_eq!(ingest.completed.unwrap().frame_id, 0);
    }

    #[test]
    fn strict_mode_treats_restart_as_stale() {
        let mut r = Reassembler::with_config(ReassemblerConfig {
            restart_window: None,
            ..ReassemblerConfig::default()
        });
        r.push(frag(50_000, 0, 1, b"a")).unwrap();
        assert!(r.push(frag(0, 0, 1, b"b")).unwrap().stale);
    }

    #[test]
    fn oversized_frame_is_abandoned() {
        let mut r = Reassembler::with_config(ReassemblerConfig {
            max_frame_size: 4,
            ..ReassemblerConfig::default()
        });
        r.push(frag(1, 0, 3, b"abc")).unwrap();
        let ingest = r.push(frag(1, 1, 3, b"def")).unwrap();

        assert_eq!(ingest.abandoned, Some(1));
        assert!(r.is_idle());
        assert!(r.push(frag(1, 2, 3, b"g")).unwrap().stale);
        assert_eq!(r.stats().abandoned, 1);
    }

    #[test]
    fn reset_forgets_frame_history() {
        let mut r = Reassembler::new();
        r.push(frag(7, 0, 2, b"a")).unwrap();
        r.reset();

        assert!(r.is_idle());
        let ingest = r.push(frag(3, 0, 1, b"b")).unwrap();
        assert!(!ingest.stale);
        assert!(ingest.gap.is_none());
    }
}
