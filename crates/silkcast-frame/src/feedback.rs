use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::video::VideoCodec;

/// Minimum spacing between two reference-frame requests.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Channel that carries reference-frame requests back to the sender.
///
/// Implementations should not block for long: the controller is driven
/// from the receive path.
pub trait FeedbackSink {
    type Error: fmt::Display;

    /// Ask the sender to emit a fresh reference frame.
    fn request_reference_frame(&mut self) -> Result<(), Self::Error>;
}

/// What happened to one gap notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Feedback is off for this stream (intra-only codec).
    Disabled,
    /// A request went out.
    Sent,
    /// A request was attempted and the sink reported an error.
    Failed,
    /// The cool-down since the previous attempt has not elapsed.
    Suppressed,
}

/// Counters for [`FeedbackController`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackStats {
    pub gaps: u64,
    pub sent: u64,
    pub failed: u64,
    pub suppressed: u64,
}

/// Rate-limits reference-frame requests triggered by frame-id gaps.
///
/// At most one request is attempted per cool-down window. The window starts
/// at the attempt, not at its success, so a failing sink is not hammered.
#[derive(Debug)]
pub struct FeedbackController<S> {
    sink: S,
    cooldown: Duration,
    enabled: bool,
    last_request: Option<Instant>,
    last_observed: Option<u32>,
    stats: FeedbackStats,
}

impl<S: FeedbackSink> FeedbackController<S> {
    /// Create an enabled controller.
    pub fn new(sink: S, cooldown: Duration) -> Self {
        Self {
            sink,
            cooldown,
            enabled: true,
            last_request: None,
            last_observed: None,
            stats: FeedbackStats::default(),
        }
    }

    /// Create a controller that is only enabled when `codec` benefits from
    /// reference-frame requests.
    pub fn for_codec(codec: VideoCodec, sink: S, cooldown: Duration) -> Self {
        let mut controller = Self::new(sink, cooldown);
        controller.enabled = codec.uses_reference_frames();
        controller
    }

    /// Note the id of a fragment just received.
    pub fn on_frame_id(&mut self, frame_id: u32) {
        self.last_observed = Some(frame_id);
    }

    /// React to a detected gap, using the current time.
    pub fn on_gap_detected(&mut self) -> FeedbackOutcome {
        self.on_gap_detected_at(Instant::now())
    }

    /// React to a detected gap observed at `now`.
    pub fn on_gap_detected_at(&mut self, now: Instant) -> FeedbackOutcome {
        self.stats.gaps += 1;
        if !self.enabled {
            return FeedbackOutcome::Disabled;
        }

        if let Some(last) = self.last_request {
            if now.saturating_duration_since(last) < self.cooldown {
                self.stats.suppressed += 1;
                return FeedbackOutcome::Suppressed;
            }
        }

        self.last_request = Some(now);
        match self.sink.request_reference_frame() {
            Ok(()) => {
                self.stats.sent += 1;
                debug!(frame_id = ?self.last_observed, "requested reference frame");
                FeedbackOutcome::Sent
            }
            Err(err) => {
                self.stats.failed += 1;
                warn!(frame_id = ?self.last_observed, error = %err, "reference frame request failed");
                FeedbackOutcome::Failed
            }
        }
    }

    /// Whether gaps lead to requests at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn requests on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_observed(&self) -> Option<u32> {
        self.last_observed
    }

    pub fn stats(&self) -> FeedbackStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: usize,
        fail: bool,
    }

    impl FeedbackSink for RecordingSink {
        type Error = String;

        fn request_reference_frame(&mut self) -> Result<(), String> {
            self.calls += 1;
            if self.fail {
                Err("service unavailable".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn gaps_within_cooldown_send_once() {
        let mut controller = FeedbackController::new(RecordingSink::default(), DEFAULT_COOLDOWN);
        let start = Instant::now();

        assert_eq!(controller.on_gap_detected_at(start), FeedbackOutcome::Sent);
        assert_eq!(
            controller.on_gap_detected_at(start + Duration::from_millis(300)),
            FeedbackOutcome::Suppressed
        );
        assert_eq!(
            controller.on_gap_detected_at(start + Duration::from_millis(999)),
            FeedbackOutcome::Suppressed
        );
        assert_eq!(controller.sink().calls, 1);

        let stats = controller.stats();
        assert_eq!((stats.gaps, stats.sent, stats.suppressed), (3, 1, 2));
    }

    #[test]
    fn gap_after_cooldown_sends_again() {
        let mut controller = FeedbackController::new(RecordingSink::default(), DEFAULT_COOLDOWN);
        let start = Instant::now();

        controller.on_gap_detected_at(start);
        assert_eq!(
            controller.on_gap_detected_at(start + Duration::from_millis(1100)),
            FeedbackOutcome::Sent
        );
        assert_eq!(controller.sink().calls, 2);
    }

    #[test]
    fn failed_request_still_starts_cooldown() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut controller = FeedbackController::new(sink, DEFAULT_COOLDOWN);
        let start = Instant::now();

        assert_eq!(controller.on_gap_detected_at(start), FeedbackOutcome::Failed);
        assert_eq!(
            controller.on_gap_detected_at(start + Duration::from_millis(10)),
            FeedbackOutcome::Suppressed
        );
        assert_eq!(controller.sink().calls, 1);
        assert_eq!(controller.stats().failed, 1);
    }

    #[test]
    fn intra_only_codec_disables_feedback() {
        let mut controller = FeedbackController::for_codec(
            VideoCodec::Mjpeg,
            RecordingSink::default(),
            DEFAULT_COOLDOWN,
        );
        assert!(!controller.is_enabled());
        assert_eq!(controller.on_gap_detected(), FeedbackOutcome::Disabled);
        assert_eq!(controller.into_sink().calls, 0);
    }

    #[test]
    fn predictive_codec_enables_feedback() {
        let mut controller = FeedbackController::for_codec(
            VideoCodec::H264,
            RecordingSink::default(),
            DEFAULT_COOLDOWN,
        );
        assert!(controller.is_enabled());
        assert_eq!(controller.on_gap_detected(), FeedbackOutcome::Sent);
    }

    #[test]
    fn frame_ids_alone_never_trigger_requests() {
        let mut controller = FeedbackController::new(RecordingSink::default(), DEFAULT_COOLDOWN);
        for id in [1, 2, 5, 9] {
            controller.on_frame_id(id);
        }
        assert_eq!(controller.last_observed(), Some(9));
        assert_eq!(controller.sink().calls, 0);
    }

    #[test]
    fn zero_cooldown_sends_every_gap() {
        let mut controller = FeedbackController::new(RecordingSink::default(), Duration::ZERO);
        let now = Instant::now();
        controller.on_gap_detected_at(now);
        controller.on_gap_detected_at(now);
        assert_eq!(controller.sink().calls, 2);
    }
}
