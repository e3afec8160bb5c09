use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use silkcast_frame::{
    decode_fragment, CompletedFrame, FeedbackController, FeedbackOutcome, FeedbackSink,
    Reassembler,
};
use silkcast_transport::{DatagramSocket, MAX_DATAGRAM_SIZE};
use tracing::{debug, info, warn};

use crate::config::UdpStreamConfig;
use crate::decoder::{Decoder, Image};
use crate::error::{ClientError, Result};
use crate::feedback::{FeedbackDelivery, FeedbackDispatcher};
use crate::sink::LatestFrame;

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Counters for one UDP receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    /// Datagrams read off the socket.
    pub datagrams: u64,
    /// Fragments accepted by the reassembler.
    pub fragments: u64,
    /// Frames reassembled completely.
    pub completed: u64,
    /// Frames retired before all fragments arrived.
    pub abandoned: u64,
    /// Gap events.
    pub gaps: u64,
    /// Frame ids lost across all gaps.
    pub missing_frames: u64,
    /// Fragments of already-retired frames.
    pub stale: u64,
    /// Datagrams and fragments dropped as malformed.
    pub malformed: u64,
    /// Frames the decoder accepted.
    pub decoded: u64,
    /// Frames the decoder rejected.
    pub decode_failures: u64,
    /// Images written to the latest-frame slot.
    pub published: u64,
    /// Reference-frame requests handed to the feedback channel.
    pub feedback_sent: u64,
    /// Reference-frame requests the feedback channel refused to enqueue.
    pub feedback_failed: u64,
    /// Requests the service acknowledged. Only counted for receivers
    /// started with [`UdpReceiver::open`].
    pub feedback_delivered: u64,
    /// Requests that were enqueued but never reached the service.
    pub feedback_undelivered: u64,
    /// Gaps that fell inside the feedback cool-down.
    pub feedback_suppressed: u64,
}

impl ReceiverStats {
    /// Serialize to a JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Push-model engine for fragmented UDP streams.
///
/// A background thread owns the socket, the reassembler and the decoder
/// and publishes every decoded image to a latest-frame slot.
/// [`read_latest`](Self::read_latest) never blocks on the network.
#[derive(Debug)]
pub struct UdpReceiver {
    latest: LatestFrame,
    stats: Arc<Mutex<ReceiverStats>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
    close_timeout: Duration,
    delivery: Option<FeedbackDelivery>,
}

impl UdpReceiver {
    /// Bind the socket, ask the service to start streaming to it and start
    /// receiving. Frames are passed through undecoded.
    pub fn open(config: UdpStreamConfig) -> Result<Self> {
        Self::open_with_decoder(config, Decoder::default())
    }

    /// Like [`open`](Self::open) with an explicit decoder.
    ///
    /// Fails with [`ClientError::Connection`] when the socket cannot be
    /// bound or the service refuses the stream.
    pub fn open_with_decoder(config: UdpStreamConfig, decoder: Decoder) -> Result<Self> {
        let socket = DatagramSocket::bind(config.bind_addr)?;
        let request = config.start_request(socket.local_addr().port());
        let client = config.service.client();

        info!(
            base_url = client.base_url(),
            device = %request.device,
            target = %request.target,
            port = request.port,
            codec = %request.codec,
            "starting udp stream"
        );
        client.start_udp_stream(&request)?;

        let feedback = if config.codec.uses_reference_frames() {
            let dispatcher = FeedbackDispatcher::spawn(
                client,
                config.service.device.clone(),
                config.feedback_timeout,
            )
            .map_err(silkcast_transport::TransportError::from)?;
            Some(dispatcher)
        } else {
            None
        };

        let delivery = feedback.as_ref().map(FeedbackDispatcher::delivery);
        Self::start(socket, &config, decoder, feedback, delivery)
    }

    /// Receive on `config.bind_addr` without contacting the service.
    ///
    /// Gaps are reported to `feedback` when given and `config.codec` uses
    /// reference frames.
    pub fn listen<S>(config: &UdpStreamConfig, decoder: Decoder, feedback: Option<S>) -> Result<Self>
    where
        S: FeedbackSink + Send + 'static,
    {
        let socket = DatagramSocket::bind(config.bind_addr)?;
        Self::start(socket, config, decoder, feedback, None)
    }

    fn start<S>(
        socket: DatagramSocket,
        config: &UdpStreamConfig,
        decoder: Decoder,
        feedback: Option<S>,
        delivery: Option<FeedbackDelivery>,
    ) -> Result<Self>
    where
        S: FeedbackSink + Send + 'static,
    {
        socket.set_read_timeout(Some(config.recv_timeout))?;
        let local_addr = socket.local_addr();

        let latest = LatestFrame::new();
        let stats = Arc::new(Mutex::new(ReceiverStats::default()));
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            socket,
            reassembler: Reassembler::with_config(config.reassembler),
            feedback: feedback.map(|sink| {
                FeedbackController::for_codec(config.codec, sink, config.feedback_cooldown)
            }),
            decoder,
            latest: latest.clone(),
            running: Arc::clone(&running),
            shared: Arc::clone(&stats),
            local: ReceiverStats::default(),
        };

        let handle = thread::Builder::new()
            .name("silkcast-udp".to_string())
            .spawn(move || worker.run())
            .map_err(silkcast_transport::TransportError::from)?;

        info!(addr = %local_addr, "udp receiver started");
        Ok(Self {
            latest,
            stats,
            running,
            handle: Some(handle),
            local_addr,
            close_timeout: config.close_timeout,
            delivery,
        })
    }

    /// The most recently decoded image, if any. Never blocks on I/O.
    pub fn read_latest(&self) -> Option<Arc<Image>> {
        self.latest.latest()
    }

    /// Wait until an image newer than `seen_generation` is published.
    ///
    /// Returns the image and its generation; pass that generation to the
    /// next call to wait for the frame after it.
    pub fn wait_for_frame(
        &self,
        seen_generation: u64,
        timeout: Duration,
    ) -> Result<(Arc<Image>, u64)> {
        let deadline = Instant::now() + timeout;
        loop {
            if let (Some(image), generation) = self.latest.latest_with_generation() {
                if generation > seen_generation {
                    return Ok((image, generation));
                }
            }
            if !self.is_running() {
                return Err(ClientError::Closed);
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(timeout));
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// A handle to the latest-frame slot, shareable across threads.
    pub fn frames(&self) -> LatestFrame {
        self.latest.clone()
    }

    /// Snapshot of the receive counters.
    pub fn stats(&self) -> ReceiverStats {
        let mut stats = *lock_stats(&self.stats);
        if let Some(delivery) = &self.delivery {
            stats.feedback_delivered = delivery.delivered();
            stats.feedback_undelivered = delivery.failed();
        }
        stats
    }

    /// Address the datagram socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the background loop is still receiving.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
            && self.running.load(Ordering::Acquire)
    }

    /// Stop receiving and release the socket.
    ///
    /// Waits at most the configured close timeout for the background loop;
    /// a loop that does not stop in time is detached. Safe to call twice.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + self.close_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(CLOSE_POLL_INTERVAL);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("udp receive loop panicked");
            }
            info!(addr = %self.local_addr, "udp receiver closed");
        } else {
            warn!(
                addr = %self.local_addr,
                timeout = ?self.close_timeout,
                "udp receive loop did not stop in time; detaching"
            );
        }
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_stats(stats: &Mutex<ReceiverStats>) -> MutexGuard<'_, ReceiverStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Worker<S> {
    socket: DatagramSocket,
    reassembler: Reassembler,
    feedback: Option<FeedbackController<S>>,
    decoder: Decoder,
    latest: LatestFrame,
    running: Arc<AtomicBool>,
    shared: Arc<Mutex<ReceiverStats>>,
    local: ReceiverStats,
}

impl<S: FeedbackSink> Worker<S> {
    fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while self.running.load(Ordering::Acquire) {
            let len = match self.socket.recv(&mut buf) {
                Ok(Some(len)) => len,
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "udp receive failed");
                    continue;
                }
            };

            self.local.datagrams += 1;
            self.handle_datagram(Bytes::copy_from_slice(&buf[..len]));
            self.publish_stats();
        }

        debug!(datagrams = self.local.datagrams, "udp receive loop stopped");
    }

    fn handle_datagram(&mut self, datagram: Bytes) {
        let fragment = match decode_fragment(datagram) {
            Ok(fragment) => fragment,
            Err(err) => {
                self.reassembler.record_malformed();
                debug!(error = %err, "dropping datagram");
                return;
            }
        };

        let frame_id = fragment.frame_id;
        if let Some(feedback) = self.feedback.as_mut() {
            feedback.on_frame_id(frame_id);
        }

        let ingest = match self.reassembler.push(fragment) {
            Ok(ingest) => ingest,
            Err(err) => {
                debug!(frame_id, error = %err, "dropping fragment");
                return;
            }
        };

        if ingest.gap.is_some() {
            self.on_gap();
        }
        if let Some(frame) = ingest.completed {
            self.decode_and_publish(frame);
        }
    }

    fn on_gap(&mut self) {
        let Some(feedback) = self.feedback.as_mut() else {
            return;
        };
        match feedback.on_gap_detected() {
            FeedbackOutcome::Sent => self.local.feedback_sent += 1,
            FeedbackOutcome::Failed => self.local.feedback_failed += 1,
            FeedbackOutcome::Suppressed => self.local.feedback_suppressed += 1,
            FeedbackOutcome::Disabled => {}
        }
    }

    fn decode_and_publish(&mut self, frame: CompletedFrame) {
        match self.decoder.decode(&frame.data) {
            Ok(images) => {
                self.local.decoded += 1;
                for image in images {
                    self.latest.publish(image);
                    self.local.published += 1;
                }
            }
            Err(err) => {
                self.local.decode_failures += 1;
                warn!(frame_id = frame.frame_id, len = frame.data.len(), error = %err, "decode failed");
            }
        }
    }

    fn publish_stats(&self) {
        let reassembly = self.reassembler.stats();
        let mut shared = lock_stats(&self.shared);
        *shared = ReceiverStats {
            fragments: reassembly.fragments,
            completed: reassembly.completed,
            abandoned: reassembly.abandoned,
            gaps: reassembly.gaps,
            missing_frames: reassembly.missing_frames,
            stale: reassembly.stale,
            malformed: reassembly.malformed,
            ..self.local
        };
    }
}
