use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use silkcast_frame::FeedbackSink;
use silkcast_transport::{ControlClient, FeedbackKind, TransportError};
use tracing::{debug, warn};

use crate::error::ClientError;

#[derive(Debug, Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Read side of a dispatcher's delivery counters.
///
/// Stays valid after the dispatcher has been moved or shut down.
#[derive(Debug, Clone, Default)]
pub struct FeedbackDelivery {
    counters: Arc<DeliveryCounters>,
}

impl FeedbackDelivery {
    /// Requests that reached the service.
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Requests the service did not accept or that never reached it.
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}

/// Delivers reference-frame requests on a worker thread.
///
/// The receive loop only enqueues; it never waits on the network. At most
/// one request is pending at a time, further requests coalesce into it.
#[derive(Debug)]
pub struct FeedbackDispatcher {
    tx: Option<SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<DeliveryCounters>,
}

impl FeedbackDispatcher {
    /// Spawn a worker that posts feedback for `device` to the service.
    pub fn spawn(client: ControlClient, device: String, timeout: Duration) -> io::Result<Self> {
        Self::spawn_with(move || client.send_feedback(&device, FeedbackKind::ReferenceFrame, timeout))
    }

    /// Spawn a worker that runs `deliver` once per request.
    pub fn spawn_with<F>(mut deliver: F) -> io::Result<Self>
    where
        F: FnMut() -> Result<(), TransportError> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        let counters = Arc::new(DeliveryCounters::default());
        let worker_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name("silkcast-feedback".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    match deliver() {
                        Ok(()) => {
                            worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                            debug!("reference frame request delivered");
                        }
                        Err(err) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %err, "feedback delivery failed");
                        }
                    }
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            counters,
        })
    }

    /// A handle on the delivery counters that outlives moves of `self`.
    pub fn delivery(&self) -> FeedbackDelivery {
        FeedbackDelivery {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Requests that reached the service.
    pub fn delivered(&self) -> u64 {
        self.delivery().delivered()
    }

    /// Requests the service did not accept or that never reached it.
    pub fn failed(&self) -> u64 {
        self.delivery().failed()
    }

    /// Stop accepting requests and wait for an in-flight one to finish.
    pub fn shutdown(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("feedback worker panicked");
            }
        }
    }
}

impl FeedbackSink for FeedbackDispatcher {
    type Error = ClientError;

    fn request_reference_frame(&mut self) -> Result<(), ClientError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ClientError::Closed);
        };
        match tx.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(())) => {
                debug!("feedback request already pending");
                Ok(())
            }
            Err(TrySendError::Disconnected(())) => Err(ClientError::Closed),
        }
    }
}

impl Drop for FeedbackDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
