use std::sync::{Arc, Mutex, MutexGuard};

use crate::decoder::Image;

/// Shared "latest frame" slot.
///
/// Writers replace the slot, readers get a snapshot reference. Nothing is
/// queued: a slow reader simply skips the frames it never saw. The lock is
/// held only for the pointer swap.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    image: Option<Arc<Image>>,
    generation: u64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot's content.
    pub fn publish(&self, image: Image) {
        let image = Arc::new(image);
        let mut slot = self.lock();
        slot.image = Some(image);
        slot.generation += 1;
    }

    /// Snapshot of the most recent image, if any was ever published.
    pub fn latest(&self) -> Option<Arc<Image>> {
        self.lock().image.clone()
    }

    /// Snapshot together with the number of images published so far.
    ///
    /// Comparing generations tells a poller whether the image is new.
    pub fn latest_with_generation(&self) -> (Option<Arc<Image>>, u64) {
        let slot = self.lock();
        (slot.image.clone(), slot.generation)
    }

    /// Number of images published so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Empty the slot.
    pub fn clear(&self) {
        self.lock().image = None;
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot only ever holds a fully built value.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bytes::Bytes;

    use super::*;

    fn image(tag: &'static [u8]) -> Image {
        Image::compressed(Bytes::from_static(tag))
    }

    #[test]
    fn empty_until_first_publish() {
        let sink = LatestFrame::new();
        assert!(sink.latest().is_none());
        assert_eq!(sink.generation(), 0);
    }

    #[test]
    fn latest_wins() {
        let sink = LatestFrame::new();
        sink.publish(image(b"F1"));
        sink.publish(image(b"F2"));

        let latest = sink.latest().unwrap();
        assert_eq!(latest.data.as_ref(), b"F2");
        assert_eq!(sink.latest().unwrap().data.as_ref(), b"F2");
        assert_eq!(sink.generation(), 2);
    }

    #[test]
    fn snapshot_survives_overwrite() {
        let sink = LatestFrame::new();
        sink.publish(image(b"old"));
        let snapshot = sink.latest().unwrap();
        sink.publish(image(b"new"));

        assert_eq!(snapshot.data.as_ref(), b"old");
        assert_eq!(sink.latest().unwrap().data.as_ref(), b"new");
    }

    #[test]
    fn clones_share_slot_across_threads() {
        let sink = LatestFrame::new();
        let writer = sink.clone();
        thread::spawn(move || writer.publish(image(b"from thread")))
            .join()
            .unwrap();

        let (latest, generation) = sink.latest_with_generation();
        assert_eq!(latest.unwrap().data.as_ref(), b"from thread");
        assert_eq!(generation, 1);
    }

    #[test]
    fn poisoned_lock_still_readable() {
        let sink = LatestFrame::new();
        sink.publish(image(b"kept"));

        let poisoner = sink.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.slot.lock().unwrap();
            panic!("poison the slot");
        })
        .join();

        assert_eq!(sink.latest().unwrap().data.as_ref(), b"kept");
    }

    #[test]
    fn clear_empties_slot() {
        let sink = LatestFrame::new();
        sink.publish(image(b"x"));
        sink.clear();
        assert!(sink.latest().is_none());
        assert_eq!(sink.generation(), 1);
    }
}
