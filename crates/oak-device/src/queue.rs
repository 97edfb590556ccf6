// oak-device/src/queue.rs
// Named bounded FIFO between the device backend and the host loop.
// Depth gives natural backpressure: a full blocking queue stalls the
// producer, a full non-blocking queue drops the newest sample.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::{DeviceError, ImgDetections, ImgFrame, Payload, Result};

/// Per-stream queue policy, set when the consumer asks for the queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub depth: usize,
    /// `true`: a full queue blocks the producer (lossless).
    /// `false`: a full queue drops the incoming sample (lossy).
    pub blocking: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { depth: 4, blocking: false }
    }
}

pub(crate) fn channel(name: &str, config: QueueConfig) -> (Producer, OutputQueue) {
    let (tx, rx) = bounded(config.depth.max(1));
    (
        Producer { tx, blocking: config.blocking },
        OutputQueue { name: name.to_owned(), rx },
    )
}

/// Device-side sender half.  Handed to the backend by
/// [`DeviceSession::output_queue`](crate::DeviceSession::output_queue).
pub struct Producer {
    tx: Sender<Payload>,
    blocking: bool,
}

impl Producer {
    /// Deliver one payload according to the queue policy.
    /// Returns `false` once the consumer side is gone.
    pub fn push(&self, payload: Payload) -> bool {
        if self.blocking {
            self.tx.send(payload).is_ok()
        } else {
            match self.tx.try_send(payload) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => true, // queue keeps the older samples
                Err(TrySendError::Disconnected(_)) => false,
            }
        }
    }
}

/// Host-side consumer half of one named stream.
pub struct OutputQueue {
    name: String,
    rx: Receiver<Payload>,
}

impl OutputQueue {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next payload.  No timeout is applied: a stalled
    /// device stalls the caller, matching the vendor queue semantics.
    pub fn get(&self) -> Result<Payload> {
        self.rx
            .recv()
            .map_err(|_| DeviceError::Disconnected(self.name.clone()))
    }

    /// Non-blocking poll.  `Ok(None)` means "no data yet" — never an
    /// error; the caller simply skips this stream for the iteration.
    pub fn try_get(&self) -> Result<Option<Payload>> {
        match self.rx.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DeviceError::Disconnected(self.name.clone())),
        }
    }

    /// Blocking receive of an image frame.
    pub fn get_frame(&self) -> Result<ImgFrame> {
        match self.get()? {
            Payload::Frame(frame) => Ok(frame),
            Payload::Detections(_) => Err(DeviceError::UnexpectedPayload {
                stream: self.name.clone(),
                expected: "image frame",
            }),
        }
    }

    /// Non-blocking poll for a detection result.
    pub fn try_get_detections(&self) -> Result<Option<ImgDetections>> {
        match self.try_get()? {
            None => Ok(None),
            Some(Payload::Detections(d)) => Ok(Some(d)),
            Some(Payload::Frame(_)) => Err(DeviceError::UnexpectedPayload {
                stream: self.name.clone(),
                expected: "detections",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameData;
    use ndarray::Array2;
    use std::time::Duration;

    fn gray_frame(sequence: u64) -> Payload {
        Payload::Frame(ImgFrame {
            data: FrameData::Gray(Array2::zeros((4, 4))),
            timestamp: Duration::ZERO,
            sequence,
        })
    }

    fn sequence_of(p: Payload) -> u64 {
        match p {
            Payload::Frame(f) => f.sequence,
            Payload::Detections(d) => d.sequence,
        }
    }

    #[test]
    fn non_blocking_queue_drops_newest_when_full() {
        let (producer, queue) = channel("preview", QueueConfig { depth: 1, blocking: false });
        assert!(producer.push(gray_frame(0)));
        assert!(producer.push(gray_frame(1))); // full: sample 1 is dropped

        assert_eq!(sequence_of(queue.get().unwrap()), 0);
        assert!(queue.try_get().unwrap().is_none());
    }

    #[test]
    fn blocking_queue_applies_backpressure() {
        let (producer, queue) = channel("video", QueueConfig { depth: 1, blocking: true });

        let feeder = std::thread::spawn(move || {
            // Second push blocks until the consumer drains the first.
            assert!(producer.push(gray_frame(0)));
            assert!(producer.push(gray_frame(1)));
        });

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sequence_of(queue.get().unwrap()), 0);
        assert_eq!(sequence_of(queue.get().unwrap()), 1);
        feeder.join().unwrap();
    }

    #[test]
    fn push_reports_dropped_consumer() {
        let (producer, queue) = channel("nn", QueueConfig::default());
        drop(queue);
        assert!(!producer.push(gray_frame(0)));
    }

    #[test]
    fn get_after_producer_drop_is_disconnected() {
        let (producer, queue) = channel("nn", QueueConfig::default());
        drop(producer);
        assert!(matches!(queue.get(), Err(DeviceError::Disconnected(_))));
        assert!(matches!(queue.try_get(), Err(DeviceError::Disconnected(_))));
    }

    #[test]
    fn typed_accessors_reject_wrong_payload() {
        let (producer, queue) = channel("nn", QueueConfig::default());
        producer.push(gray_frame(0));
        assert!(matches!(
            queue.try_get_detections(),
            Err(DeviceError::UnexpectedPayload { .. })
        ));
    }
}
