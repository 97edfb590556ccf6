// oak-device/src/lib.rs
// ============================================================
// Device session layer: uploads a validated PipelineGraph to a
// camera backend and hands out named, bounded output queues.
// ------------------------------------------------------------
// Public API:
//   * DeviceSession::connect(graph, speed, backend)
//   * session.output_queue(name, QueueConfig)
//   * SyntheticBackend – hardware-free frame source
// ------------------------------------------------------------
// The vendor transport (XLink, inference runtime, ISP) stays
// behind the DeviceBackend trait; this crate never retries a
// failed operation — connection errors are fatal to the caller.
// ============================================================

//! Device session and output-queue layer.
//!
//! A [`DeviceSession`] owns the connection for its whole lifetime: it
//! encodes the pipeline graph into the fixed upload request, negotiates
//! the link speed, and registers one host-visible [`OutputQueue`] per
//! stream name the graph declared.  Asking for a name the configurator
//! never registered fails immediately with [`DeviceError::UnknownStream`]
//! rather than hanging on an empty stream.

use std::collections::HashSet;
use std::time::Duration;

use ndarray::{Array2, Array3};
use thiserror::Error;
use tracing::info;

use oak_pipeline::PipelineGraph;

mod queue;
mod synthetic;

pub use queue::{OutputQueue, Producer, QueueConfig};
pub use synthetic::SyntheticBackend;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no compatible device found")]
    NoDevice,
    #[error("usb link negotiation failed at {0:?}")]
    LinkNegotiation(UsbSpeed),
    #[error("pipeline upload rejected: {0}")]
    UploadRejected(String),
    #[error("output stream '{0}' was never registered in the pipeline")]
    UnknownStream(String),
    #[error("stream '{0}' disconnected")]
    Disconnected(String),
    #[error("stream '{stream}' delivered an unexpected payload (expected {expected})")]
    UnexpectedPayload { stream: String, expected: &'static str },
    #[error(transparent)]
    Pipeline(#[from] oak_pipeline::PipelineError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbSpeed {
    High,
    Super,
    SuperPlus,
}

/// Pixel storage of a delivered frame.
#[derive(Debug, Clone)]
pub enum FrameData {
    /// Interleaved BGR, shape (height, width, 3).
    Bgr(Array3<u8>),
    /// Single-channel 8-bit, shape (height, width).
    Gray(Array2<u8>),
    /// Single-channel float disparity, shape (height, width).
    /// Zero marks "no match" (invalid measurement).
    Disparity(Array2<f32>),
}

/// One image delivered by the device.  Immutable once pulled from a
/// queue; the frame loop owns it for exactly one iteration.
#[derive(Debug, Clone)]
pub struct ImgFrame {
    pub data: FrameData,
    /// Capture time relative to session start.
    pub timestamp: Duration,
    pub sequence: u64,
}

impl ImgFrame {
    pub fn width(&self) -> u32 {
        (match &self.data {
            FrameData::Bgr(a) => a.shape()[1],
            FrameData::Gray(a) => a.shape()[1],
            FrameData::Disparity(a) => a.shape()[1],
        }) as u32
    }

    pub fn height(&self) -> u32 {
        (match &self.data {
            FrameData::Bgr(a) => a.shape()[0],
            FrameData::Gray(a) => a.shape()[0],
            FrameData::Disparity(a) => a.shape()[0],
        }) as u32
    }
}

/// One detection box in the coordinate space of the frame the network
/// ran on: normalized corners in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: usize,
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

#[derive(Debug, Clone)]
pub struct ImgDetections {
    pub detections: Vec<Detection>,
    pub sequence: u64,
}

/// What an output queue carries.
#[derive(Debug, Clone)]
pub enum Payload {
    Frame(ImgFrame),
    Detections(ImgDetections),
}

/// The vendor boundary.  Everything on the far side of this trait —
/// capture, ISP, inference, transport framing — is the device's problem.
pub trait DeviceBackend: Send {
    /// Negotiate the requested link speed.  Fatal at startup on failure.
    fn negotiate(&mut self, speed: UsbSpeed) -> Result<()>;

    /// Upload the encoded pipeline graph.  A malformed graph is rejected
    /// here, before any frame flows.
    fn upload(&mut self, request: &str) -> Result<()>;

    /// Attach the producer side of a host queue to a named stream.
    fn attach(&mut self, stream: &str, producer: Producer) -> Result<()>;

    /// Stop producing and release the connection.  Must be safe to call
    /// repeatedly and during teardown after errors.
    fn close(&mut self);
}

/// An open connection with an uploaded pipeline.
///
/// Owned exclusively by the host loop; queues hand frames over one at a
/// time.  Dropping the session closes the backend.
pub struct DeviceSession {
    backend: Box<dyn DeviceBackend>,
    streams: HashSet<String>,
}

impl DeviceSession {
    /// Open the connection, negotiate `speed`, and upload `graph`.
    /// Any failure here is fatal — there is no retry.
    pub fn connect(
        graph: &PipelineGraph,
        speed: UsbSpeed,
        mut backend: impl DeviceBackend + 'static,
    ) -> Result<Self> {
        backend.negotiate(speed)?;
        let request = graph.to_request()?;
        backend.upload(&request)?;

        let streams: HashSet<String> = graph.stream_names().map(String::from).collect();
        info!(?speed, streams = streams.len(), "device session opened");

        Ok(Self { backend: Box::new(backend), streams })
    }

    /// Create the host-side consumer for a named stream.
    ///
    /// Fails with [`DeviceError::UnknownStream`] if the configurator
    /// never registered `name` — a typo is a startup error, not a silent
    /// empty stream.
    pub fn output_queue(&mut self, name: &str, config: QueueConfig) -> Result<OutputQueue> {
        if !self.streams.contains(name) {
            return Err(DeviceError::UnknownStream(name.to_owned()));
        }
        let (producer, queue) = queue::channel(name, config);
        self.backend.attach(name, producer)?;
        Ok(queue)
    }

    /// Release the physical connection.  Idempotent.
    pub fn close(&mut self) {
        self.backend.close();
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.backend.close();
    }
}
