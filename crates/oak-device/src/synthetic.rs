// oak-device/src/synthetic.rs
// Hardware-free DeviceBackend: renders moving test patterns and canned
// detections on one producer thread per attached stream.  Used by the
// demos when no camera is present and by the integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ndarray::{Array2, Array3};
use tracing::debug;

use oak_pipeline::{Node, OutputPort, PipelineGraph};

use crate::{
    Detection, DeviceBackend, DeviceError, FrameData, ImgDetections, ImgFrame, Payload, Producer,
    Result, UsbSpeed,
};

/// What a given stream should carry, resolved from the uploaded graph.
#[derive(Debug, Clone)]
enum StreamKind {
    Color { width: u32, height: u32 },
    Gray { width: u32, height: u32 },
    Disparity { width: u32, height: u32, max_disparity: f32 },
    Detections,
}

/// Backend that synthesizes frames instead of talking to hardware.
///
/// Accepts any link speed; rejects an upload it cannot decode, and
/// rejects `attach` for streams the uploaded graph does not declare —
/// the same failure surface a real device presents.
pub struct SyntheticBackend {
    fps: u32,
    frame_limit: Option<u64>,
    graph: Option<PipelineGraph>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    started: Instant,
}

impl SyntheticBackend {
    /// `fps` is the per-stream production rate; 0 means "as fast as the
    /// queue accepts" (useful in tests).
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            frame_limit: None,
            graph: None,
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Stop each stream after `frames` samples; the consumer then sees
    /// the queue disconnect, which the frame loop treats as end-of-input.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    fn stream_kind(graph: &PipelineGraph, stream: &str) -> Result<StreamKind> {
        let source = graph
            .producer_of_stream(stream)
            .ok_or_else(|| DeviceError::UnknownStream(stream.to_owned()))?;
        let node = graph
            .node(source.node)
            .ok_or_else(|| DeviceError::UnknownStream(stream.to_owned()))?;

        let kind = match (node, source.port) {
            (Node::ColorCamera(p), OutputPort::Video) => StreamKind::Color {
                width: p.video_size.0,
                height: p.video_size.1,
            },
            (Node::ColorCamera(p), _) => StreamKind::Color {
                width: p.preview_size.0,
                height: p.preview_size.1,
            },
            (Node::MonoCamera(p), _) => {
                let (width, height) = p.resolution.dims();
                StreamKind::Gray { width, height }
            }
            (Node::ImageManip(p), _) => match p.frame_type {
                oak_pipeline::FrameType::Gray8 => {
                    StreamKind::Gray { width: p.resize.0, height: p.resize.1 }
                }
                _ => StreamKind::Color { width: p.resize.0, height: p.resize.1 },
            },
            (Node::DetectionNetwork(_), OutputPort::Passthrough) => {
                Self::upstream_image_kind(graph, source.node)
            }
            (Node::DetectionNetwork(_), _) => StreamKind::Detections,
            (Node::StereoDepth(p), port) => {
                let (width, height) = Self::stereo_dims(graph, source.node);
                match port {
                    OutputPort::Disparity => StreamKind::Disparity {
                        width,
                        height,
                        max_disparity: p.max_disparity(),
                    },
                    _ => StreamKind::Gray { width, height },
                }
            }
            (Node::XLinkOut(_), _) => {
                return Err(DeviceError::UnknownStream(stream.to_owned()));
            }
        };
        Ok(kind)
    }

    /// Size of whatever image feeds the detection network, for its
    /// passthrough output.
    fn upstream_image_kind(graph: &PipelineGraph, network: oak_pipeline::NodeId) -> StreamKind {
        let feeder = graph
            .links()
            .iter()
            .find(|l| l.to.node == network)
            .and_then(|l| graph.node(l.from.node));
        match feeder {
            Some(Node::ImageManip(p)) => {
                StreamKind::Color { width: p.resize.0, height: p.resize.1 }
            }
            Some(Node::ColorCamera(p)) => {
                StreamKind::Color { width: p.preview_size.0, height: p.preview_size.1 }
            }
            _ => StreamKind::Color { width: 300, height: 300 },
        }
    }

    /// Stereo output resolution follows the left mono camera.
    fn stereo_dims(graph: &PipelineGraph, stereo: oak_pipeline::NodeId) -> (u32, u32) {
        graph
            .links()
            .iter()
            .filter(|l| l.to.node == stereo)
            .find_map(|l| match graph.node(l.from.node) {
                Some(Node::MonoCamera(p)) => Some(p.resolution.dims()),
                _ => None,
            })
            .unwrap_or((640, 400))
    }
}

impl crate::DeviceBackend for SyntheticBackend {
    fn negotiate(&mut self, speed: UsbSpeed) -> Result<()> {
        debug!(?speed, "synthetic link negotiated");
        Ok(())
    }

    fn upload(&mut self, request: &str) -> Result<()> {
        let graph = PipelineGraph::from_request(request)
            .map_err(|e| DeviceError::UploadRejected(e.to_string()))?;
        self.graph = Some(graph);
        Ok(())
    }

    fn attach(&mut self, stream: &str, producer: Producer) -> Result<()> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| DeviceError::UploadRejected("attach before upload".into()))?;
        let kind = Self::stream_kind(graph, stream)?;

        let running = self.running.clone();
        let period = if self.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.fps as f64)
        };
        let limit = self.frame_limit;
        let started = self.started;
        let name = stream.to_owned();

        let handle = std::thread::Builder::new()
            .name(format!("synth-{name}"))
            .spawn(move || {
                let mut sequence = 0u64;
                while running.load(Ordering::Relaxed) {
                    if let Some(limit) = limit {
                        if sequence >= limit {
                            break;
                        }
                    }
                    let delivered = match make_payload(&kind, sequence, started.elapsed()) {
                        Some(payload) => producer.push(payload),
                        None => true, // this tick has nothing (e.g. no detection yet)
                    };
                    if !delivered {
                        break; // consumer gone
                    }
                    sequence += 1;
                    if !period.is_zero() {
                        std::thread::sleep(period);
                    }
                }
                debug!(stream = %name, frames = sequence, "synthetic stream stopped");
            })
            .map_err(|e| DeviceError::UploadRejected(format!("worker spawn failed: {e}")))?;

        self.workers.push(handle);
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for SyntheticBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn make_payload(kind: &StreamKind, sequence: u64, timestamp: Duration) -> Option<Payload> {
    let payload = match *kind {
        StreamKind::Color { width, height } => Payload::Frame(ImgFrame {
            data: FrameData::Bgr(color_pattern(width, height, sequence)),
            timestamp,
            sequence,
        }),
        StreamKind::Gray { width, height } => Payload::Frame(ImgFrame {
            data: FrameData::Gray(gray_pattern(width, height, sequence)),
            timestamp,
            sequence,
        }),
        StreamKind::Disparity { width, height, max_disparity } => Payload::Frame(ImgFrame {
            data: FrameData::Disparity(disparity_pattern(width, height, max_disparity)),
            timestamp,
            sequence,
        }),
        StreamKind::Detections => {
            // The network does not fire every frame; leave gaps so the
            // non-blocking consumer exercises its "no data yet" path.
            if sequence % 2 != 0 {
                return None;
            }
            let sway = 0.1 * ((sequence / 2) % 5) as f32;
            Payload::Detections(ImgDetections {
                detections: vec![Detection {
                    label: 15,
                    confidence: 0.9,
                    xmin: 0.2 + sway,
                    ymin: 0.25,
                    xmax: 0.5 + sway,
                    ymax: 0.75,
                }],
                sequence,
            })
        }
    };
    Some(payload)
}

fn color_pattern(width: u32, height: u32, sequence: u64) -> Array3<u8> {
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        let shift = x + sequence as usize;
        match c {
            0 => (shift % 256) as u8,
            1 => (y % 256) as u8,
            _ => ((x + y) % 256) as u8,
        }
    })
}

fn gray_pattern(width: u32, height: u32, sequence: u64) -> Array2<u8> {
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        ((x + y + sequence as usize) % 256) as u8
    })
}

/// Horizontal disparity ramp with an invalid (zero) left margin, the way
/// a real matcher cannot see disparity at the image edge.
fn disparity_pattern(width: u32, height: u32, max_disparity: f32) -> Array2<f32> {
    let w = width as usize;
    let margin = w / 8;
    Array2::from_shape_fn((height as usize, w), |(_, x)| {
        if x < margin {
            0.0
        } else {
            (x - margin) as f32 / (w - margin).max(1) as f32 * max_disparity
        }
    })
}
