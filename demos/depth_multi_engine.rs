// demos/depth_multi_engine.rs
// ------------------------------------------------------------
// Color video + rectified stereo pair from the device, depth
// estimated by two host-side engines (monocular + stereo),
// rendered as magma-colorized maps next to the raw on-device
// disparity stream.
//
// The real engines (TensorRT HITNET / MiDaS) live outside this
// repository; the stand-ins below implement the same boundary
// so the demo runs anywhere.
// cargo run -p demos --bin depth_multi_engine [frame_limit]
// ------------------------------------------------------------
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Array3};
use oak_device::{
    DeviceError, DeviceSession, FrameData, ImgFrame, QueueConfig, SyntheticBackend, UsbSpeed,
};
use oak_pipeline::{
    BoardSocket, ColorCameraProperties, MonoCameraProperties, PipelineBuilder,
    StereoDepthProperties,
};
use oak_postproc::{
    normalize_disparity, DepthVisualizer, EngineFailure, EngineOutput, EngineResult, EngineTiming,
    MonoDepthEngine, StereoDepthEngine,
};
use oak_view::{colorize_magma, draw_banner, mat_from_bgr, resize_to, FrameLoop};
use tracing::debug;

const STREAM_VIDEO: &str = "color_camera_video";
const STREAM_LEFT: &str = "mono_camera_rectified_left";
const STREAM_RIGHT: &str = "mono_camera_rectified_right";
const STREAM_DISPARITY: &str = "disparity";
const FPS: u32 = 15;

// ------------------------------------------------------------
// Stand-in engines.  Construction plays the role of the engine
// boundary's Initialize(work_dir, threads); the caller owns the
// instance, so double-init cannot happen.
// ------------------------------------------------------------

/// Monocular "depth" from inverted luminance: bright = near.
struct LuminanceMono;

impl LuminanceMono {
    fn new(work_dir: &Path, threads: u32) -> EngineResult<Self> {
        if !work_dir.is_dir() {
            return Err(EngineFailure(format!(
                "work dir {} does not exist",
                work_dir.display()
            )));
        }
        debug!(work_dir = %work_dir.display(), threads, "mono engine ready");
        Ok(Self)
    }
}

impl MonoDepthEngine for LuminanceMono {
    fn process(&mut self, color: &Array3<u8>) -> EngineResult<EngineOutput> {
        let start = Instant::now();
        let (h, w, _) = color.dim();
        let map = Array2::from_shape_fn((h, w), |(y, x)| {
            let b = color[[y, x, 0]] as f32;
            let g = color[[y, x, 1]] as f32;
            let r = color[[y, x, 2]] as f32;
            255.0 - (b + g + r) / 3.0
        });
        Ok(EngineOutput {
            map,
            timing: EngineTiming {
                pre_process_ms: 0.0,
                inference_ms: start.elapsed().as_secs_f64() * 1e3,
                post_process_ms: 0.0,
            },
        })
    }

    fn finalize(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

/// Brute-force SAD block matcher over the rectified pair.
struct SadStereo {
    max_disparity: usize,
    half_window: usize,
}

impl SadStereo {
    fn new(work_dir: &Path, threads: u32) -> EngineResult<Self> {
        if !work_dir.is_dir() {
            return Err(EngineFailure(format!(
                "work dir {} does not exist",
                work_dir.display()
            )));
        }
        debug!(work_dir = %work_dir.display(), threads, "stereo engine ready");
        Ok(Self { max_disparity: 64, half_window: 2 })
    }
}

impl StereoDepthEngine for SadStereo {
    fn process(&mut self, left: &Array2<u8>, right: &Array2<u8>) -> EngineResult<EngineOutput> {
        let start = Instant::now();
        let (h, w) = left.dim();
        let hw = self.half_window;
        let mut map = Array2::<f32>::zeros((h, w));

        for y in hw..h.saturating_sub(hw) {
            for x in (self.max_disparity + hw)..w.saturating_sub(hw) {
                let mut best_d = 0usize;
                let mut best_cost = u32::MAX;
                for d in 0..=self.max_disparity {
                    let mut cost = 0u32;
                    for dy in 0..=2 * hw {
                        for dx in 0..=2 * hw {
                            let l = left[[y + dy - hw, x + dx - hw]] as i32;
                            let r = right[[y + dy - hw, x + dx - hw - d]] as i32;
                            cost += l.abs_diff(r);
                        }
                    }
                    if cost < best_cost {
                        best_cost = cost;
                        best_d = d;
                    }
                }
                // zero stays "no match"; a perfect tie at d=0 reads as invalid
                map[[y, x]] = best_d as f32;
            }
        }

        Ok(EngineOutput {
            map,
            timing: EngineTiming {
                pre_process_ms: 0.0,
                inference_ms: start.elapsed().as_secs_f64() * 1e3,
                post_process_ms: 0.0,
            },
        })
    }

    fn max_disparity(&self) -> f32 {
        self.max_disparity as f32
    }

    fn finalize(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

// ------------------------------------------------------------
// Frame decoding helpers
// ------------------------------------------------------------

fn expect_bgr(frame: &ImgFrame) -> Result<&Array3<u8>> {
    match &frame.data {
        FrameData::Bgr(image) => Ok(image),
        _ => bail!("color stream delivered non-color data"),
    }
}

fn expect_gray<'a>(frame: &'a ImgFrame, stream: &str) -> Result<&'a Array2<u8>> {
    match &frame.data {
        FrameData::Gray(map) => Ok(map),
        _ => bail!("{stream} delivered non-gray data"),
    }
}

fn expect_disparity(frame: &ImgFrame) -> Result<&Array2<f32>> {
    match &frame.data {
        FrameData::Disparity(map) => Ok(map),
        _ => bail!("disparity stream delivered non-float data"),
    }
}

/// Everything one iteration consumes.
struct CaptureSet {
    color: ImgFrame,
    left: ImgFrame,
    right: ImgFrame,
    disparity: Option<ImgFrame>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let frame_limit: Option<u64> = std::env::args()
        .nth(1)
        .map(|s| s.parse().context("frame_limit must be an integer"))
        .transpose()?;

    // Pipeline: color video plus a stereo pair through the on-device
    // matcher; rectified images and raw disparity come to the host.
    let stereo_props = StereoDepthProperties::default();
    let device_max_disparity = stereo_props.max_disparity();

    let mut builder = PipelineBuilder::new();
    let color = builder.create_color_camera(ColorCameraProperties {
        video_size: (640, 360),
        ..ColorCameraProperties::default()
    });
    let left = builder.create_mono_camera(MonoCameraProperties {
        board_socket: BoardSocket::Left,
        ..MonoCameraProperties::default()
    });
    let right = builder.create_mono_camera(MonoCameraProperties {
        board_socket: BoardSocket::Right,
        ..MonoCameraProperties::default()
    });
    let stereo = builder.create_stereo_depth(stereo_props);
    let xout_video = builder.create_xlink_out(STREAM_VIDEO);
    let xout_left = builder.create_xlink_out(STREAM_LEFT);
    let xout_right = builder.create_xlink_out(STREAM_RIGHT);
    let xout_disparity = builder.create_xlink_out(STREAM_DISPARITY);
    builder.link(color.video(), xout_video.input());
    builder.link(left.out(), stereo.left());
    builder.link(right.out(), stereo.right());
    builder.link(stereo.rectified_left(), xout_left.input());
    builder.link(stereo.rectified_right(), xout_right.input());
    builder.link(stereo.disparity(), xout_disparity.input());
    let graph = builder.build().context("pipeline configuration rejected")?;

    let mut backend = SyntheticBackend::new(FPS);
    if let Some(limit) = frame_limit {
        backend = backend.with_frame_limit(limit);
    }
    let mut session = DeviceSession::connect(&graph, UsbSpeed::Super, backend)
        .context("failed to open device session")?;
    let queue_cfg = QueueConfig { depth: 4, blocking: false };
    let video = session.output_queue(STREAM_VIDEO, queue_cfg)?;
    let rect_left = session.output_queue(STREAM_LEFT, queue_cfg)?;
    let rect_right = session.output_queue(STREAM_RIGHT, queue_cfg)?;
    let disparity = session.output_queue(STREAM_DISPARITY, queue_cfg)?;

    // Engine lifecycle is ours: build both, hand them to the visualizer.
    let work_dir = Path::new(".");
    let mono = LuminanceMono::new(work_dir, 4)?;
    let sad = SadStereo::new(work_dir, 4)?;
    let mut visualizer = DepthVisualizer::new(mono, sad);

    let stats = FrameLoop::new().run(
        || {
            let color = match video.get_frame() {
                Ok(f) => f,
                Err(DeviceError::Disconnected(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let left = match rect_left.get_frame() {
                Ok(f) => f,
                Err(DeviceError::Disconnected(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let right = match rect_right.get_frame() {
                Ok(f) => f,
                Err(DeviceError::Disconnected(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let disparity = match disparity.try_get() {
                Ok(Some(oak_device::Payload::Frame(f))) => Some(f),
                Ok(_) | Err(DeviceError::Disconnected(_)) => None,
                Err(e) => return Err(e.into()),
            };
            Ok(Some(CaptureSet { color, left, right, disparity }))
        },
        |set| {
            let color = expect_bgr(&set.color)?;
            let left = expect_gray(&set.left, STREAM_LEFT)?;
            let right = expect_gray(&set.right, STREAM_RIGHT)?;
            let (width, height) = (set.color.width(), set.color.height());

            let out = visualizer.process(color, left, right)?;

            let mut mono_mat = resize_to(&colorize_magma(&out.mono_map)?, width, height)?;
            let mut stereo_mat = resize_to(&colorize_magma(&out.stereo_map)?, width, height)?;
            let banner = format!("Inference: {:.1} [ms]", out.timing.inference_ms);
            draw_banner(&mut mono_mat, &banner)?;
            draw_banner(&mut stereo_mat, &banner)?;

            let mut windows = vec![
                (STREAM_VIDEO.to_owned(), mat_from_bgr(color)?),
                ("depth_mono".to_owned(), mono_mat),
                ("depth_stereo".to_owned(), stereo_mat),
            ];

            // The raw on-device disparity, when a sample is available.
            if let Some(frame) = &set.disparity {
                let map = expect_disparity(frame)?;
                let scaled = normalize_disparity(map.view(), device_max_disparity, 1.0);
                windows.push((STREAM_DISPARITY.to_owned(), colorize_magma(&scaled)?));
            }

            Ok(windows)
        },
    )?;

    debug!(frames = stats.frames(), "loop finished");
    visualizer.finalize()?;
    Ok(())
}
