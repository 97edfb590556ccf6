// demos/basic_preview.rs
// ------------------------------------------------------------
// Smallest useful pipeline: color camera preview → host window,
// with the per-frame latency report.
// cargo run -p demos --bin basic_preview [frame_limit]
// ------------------------------------------------------------
use anyhow::{bail, Context, Result};
use ndarray::Array3;
use oak_device::{DeviceError, DeviceSession, FrameData, ImgFrame, QueueConfig, SyntheticBackend, UsbSpeed};
use oak_pipeline::{ColorCameraProperties, PipelineBuilder};
use oak_view::{mat_from_bgr, FrameLoop};

const STREAM_PREVIEW: &str = "color_camera_preview";
const FPS: u32 = 30;

fn expect_bgr(frame: &ImgFrame) -> Result<&Array3<u8>> {
    match &frame.data {
        FrameData::Bgr(image) => Ok(image),
        _ => bail!("preview stream delivered non-color data"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let frame_limit: Option<u64> = std::env::args()
        .nth(1)
        .map(|s| s.parse().context("frame_limit must be an integer"))
        .transpose()?;

    // Pipeline: color camera preview straight to the host.
    let mut builder = PipelineBuilder::new();
    let camera = builder.create_color_camera(ColorCameraProperties {
        preview_size: (533, 300),
        ..ColorCameraProperties::default()
    });
    let xout = builder.create_xlink_out(STREAM_PREVIEW);
    builder.link(camera.preview(), xout.input());
    let graph = builder.build().context("pipeline configuration rejected")?;

    let mut backend = SyntheticBackend::new(FPS);
    if let Some(limit) = frame_limit {
        backend = backend.with_frame_limit(limit);
    }
    let mut session = DeviceSession::connect(&graph, UsbSpeed::Super, backend)
        .context("failed to open device session")?;
    let preview = session
        .output_queue(STREAM_PREVIEW, QueueConfig { depth: 4, blocking: false })
        .context("preview queue lookup failed")?;

    FrameLoop::new().run(
        || match preview.get_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(DeviceError::Disconnected(_)) => Ok(None), // end of input
            Err(e) => Err(e.into()),
        },
        |frame| {
            let mat = mat_from_bgr(expect_bgr(&frame)?)?;
            Ok(vec![(STREAM_PREVIEW.to_owned(), mat)])
        },
    )?;

    Ok(())
}
