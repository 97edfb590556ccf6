// demos/basic_mobilenet.rs
// ------------------------------------------------------------
// Color camera → ImageManip(300×300) → MobileNet-SSD detection
// network on device; host draws the boxes over the preview.
// cargo run -p demos --bin basic_mobilenet [model.blob] [frame_limit]
// ------------------------------------------------------------
use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use ndarray::Array3;
use oak_device::{
    DeviceError, DeviceSession, FrameData, ImgFrame, QueueConfig, SyntheticBackend, UsbSpeed,
};
use oak_pipeline::{
    ColorCameraProperties, DetectionNetworkProperties, FrameType, ImageManipProperties,
    PipelineBuilder,
};
use oak_view::{draw_detections, mat_from_bgr, FrameLoop};
use tracing::debug;

const STREAM_PREVIEW: &str = "color_camera_preview";
const STREAM_NN: &str = "nn";
const FPS: u32 = 30;

fn model_path() -> PathBuf {
    let resource_dir =
        std::env::var("RESOURCE_DIR").unwrap_or_else(|_| "./resource".to_owned());
    PathBuf::from(resource_dir).join("model/mobilenet-ssd_openvino_2021.2_6shave.blob")
}

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

    let mut args = std::env::args().skip(1);
    let blob_path = args.next().map(PathBuf::from).unwrap_or_else(model_path);
    let frame_limit: Option<u64> = args
        .next()
        .map(|s| s.parse().context("frame_limit must be an integer"))
        .transpose()?;

    // Missing model artifact is a fatal startup error, same as on real
    // hardware where the device cannot load the network.
    ensure!(
        blob_path.exists(),
        "model blob not found at {} (set RESOURCE_DIR or pass a path)",
        blob_path.display()
    );

    // Pipeline: camera preview feeds the resize node, which feeds both
    // the host preview stream and the detection network.
    let mut builder = PipelineBuilder::new();
    let camera = builder.create_color_camera(ColorCameraProperties {
        video_size: (1920, 1080),
        preview_size: (300 * 1920 / 1080, 300),
        ..ColorCameraProperties::default()
    });
    let manip = builder.create_image_manip(ImageManipProperties {
        resize: (300, 300),
        frame_type: FrameType::Bgr888Planar,
        keep_aspect_ratio: false,
    });
    let nn = builder.create_detection_network(DetectionNetworkProperties {
        blob_path,
        confidence_threshold: 0.5,
        inference_threads: 2,
        input_blocking: false,
    });
    let xout_preview = builder.create_xlink_out(STREAM_PREVIEW);
    let xout_nn = builder.create_xlink_out(STREAM_NN);
    builder.link(camera.preview(), manip.input_image());
    builder.link(manip.out(), xout_preview.input());
    builder.link(manip.out(), nn.input());
    builder.link(nn.out(), xout_nn.input());
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
    let detections = session
        .output_queue(STREAM_NN, QueueConfig { depth: 4, blocking: false })
        .context("nn queue lookup failed")?;

    FrameLoop::new().run(
        || match preview.get_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(DeviceError::Disconnected(_)) => Ok(None),
            Err(e) => Err(e.into()),
        },
        |frame| {
            let mut mat = mat_from_bgr(expect_bgr(&frame)?)?;

            // No result yet is not an error — just no overlay this time.
            match detections.try_get_detections() {
                Ok(Some(result)) => draw_detections(&mut mat, &result.detections)?,
                Ok(None) => debug!("no detections this iteration"),
                Err(DeviceError::Disconnected(_)) => debug!("nn stream ended"),
                Err(e) => return Err(e.into()),
            }

            Ok(vec![(STREAM_PREVIEW.to_owned(), mat)])
        },
    )?;

    Ok(())
}
