use oak_device::{
    DeviceError, DeviceSession, FrameData, Payload, QueueConfig, SyntheticBackend, UsbSpeed,
};
use oak_pipeline::{
    ColorCameraProperties, DetectionNetworkProperties, FrameType, ImageManipProperties,
    PipelineBuilder,
};

fn detection_graph() -> oak_pipeline::PipelineGraph {
    let mut b = PipelineBuilder::new();
    let cam = b.create_color_camera(ColorCameraProperties {
        preview_size: (533, 300),
        ..ColorCameraProperties::default()
    });
    let manip = b.create_image_manip(ImageManipProperties {
        resize: (300, 300),
        frame_type: FrameType::Bgr888Planar,
        keep_aspect_ratio: false,
    });
    let nn = b.create_detection_network(DetectionNetworkProperties {
        blob_path: "model/mobilenet-ssd.blob".into(),
        confidence_threshold: 0.5,
        inference_threads: 2,
        input_blocking: false,
    });
    let xout_preview = b.create_xlink_out("color_camera_preview");
    let xout_nn = b.create_xlink_out("nn");
    b.link(cam.preview(), manip.input_image());
    b.link(manip.out(), xout_preview.input());
    b.link(manip.out(), nn.input());
    b.link(nn.out(), xout_nn.input());
    b.build().expect("valid graph")
}

#[test]
fn session_streams_frames_until_limit() -> Result<(), DeviceError> {
    let graph = detection_graph();
    let backend = SyntheticBackend::new(0).with_frame_limit(3);
    let mut session = DeviceSession::connect(&graph, UsbSpeed::Super, backend)?;

    let preview = session.output_queue(
        "color_camera_preview",
        QueueConfig { depth: 4, blocking: true },
    )?;

    for expected in 0..3u64 {
        let frame = preview.get_frame()?;
        assert_eq!(frame.sequence, expected);
        assert_eq!((frame.width(), frame.height()), (300, 300));
        assert!(matches!(frame.data, FrameData::Bgr(_)));
    }

    // Limit reached: the stream disconnects rather than hanging.
    assert!(matches!(preview.get(), Err(DeviceError::Disconnected(_))));
    Ok(())
}

#[test]
fn detections_stream_carries_normalized_boxes() -> Result<(), DeviceError> {
    let graph = detection_graph();
    let backend = SyntheticBackend::new(0).with_frame_limit(8);
    let mut session = DeviceSession::connect(&graph, UsbSpeed::Super, backend)?;

    let nn = session.output_queue("nn", QueueConfig { depth: 8, blocking: true })?;

    let mut saw_detections = false;
    loop {
        match nn.get() {
            Ok(Payload::Detections(result)) => {
                saw_detections = true;
                for det in &result.detections {
                    assert!(det.xmin >= 0.0 && det.xmax <= 1.0);
                    assert!(det.ymin >= 0.0 && det.ymax <= 1.0);
                    assert!(det.xmin < det.xmax && det.ymin < det.ymax);
                }
            }
            Ok(Payload::Frame(_)) => panic!("nn stream delivered a frame"),
            Err(DeviceError::Disconnected(_)) => break,
            Err(e) => return Err(e),
        }
    }
    assert!(saw_detections);
    Ok(())
}

#[test]
fn unknown_stream_fails_at_startup() {
    let graph = detection_graph();
    let backend = SyntheticBackend::new(0);
    let mut session =
        DeviceSession::connect(&graph, UsbSpeed::Super, backend).expect("connect");

    // A typo is a lookup failure, never a hang or a silent empty stream.
    let err = session.output_queue("colour_camera_preview", QueueConfig::default());
    assert!(matches!(err, Err(DeviceError::UnknownStream(_))));
}

#[test]
fn close_is_idempotent_after_errors() {
    let graph = detection_graph();
    let backend = SyntheticBackend::new(0);
    let mut session =
        DeviceSession::connect(&graph, UsbSpeed::SuperPlus, backend).expect("connect");
    let _ = session.output_queue("no_such_stream", QueueConfig::default());
    session.close();
    session.close();
}
