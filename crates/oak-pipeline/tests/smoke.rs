use oak_pipeline::{
    BoardSocket, ColorCameraProperties, MonoCameraProperties, PipelineBuilder, PipelineGraph,
    StereoDepthProperties,
};

// The depth-demo graph: color video plus a stereo pair feeding the
// on-device matcher, four host streams.
#[test]
fn stereo_graph_survives_upload_encoding() -> Result<(), Box<dyn std::error::Error>> {
    let mut b = PipelineBuilder::new();
    let color = b.create_color_camera(ColorCameraProperties::default());
    let left = b.create_mono_camera(MonoCameraProperties {
        board_socket: BoardSocket::Left,
        ..MonoCameraProperties::default()
    });
    let right = b.create_mono_camera(MonoCameraProperties {
        board_socket: BoardSocket::Right,
        ..MonoCameraProperties::default()
    });
    let stereo = b.create_stereo_depth(StereoDepthProperties::default());

    let xout_video = b.create_xlink_out("color_camera_video");
    let xout_left = b.create_xlink_out("mono_camera_rectified_left");
    let xout_right = b.create_xlink_out("mono_camera_rectified_right");
    let xout_disp = b.create_xlink_out("disparity");

    b.link(color.video(), xout_video.input());
    b.link(left.out(), stereo.left());
    b.link(right.out(), stereo.right());
    b.link(stereo.rectified_left(), xout_left.input());
    b.link(stereo.rectified_right(), xout_right.input());
    b.link(stereo.disparity(), xout_disp.input());

    let graph = b.build()?;
    assert_eq!(graph.stream_names().count(), 4);

    let request = graph.to_request()?;
    let decoded = PipelineGraph::from_request(&request)?;
    assert_eq!(
        decoded.producer_of_stream("disparity"),
        graph.producer_of_stream("disparity")
    );
    assert_eq!(decoded.nodes().len(), graph.nodes().len());
    Ok(())
}
