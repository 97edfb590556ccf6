// oak-pipeline/src/builder.rs
// Typed graph construction.  Handles expose only the ports their node
// kind has; build() catches everything the handles cannot.

use std::collections::HashMap;
use std::collections::HashSet;

use tracing::debug;

use crate::node::*;
use crate::{Input, InputPort, Link, NodeId, Output, OutputPort, PipelineError, PipelineGraph, Result};

macro_rules! node_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            id: NodeId,
        }

        impl $name {
            pub fn id(&self) -> NodeId {
                self.id
            }
        }
    };
}

node_handle!(
    /// Handle to a color camera node.
    ColorCameraNode
);
node_handle!(
    /// Handle to a mono (grayscale) camera node.
    MonoCameraNode
);
node_handle!(
    /// Handle to a resize/format-conversion node.
    ImageManipNode
);
node_handle!(
    /// Handle to an on-device detection-network node.
    DetectionNetworkNode
);
node_handle!(
    /// Handle to an on-device stereo-matching node.
    StereoDepthNode
);
node_handle!(
    /// Handle to a host-visible output stream node.
    XLinkOutNode
);

impl ColorCameraNode {
    pub fn preview(&self) -> Output {
        Output { node: self.id, port: OutputPort::Preview }
    }

    pub fn video(&self) -> Output {
        Output { node: self.id, port: OutputPort::Video }
    }
}

impl MonoCameraNode {
    pub fn out(&self) -> Output {
        Output { node: self.id, port: OutputPort::Out }
    }
}

impl ImageManipNode {
    pub fn input_image(&self) -> Input {
        Input { node: self.id, port: InputPort::InputImage }
    }

    pub fn out(&self) -> Output {
        Output { node: self.id, port: OutputPort::Out }
    }
}

impl DetectionNetworkNode {
    pub fn input(&self) -> Input {
        Input { node: self.id, port: InputPort::Input }
    }

    pub fn out(&self) -> Output {
        Output { node: self.id, port: OutputPort::Out }
    }

    /// The input frame, forwarded unchanged after inference.
    pub fn passthrough(&self) -> Output {
        Output { node: self.id, port: OutputPort::Passthrough }
    }
}

impl StereoDepthNode {
    pub fn left(&self) -> Input {
        Input { node: self.id, port: InputPort::Left }
    }

    pub fn right(&self) -> Input {
        Input { node: self.id, port: InputPort::Right }
    }

    pub fn disparity(&self) -> Output {
        Output { node: self.id, port: OutputPort::Disparity }
    }

    pub fn rectified_left(&self) -> Output {
        Output { node: self.id, port: OutputPort::RectifiedLeft }
    }

    pub fn rectified_right(&self) -> Output {
        Output { node: self.id, port: OutputPort::RectifiedRight }
    }
}

impl XLinkOutNode {
    pub fn input(&self) -> Input {
        Input { node: self.id, port: InputPort::Input }
    }
}

/// Accumulates nodes and links; consumed by [`PipelineBuilder::build`].
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn create_color_camera(&mut self, props: ColorCameraProperties) -> ColorCameraNode {
        ColorCameraNode { id: self.push(Node::ColorCamera(props)) }
    }

    pub fn create_mono_camera(&mut self, props: MonoCameraProperties) -> MonoCameraNode {
        MonoCameraNode { id: self.push(Node::MonoCamera(props)) }
    }

    pub fn create_image_manip(&mut self, props: ImageManipProperties) -> ImageManipNode {
        ImageManipNode { id: self.push(Node::ImageManip(props)) }
    }

    pub fn create_detection_network(
        &mut self,
        props: DetectionNetworkProperties,
    ) -> DetectionNetworkNode {
        DetectionNetworkNode { id: self.push(Node::DetectionNetwork(props)) }
    }

    pub fn create_stereo_depth(&mut self, props: StereoDepthProperties) -> StereoDepthNode {
        StereoDepthNode { id: self.push(Node::StereoDepth(props)) }
    }

    pub fn create_xlink_out(&mut self, stream: impl Into<String>) -> XLinkOutNode {
        XLinkOutNode {
            id: self.push(Node::XLinkOut(XLinkOutProperties { stream: stream.into() })),
        }
    }

    /// Record a directed link from a producer output to a consumer input.
    pub fn link(&mut self, from: Output, to: Input) {
        self.links.push(Link { from, to });
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<PipelineGraph> {
        for (idx, node) in self.nodes.iter().enumerate() {
            check_properties(NodeId(idx), node)?;
        }
        check_streams(&self.nodes)?;
        check_links(&self.nodes, &self.links)?;
        check_acyclic(&self.nodes, &self.links)?;

        let streams: Vec<&str> = self
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::XLinkOut(p) => Some(p.stream.as_str()),
                _ => None,
            })
            .collect();
        debug!(
            nodes = self.nodes.len(),
            links = self.links.len(),
            ?streams,
            "pipeline graph validated"
        );

        Ok(PipelineGraph::new(self.nodes, self.links))
    }
}

fn invalid(node: NodeId, kind: &'static str, reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidProperty { node, kind, reason: reason.into() }
}

fn check_properties(id: NodeId, node: &Node) -> Result<()> {
    let kind = node.kind_name();
    match node {
        Node::ColorCamera(p) => {
            if p.preview_size.0 == 0 || p.preview_size.1 == 0 {
                return Err(invalid(id, kind, "preview size must be non-zero"));
            }
            if p.video_size.0 == 0 || p.video_size.1 == 0 {
                return Err(invalid(id, kind, "video size must be non-zero"));
            }
            if p.fps <= 0.0 {
                return Err(invalid(id, kind, "fps must be positive"));
            }
        }
        Node::MonoCamera(p) => {
            if p.fps <= 0.0 {
                return Err(invalid(id, kind, "fps must be positive"));
            }
        }
        Node::ImageManip(p) => {
            if p.resize.0 == 0 || p.resize.1 == 0 {
                return Err(invalid(id, kind, "resize target must be non-zero"));
            }
        }
        Node::DetectionNetwork(p) => {
            if p.blob_path.as_os_str().is_empty() {
                return Err(invalid(id, kind, "blob path is empty"));
            }
            if !(0.0..=1.0).contains(&p.confidence_threshold) {
                return Err(invalid(
                    id,
                    kind,
                    format!(
                        "confidence threshold {} outside [0, 1]",
                        p.confidence_threshold
                    ),
                ));
            }
            if p.inference_threads == 0 {
                return Err(invalid(id, kind, "inference threads must be >= 1"));
            }
        }
        Node::StereoDepth(_) => {}
        Node::XLinkOut(p) => {
            if p.stream.is_empty() {
                return Err(invalid(id, kind, "stream name is empty"));
            }
        }
    }
    Ok(())
}

fn check_streams(nodes: &[Node]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut any = false;
    for node in nodes {
        if let Node::XLinkOut(p) = node {
            any = true;
            if !seen.insert(p.stream.as_str()) {
                return Err(PipelineError::DuplicateStream(p.stream.clone()));
            }
        }
    }
    if !any {
        return Err(PipelineError::NoOutputs);
    }
    Ok(())
}

fn check_links(nodes: &[Node], links: &[Link]) -> Result<()> {
    let mut producers: HashMap<(NodeId, InputPort), usize> = HashMap::new();
    for link in links {
        let from = nodes
            .get(link.from.node.0)
            .ok_or(PipelineError::UnknownNode(link.from.node))?;
        if !from.has_output(link.from.port) {
            return Err(PipelineError::BadOutputPort {
                node: link.from.node,
                port: link.from.port,
            });
        }
        let to = nodes
            .get(link.to.node.0)
            .ok_or(PipelineError::UnknownNode(link.to.node))?;
        if !to.has_input(link.to.port) {
            return Err(PipelineError::BadInputPort { node: link.to.node, port: link.to.port });
        }
        *producers.entry((link.to.node, link.to.port)).or_default() += 1;
    }

    for (&(node, port), &count) in &producers {
        if count > 1 {
            return Err(PipelineError::MultipleProducers { node, port, count });
        }
    }

    for (idx, node) in nodes.iter().enumerate() {
        for &port in node.required_inputs() {
            if !producers.contains_key(&(NodeId(idx), port)) {
                return Err(PipelineError::UnlinkedInput { node: NodeId(idx), port });
            }
        }
    }
    Ok(())
}

// Kahn's algorithm over node-level edges.
fn check_acyclic(nodes: &[Node], links: &[Link]) -> Result<()> {
    let n = nodes.len();
    let mut indegree = vec![0usize; n];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    for link in links {
        edges[link.from.node.0].push(link.to.node.0);
        indegree[link.to.node.0] += 1;
    }

    let mut queue: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut visited = 0;
    while let Some(i) = queue.pop() {
        visited += 1;
        for &j in &edges[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                queue.push(j);
            }
        }
    }

    if visited == n {
        Ok(())
    } else {
        Err(PipelineError::CyclicGraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manip_300() -> ImageManipProperties {
        ImageManipProperties {
            resize: (300, 300),
            frame_type: FrameType::Bgr888Planar,
            keep_aspect_ratio: false,
        }
    }

    fn mobilenet() -> DetectionNetworkProperties {
        DetectionNetworkProperties {
            blob_path: "model/mobilenet-ssd.blob".into(),
            confidence_threshold: 0.5,
            inference_threads: 2,
            input_blocking: false,
        }
    }

    #[test]
    fn detection_graph_builds() {
        let mut b = PipelineBuilder::new();
        let cam = b.create_color_camera(ColorCameraProperties::default());
        let manip = b.create_image_manip(manip_300());
        let nn = b.create_detection_network(mobilenet());
        let xout_preview = b.create_xlink_out("color_camera_preview");
        let xout_nn = b.create_xlink_out("nn");
        b.link(cam.preview(), manip.input_image());
        b.link(manip.out(), xout_preview.input());
        b.link(manip.out(), nn.input());
        b.link(nn.out(), xout_nn.input());

        let graph = b.build().expect("valid graph");
        let names: Vec<&str> = graph.stream_names().collect();
        assert_eq!(names, ["color_camera_preview", "nn"]);

        let producer = graph.producer_of_stream("nn").unwrap();
        assert_eq!(producer, nn.out());
        assert!(graph.producer_of_stream("typo").is_none());
    }

    #[test]
    fn duplicate_stream_rejected() {
        let mut b = PipelineBuilder::new();
        let cam = b.create_color_camera(ColorCameraProperties::default());
        let a = b.create_xlink_out("preview");
        let c = b.create_xlink_out("preview");
        b.link(cam.preview(), a.input());
        b.link(cam.video(), c.input());
        assert!(matches!(
            b.build(),
            Err(PipelineError::DuplicateStream(name)) if name == "preview"
        ));
    }

    #[test]
    fn two_producers_on_one_input_rejected() {
        let mut b = PipelineBuilder::new();
        let cam = b.create_color_camera(ColorCameraProperties::default());
        let xout = b.create_xlink_out("preview");
        b.link(cam.preview(), xout.input());
        b.link(cam.video(), xout.input());
        assert!(matches!(
            b.build(),
            Err(PipelineError::MultipleProducers { count: 2, .. })
        ));
    }

    #[test]
    fn cycle_rejected() {
        let mut b = PipelineBuilder::new();
        let manip = b.create_image_manip(manip_300());
        let nn = b.create_detection_network(mobilenet());
        let xout = b.create_xlink_out("nn");
        b.link(manip.out(), nn.input());
        b.link(nn.passthrough(), manip.input_image());
        b.link(nn.out(), xout.input());
        assert!(matches!(b.build(), Err(PipelineError::CyclicGraph)));
    }

    #[test]
    fn unlinked_xlink_out_rejected() {
        let mut b = PipelineBuilder::new();
        b.create_color_camera(ColorCameraProperties::default());
        b.create_xlink_out("preview");
        assert!(matches!(
            b.build(),
            Err(PipelineError::UnlinkedInput { port: InputPort::Input, .. })
        ));
    }

    #[test]
    fn empty_blob_path_rejected() {
        let mut b = PipelineBuilder::new();
        let cam = b.create_color_camera(ColorCameraProperties::default());
        let nn = b.create_detection_network(DetectionNetworkProperties {
            blob_path: "".into(),
            ..mobilenet()
        });
        let xout = b.create_xlink_out("nn");
        b.link(cam.preview(), nn.input());
        b.link(nn.out(), xout.input());
        assert!(matches!(b.build(), Err(PipelineError::InvalidProperty { .. })));
    }

    #[test]
    fn no_outputs_rejected() {
        let mut b = PipelineBuilder::new();
        b.create_color_camera(ColorCameraProperties::default());
        assert!(matches!(b.build(), Err(PipelineError::NoOutputs)));
    }

    #[test]
    fn bad_port_on_deserialized_graph_rejected() {
        // Handles cannot produce this, but a hand-edited request could.
        let mut b = PipelineBuilder::new();
        let cam = b.create_color_camera(ColorCameraProperties::default());
        let xout = b.create_xlink_out("preview");
        b.link(
            Output { node: cam.id(), port: OutputPort::Disparity },
            xout.input(),
        );
        assert!(matches!(b.build(), Err(PipelineError::BadOutputPort { .. })));
    }

    #[test]
    fn stereo_max_disparity() {
        let base = StereoDepthProperties::default();
        assert_eq!(base.max_disparity(), 95.0);
        let ext = StereoDepthProperties { extended_disparity: true, ..base.clone() };
        assert_eq!(ext.max_disparity(), 190.0);
        let sub = StereoDepthProperties { subpixel: true, ..base };
        assert_eq!(sub.max_disparity(), 95.0 * 8.0);
    }
}
