// oak-pipeline/src/lib.rs
// ============================================================
// Host-side pipeline graph description for OAK-style depth
// cameras.  A PipelineBuilder wires camera / manip / network
// nodes together; build() validates the graph and returns an
// immutable PipelineGraph that a device session uploads once.
// ------------------------------------------------------------
// Public API:
//   * PipelineBuilder::new()        – start a graph
//   * builder.create_color_camera() – typed node handles
//   * builder.link(out, in)         – directed link
//   * builder.build()               – validate → PipelineGraph
// ============================================================

//! Declarative description of the on-device processing graph.
//!
//! The node set is fixed and known at configuration time, so nodes are a
//! plain enum rather than trait objects.  Node handles returned by the
//! `create_*` methods only expose the ports that node kind actually has,
//! which keeps most wiring mistakes out of the runtime path; everything
//! the handles cannot prevent (double producers, cycles, duplicate stream
//! names, missing properties) is rejected by [`PipelineBuilder::build`].
//! After `build()` the graph is never mutated — the device consumes it as
//! a serialized request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod builder;
mod node;

pub use builder::{
    ColorCameraNode, DetectionNetworkNode, ImageManipNode, MonoCameraNode, PipelineBuilder,
    StereoDepthNode, XLinkOutNode,
};
pub use node::{
    BoardSocket, ColorCameraProperties, ColorOrder, DetectionNetworkProperties, FrameType,
    ImageManipProperties, MonoCameraProperties, Node, SensorResolution, StereoDepthProperties,
    XLinkOutProperties,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no XLinkOut node in graph; nothing would reach the host")]
    NoOutputs,
    #[error("duplicate stream name '{0}'")]
    DuplicateStream(String),
    #[error("{node} ({kind}): {reason}")]
    InvalidProperty {
        node: NodeId,
        kind: &'static str,
        reason: String,
    },
    #[error("link references unknown node {0}")]
    UnknownNode(NodeId),
    #[error("{node} has no output port {port:?}")]
    BadOutputPort { node: NodeId, port: OutputPort },
    #[error("{node} has no input port {port:?}")]
    BadInputPort { node: NodeId, port: InputPort },
    #[error("input {port:?} of {node} has {count} producers; exactly one allowed")]
    MultipleProducers {
        node: NodeId,
        port: InputPort,
        count: usize,
    },
    #[error("required input {port:?} of {node} is not linked")]
    UnlinkedInput { node: NodeId, port: InputPort },
    #[error("pipeline graph contains a cycle")]
    CyclicGraph,
    #[error("failed to encode pipeline request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode pipeline request: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Index of a node inside one [`PipelineGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Output ports across all node kinds; which ones a node has depends on
/// its kind (see [`Node::has_output`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    Preview,
    Video,
    Out,
    Disparity,
    RectifiedLeft,
    RectifiedRight,
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPort {
    Input,
    InputImage,
    Left,
    Right,
}

/// A producer endpoint: one output port of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub node: NodeId,
    pub port: OutputPort,
}

/// A consumer endpoint: one input port of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub node: NodeId,
    pub port: InputPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: Output,
    pub to: Input,
}

/// Immutable, validated node graph.  Produced only by
/// [`PipelineBuilder::build`] or decoded from a previously encoded
/// request; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineGraph {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl PipelineGraph {
    pub(crate) fn new(nodes: Vec<Node>, links: Vec<Link>) -> Self {
        Self { nodes, links }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Stream names registered by XLinkOut nodes, in creation order.
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|n| match n {
            Node::XLinkOut(props) => Some(props.stream.as_str()),
            _ => None,
        })
    }

    /// The node output feeding the XLinkOut with the given stream name.
    pub fn producer_of_stream(&self, stream: &str) -> Option<Output> {
        let xlink = self.nodes.iter().position(|n| match n {
            Node::XLinkOut(props) => props.stream == stream,
            _ => false,
        })?;
        self.links
            .iter()
            .find(|l| l.to.node == NodeId(xlink))
            .map(|l| l.from)
    }

    /// Encode the graph as the upload request consumed by a device
    /// backend.
    pub fn to_request(&self) -> Result<String> {
        serde_json::to_string(self).map_err(PipelineError::Encode)
    }

    /// Decode a previously encoded upload request.
    pub fn from_request(request: &str) -> Result<Self> {
        serde_json::from_str(request).map_err(PipelineError::Decode)
    }
}
