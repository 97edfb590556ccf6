// oak-pipeline/src/node.rs
// Node kinds and their property structs.  All serde-derived so the whole
// graph serializes into the device upload request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{InputPort, OutputPort};

/// Physical camera identity on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardSocket {
    Rgb,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorResolution {
    The400P,
    The480P,
    The720P,
    The800P,
    The1080P,
    The4K,
}

impl SensorResolution {
    /// Active sensor area in pixels (width, height).
    pub fn dims(&self) -> (u32, u32) {
        match self {
            SensorResolution::The400P => (640, 400),
            SensorResolution::The480P => (640, 480),
            SensorResolution::The720P => (1280, 720),
            SensorResolution::The800P => (1280, 800),
            SensorResolution::The1080P => (1920, 1080),
            SensorResolution::The4K => (3840, 2160),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOrder {
    Rgb,
    Bgr,
}

/// Pixel layout produced by an ImageManip node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Bgr888Planar,
    Rgb888Planar,
    Gray8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorCameraProperties {
    pub board_socket: BoardSocket,
    pub resolution: SensorResolution,
    pub interleaved: bool,
    pub color_order: ColorOrder,
    /// Full-resolution video output size (width, height).
    pub video_size: (u32, u32),
    /// Downscaled preview output size (width, height).
    pub preview_size: (u32, u32),
    pub fps: f32,
}

impl Default for ColorCameraProperties {
    fn default() -> Self {
        Self {
            board_socket: BoardSocket::Rgb,
            resolution: SensorResolution::The1080P,
            interleaved: false,
            color_order: ColorOrder::Rgb,
            video_size: (1920, 1080),
            preview_size: (300, 300),
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonoCameraProperties {
    pub board_socket: BoardSocket,
    pub resolution: SensorResolution,
    pub fps: f32,
}

impl Default for MonoCameraProperties {
    fn default() -> Self {
        Self {
            board_socket: BoardSocket::Left,
            resolution: SensorResolution::The400P,
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManipProperties {
    /// Resize target (width, height).
    pub resize: (u32, u32),
    pub frame_type: FrameType,
    pub keep_aspect_ratio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionNetworkProperties {
    /// Precompiled model artifact consumed by the on-device inference
    /// node.  Existence is checked by the caller at startup, not here.
    pub blob_path: PathBuf,
    pub confidence_threshold: f32,
    pub inference_threads: u32,
    pub input_blocking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoDepthProperties {
    pub left_right_check: bool,
    pub extended_disparity: bool,
    pub subpixel: bool,
    pub output_rectified: bool,
}

impl Default for StereoDepthProperties {
    fn default() -> Self {
        Self {
            left_right_check: false,
            extended_disparity: false,
            subpixel: false,
            output_rectified: true,
        }
    }
}

impl StereoDepthProperties {
    /// Largest disparity value the node can emit, needed by the linear
    /// disparity-normalization transform on the host.
    pub fn max_disparity(&self) -> f32 {
        let base = if self.extended_disparity { 190.0 } else { 95.0 };
        if self.subpixel {
            base * 8.0
        } else {
            base
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XLinkOutProperties {
    pub stream: String,
}

/// The fixed node set.  No dynamic dispatch: the device SDK defines these
/// kinds and nothing else can appear in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    ColorCamera(ColorCameraProperties),
    MonoCamera(MonoCameraProperties),
    ImageManip(ImageManipProperties),
    DetectionNetwork(DetectionNetworkProperties),
    StereoDepth(StereoDepthProperties),
    XLinkOut(XLinkOutProperties),
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::ColorCamera(_) => "ColorCamera",
            Node::MonoCamera(_) => "MonoCamera",
            Node::ImageManip(_) => "ImageManip",
            Node::DetectionNetwork(_) => "DetectionNetwork",
            Node::StereoDepth(_) => "StereoDepth",
            Node::XLinkOut(_) => "XLinkOut",
        }
    }

    pub fn has_output(&self, port: OutputPort) -> bool {
        use OutputPort::*;
        match self {
            Node::ColorCamera(_) => matches!(port, Preview | Video),
            Node::MonoCamera(_) => matches!(port, Out),
            Node::ImageManip(_) => matches!(port, Out),
            Node::DetectionNetwork(_) => matches!(port, Out | Passthrough),
            Node::StereoDepth(_) => matches!(port, Disparity | RectifiedLeft | RectifiedRight),
            Node::XLinkOut(_) => false,
        }
    }

    pub fn has_input(&self, port: InputPort) -> bool {
        use InputPort::*;
        match self {
            Node::ColorCamera(_) | Node::MonoCamera(_) => false,
            Node::ImageManip(_) => matches!(port, InputImage),
            Node::DetectionNetwork(_) => matches!(port, Input),
            Node::StereoDepth(_) => matches!(port, Left | Right),
            Node::XLinkOut(_) => matches!(port, Input),
        }
    }

    /// Inputs that must be linked for the node to do anything at all.
    pub fn required_inputs(&self) -> &'static [InputPort] {
        match self {
            Node::ColorCamera(_) | Node::MonoCamera(_) => &[],
            Node::ImageManip(_) => &[InputPort::InputImage],
            Node::DetectionNetwork(_) => &[InputPort::Input],
            Node::StereoDepth(_) => &[InputPort::Left, InputPort::Right],
            Node::XLinkOut(_) => &[InputPort::Input],
        }
    }
}
