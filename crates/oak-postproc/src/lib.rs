//! oak-postproc – normalize depth/disparity maps for visualization.
//!
//! Every transform here is a pure per-pixel function from a
//! single-channel float map to an 8-bit visualizable map: no state is
//! carried between frames and pixels are independent, so callers may
//! parallelize within one call if they want to.  The engine boundary
//! (`MonoDepthEngine` / `StereoDepthEngine`) lives in [`engine`].

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

mod engine;

pub use engine::{
    DepthVisualizer, DepthVisualizerOutput, EngineFailure, EngineOutput, EngineResult,
    EngineTiming, MonoDepthEngine, StereoDepthEngine,
};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("mono depth engine failed: {0}")]
    MonoEngine(String),
    #[error("stereo depth engine failed: {0}")]
    StereoEngine(String),
    #[error("engine finalize failed: {0}")]
    Finalize(String),
    #[error("stereo pair size mismatch: left {left:?}, right {right:?}")]
    PairMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Convert a disparity map to an 8-bit depth map.
///
/// `depth = clamp(scale / disparity, 0, 255)` with
/// `scale = magnification * fov_factor * baseline`.  Disparity `<= 0`
/// means "no match there", which maps to 255 — the far plane — so
/// invalid pixels read as "no usable depth" rather than "touching the
/// lens".
pub fn disparity_to_depth(
    disparity: ArrayView2<'_, f32>,
    fov_factor: f32,
    baseline: f32,
    magnification: f32,
) -> Array2<u8> {
    let scale = magnification * fov_factor * baseline;
    disparity.map(|&d| {
        if d > 0.0 {
            let z = scale / d;
            if z <= 255.0 {
                z as u8 // truncates; negative scale saturates to 0
            } else {
                255
            }
        } else {
            255
        }
    })
}

/// Linear rescale `disparity * (255 * magnification / max_disparity)`.
///
/// Deliberately unclamped: values past 255 wrap per 8-bit truncation,
/// as the source transform did.  Callers choose `max_disparity` and
/// `magnification` so valid input never overflows.
pub fn normalize_disparity(
    disparity: ArrayView2<'_, f32>,
    max_disparity: f32,
    magnification: f32,
) -> Array2<u8> {
    let scale = magnification * 255.0 / max_disparity;
    disparity.map(|&d| (d * scale) as u32 as u8)
}

/// Rescale a map into [0, 255] using its own observed min/max.
///
/// A constant map divides by zero here; the NaN result casts to 0, so
/// the output is all zeros.  That is the current behavior, not a
/// guarantee — the source transform carries the same gap.
pub fn normalize_min_max(map: ArrayView2<'_, f32>) -> Array2<u8> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in map.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    let range = max - min;
    map.map(|&v| (255.0 * (v - min) / range) as u8)
}
