// oak-postproc/src/engine.rs
// Boundary to the external depth inference engines.  The engines
// themselves (stereo matcher, monocular network) live outside this
// repository; we only consume their float maps and timing.

use ndarray::{Array2, Array3};
use thiserror::Error;
use tracing::debug;

use crate::{normalize_min_max, ProcessError, Result};

/// Opaque failure reported by an external engine.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct EngineFailure(pub String);

pub type EngineResult<T> = std::result::Result<T, EngineFailure>;

/// Per-call timing breakdown reported by an engine, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineTiming {
    pub pre_process_ms: f64,
    pub inference_ms: f64,
    pub post_process_ms: f64,
}

impl EngineTiming {
    pub fn total_ms(&self) -> f64 {
        self.pre_process_ms + self.inference_ms + self.post_process_ms
    }
}

impl std::ops::AddAssign for EngineTiming {
    fn add_assign(&mut self, rhs: Self) {
        self.pre_process_ms += rhs.pre_process_ms;
        self.inference_ms += rhs.inference_ms;
        self.post_process_ms += rhs.post_process_ms;
    }
}

/// One engine call: a float map plus where the time went.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub map: Array2<f32>,
    pub timing: EngineTiming,
}

/// Monocular depth estimation over a BGR color frame (height, width, 3).
///
/// Construction stands in for the engine's `Initialize(work_dir,
/// threads)`; the caller owns the instance and its lifecycle, so
/// double-init and use-before-init cannot arise.
pub trait MonoDepthEngine {
    fn process(&mut self, color: &Array3<u8>) -> EngineResult<EngineOutput>;
    fn finalize(&mut self) -> EngineResult<()>;
}

/// Stereo matching over a rectified gray pair (height, width).
/// The output map is disparity, zero where no match was found.
pub trait StereoDepthEngine {
    fn process(&mut self, left: &Array2<u8>, right: &Array2<u8>) -> EngineResult<EngineOutput>;
    fn max_disparity(&self) -> f32;
    fn finalize(&mut self) -> EngineResult<()>;
}

/// Visualizable maps for one frame triple, plus summed engine timing.
#[derive(Debug, Clone)]
pub struct DepthVisualizerOutput {
    pub mono_map: Array2<u8>,
    pub stereo_map: Array2<u8>,
    pub timing: EngineTiming,
}

/// Owns the two external engines and turns their raw float maps into
/// 8-bit min-max-normalized maps ready for colorization.
pub struct DepthVisualizer<M, S> {
    mono: M,
    stereo: S,
}

impl<M: MonoDepthEngine, S: StereoDepthEngine> DepthVisualizer<M, S> {
    pub fn new(mono: M, stereo: S) -> Self {
        Self { mono, stereo }
    }

    pub fn stereo_max_disparity(&self) -> f32 {
        self.stereo.max_disparity()
    }

    /// Run mono depth on the color frame, then stereo depth on the
    /// rectified pair.  All-or-nothing: if the stereo engine fails, the
    /// mono result already computed in this call is discarded and the
    /// whole call fails.
    pub fn process(
        &mut self,
        color: &Array3<u8>,
        left: &Array2<u8>,
        right: &Array2<u8>,
    ) -> Result<DepthVisualizerOutput> {
        if left.dim() != right.dim() {
            return Err(ProcessError::PairMismatch { left: left.dim(), right: right.dim() });
        }

        let mono_out = self
            .mono
            .process(color)
            .map_err(|e| ProcessError::MonoEngine(e.0))?;
        let mono_map = normalize_min_max(mono_out.map.view());

        let stereo_out = self
            .stereo
            .process(left, right)
            .map_err(|e| ProcessError::StereoEngine(e.0))?;
        let stereo_map = normalize_min_max(stereo_out.map.view());

        let mut timing = mono_out.timing;
        timing += stereo_out.timing;
        debug!(
            inference_ms = timing.inference_ms,
            total_ms = timing.total_ms(),
            "depth engines processed frame"
        );

        Ok(DepthVisualizerOutput { mono_map, stereo_map, timing })
    }

    /// Finalize both engines; the first failure aborts, mirroring the
    /// fatal-only error model of the engine boundary.
    pub fn finalize(mut self) -> Result<()> {
        self.mono
            .finalize()
            .map_err(|e| ProcessError::Finalize(e.0))?;
        self.stereo
            .finalize()
            .map_err(|e| ProcessError::Finalize(e.0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct RampMono {
        timing: EngineTiming,
        calls: Arc<AtomicU32>,
    }

    impl MonoDepthEngine for RampMono {
        fn process(&mut self, color: &Array3<u8>) -> EngineResult<EngineOutput> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let (h, w, _) = color.dim();
            Ok(EngineOutput {
                map: Array2::from_shape_fn((h, w), |(_, x)| x as f32),
                timing: self.timing,
            })
        }

        fn finalize(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    struct FixedStereo {
        fail: bool,
        timing: EngineTiming,
    }

    impl StereoDepthEngine for FixedStereo {
        fn process(
            &mut self,
            left: &Array2<u8>,
            _right: &Array2<u8>,
        ) -> EngineResult<EngineOutput> {
            if self.fail {
                return Err(EngineFailure("tensor binding failed".into()));
            }
            Ok(EngineOutput {
                map: left.map(|&v| v as f32),
                timing: self.timing,
            })
        }

        fn max_disparity(&self) -> f32 {
            95.0
        }

        fn finalize(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    fn inputs() -> (Array3<u8>, Array2<u8>, Array2<u8>) {
        let color = Array3::zeros((4, 6, 3));
        let left = Array2::from_shape_fn((4, 6), |(y, x)| (y * 6 + x) as u8);
        let right = Array2::zeros((4, 6));
        (color, left, right)
    }

    #[test]
    fn process_sums_engine_timing() {
        let mono = RampMono {
            timing: EngineTiming { pre_process_ms: 1.0, inference_ms: 10.0, post_process_ms: 2.0 },
            calls: Arc::new(AtomicU32::new(0)),
        };
        let stereo = FixedStereo {
            fail: false,
            timing: EngineTiming { pre_process_ms: 0.5, inference_ms: 20.0, post_process_ms: 1.5 },
        };
        let mut vis = DepthVisualizer::new(mono, stereo);

        let (color, left, right) = inputs();
        let out = vis.process(&color, &left, &right).expect("process");

        assert_eq!(out.timing.inference_ms, 30.0);
        assert_eq!(out.timing.total_ms(), 35.0);
        assert_eq!(out.mono_map.dim(), (4, 6));
        // min-max normalization spans the full 8-bit range
        assert_eq!(*out.stereo_map.iter().min().unwrap(), 0);
        assert_eq!(*out.stereo_map.iter().max().unwrap(), 255);
    }

    #[test]
    fn stereo_failure_discards_mono_result() {
        let calls = Arc::new(AtomicU32::new(0));
        let mono = RampMono { timing: EngineTiming::default(), calls: calls.clone() };
        let stereo = FixedStereo { fail: true, timing: EngineTiming::default() };
        let mut vis = DepthVisualizer::new(mono, stereo);

        let (color, left, right) = inputs();
        let err = vis.process(&color, &left, &right).unwrap_err();
        assert!(matches!(err, ProcessError::StereoEngine(_)));
        // the mono engine did run; its result just never reaches the caller
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn mismatched_pair_rejected_before_any_engine_runs() {
        let mono = RampMono {
            timing: EngineTiming::default(),
            calls: Arc::new(AtomicU32::new(0)),
        };
        let stereo = FixedStereo { fail: false, timing: EngineTiming::default() };
        let mut vis = DepthVisualizer::new(mono, stereo);

        let color = Array3::zeros((4, 6, 3));
        let left = Array2::zeros((4, 6));
        let right = Array2::zeros((4, 8));
        let err = vis.process(&color, &left, &right).unwrap_err();
        assert!(matches!(err, ProcessError::PairMismatch { .. }));
    }
}
