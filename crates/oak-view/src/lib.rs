// oak-view/src/lib.rs
// ============================================================
// Host-side capture-display loop: pull frames from device
// queues, draw overlays, show windows, time every stage, and
// stop on the quit key.
// ------------------------------------------------------------
// Public API:
//   * FrameLoop::new().run(capture, render)
//   * draw_detections / colorize_magma / draw_banner
//   * LatencyStats – first-frame-excluded averages
// ============================================================

//! Frame loop and overlay rendering.
//!
//! The loop is a fixed state machine: Idle → per-iteration {Capture →
//! Decode → Overlay → Display → Key-check} → loop or Terminate.  Each
//! iteration is independent; the only state carried across iterations is
//! the cumulative [`LatencyStats`].  Termination happens on the quit key
//! ('q', 'Q' or escape) or when capture reports end-of-input — a missing
//! optional result is the caller's business and never ends the loop.

use std::time::Instant;

use opencv::highgui;
use opencv::prelude::*;
use thiserror::Error;
use tracing::info;

mod draw;
mod timing;

pub use draw::{
    colorize_magma, detection_rect, draw_banner, draw_detections, mat_from_bgr, mat_from_gray,
    resize_to,
};
pub use timing::{report_frame, FrameTiming, LatencyStats};

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("bad image shape: {0}")]
    BadShape(String),
}

pub type Result<T> = std::result::Result<T, ViewError>;

/// What a pressed key means to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Ignore,
}

impl KeyAction {
    /// 'q', 'Q' and escape quit; every other key (and -1, "no key") is
    /// ignored.
    pub fn from_key(key: i32) -> Self {
        match key {
            113 | 81 | 27 => KeyAction::Quit, // 'q', 'Q', ESC
            _ => KeyAction::Ignore,
        }
    }
}

/// Drives the capture-display loop and owns its latency counters.
#[derive(Default)]
pub struct FrameLoop {
    stats: LatencyStats,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self { stats: LatencyStats::new() }
    }

    /// Run until the quit key or until `capture` returns `Ok(None)`.
    ///
    /// `capture` pulls whatever this demo needs for one iteration
    /// (blocking or not is the queue's policy, not the loop's).
    /// `render` decodes, post-processes and draws, returning the windows
    /// to display; its runtime is reported as "Image processing".
    /// Display always completes for the iteration in which the quit key
    /// was seen; no further capture is attempted afterwards.
    ///
    /// Returns the accumulated stats after printing the average report.
    pub fn run<T, C, R>(
        mut self,
        mut capture: C,
        mut render: R,
    ) -> anyhow::Result<LatencyStats>
    where
        C: FnMut() -> anyhow::Result<Option<T>>,
        R: FnMut(T) -> anyhow::Result<Vec<(String, Mat)>>,
    {
        loop {
            let iteration_start = Instant::now();

            let capture_start = Instant::now();
            let Some(input) = capture()? else {
                info!("capture reported end of input");
                break;
            };
            let capture_ms = ms_since(capture_start);

            let process_start = Instant::now();
            let windows = render(input)?;
            let process_ms = ms_since(process_start);

            for (name, mat) in &windows {
                highgui::imshow(name, mat).map_err(ViewError::OpenCv)?;
            }
            let key = highgui::wait_key(1).map_err(ViewError::OpenCv)?;

            let timing = FrameTiming {
                total_ms: ms_since(iteration_start),
                capture_ms,
                process_ms,
            };
            report_frame(&timing, self.stats.frames());
            self.stats.record(timing);

            if KeyAction::from_key(key) == KeyAction::Quit {
                info!(frames = self.stats.frames(), "quit key pressed");
                break;
            }
        }

        self.stats.report_average();
        Ok(self.stats)
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_keys() {
        assert_eq!(KeyAction::from_key(i32::from(b'q')), KeyAction::Quit);
        assert_eq!(KeyAction::from_key(i32::from(b'Q')), KeyAction::Quit);
        assert_eq!(KeyAction::from_key(27), KeyAction::Quit);
    }

    #[test]
    fn other_keys_ignored() {
        for key in [-1, 0, 32, i32::from(b'a'), i32::from(b'p'), 255] {
            assert_eq!(KeyAction::from_key(key), KeyAction::Ignore);
        }
    }
}
