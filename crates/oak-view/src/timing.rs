// oak-view/src/timing.rs
// Per-stage latency accounting for the frame loop.  The first frame is
// never counted toward the average: it absorbs device spin-up costs and
// would skew a short run.

/// Stage breakdown for one loop iteration, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
    pub total_ms: f64,
    pub capture_ms: f64,
    pub process_ms: f64,
}

/// Cumulative counters for the end-of-run average report.
#[derive(Debug, Default)]
pub struct LatencyStats {
    frames: u64,
    sum_total_ms: f64,
    sum_capture_ms: f64,
    sum_process_ms: f64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames recorded so far, including the excluded first one.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn record(&mut self, timing: FrameTiming) {
        if self.frames > 0 {
            self.sum_total_ms += timing.total_ms;
            self.sum_capture_ms += timing.capture_ms;
            self.sum_process_ms += timing.process_ms;
        }
        self.frames += 1;
    }

    /// Average over frames 2..N, or `None` when fewer than two frames
    /// were recorded.
    pub fn average(&self) -> Option<FrameTiming> {
        if self.frames < 2 {
            return None;
        }
        let n = (self.frames - 1) as f64;
        Some(FrameTiming {
            total_ms: self.sum_total_ms / n,
            capture_ms: self.sum_capture_ms / n,
            process_ms: self.sum_process_ms / n,
        })
    }

    pub fn report_average(&self) {
        if let Some(avg) = self.average() {
            println!("=== Average processing time ===");
            print_breakdown(&avg);
        }
    }
}

/// The per-frame console block.  Fixed format: tooling downstream greps
/// these lines.
pub fn report_frame(timing: &FrameTiming, frame_index: u64) {
    print_breakdown(timing);
    println!("=== Finished {} frame ===", frame_index);
    println!();
}

fn print_breakdown(timing: &FrameTiming) {
    println!("Total:               {:9.3} [msec]", timing.total_ms);
    println!("  Capture:           {:9.3} [msec]", timing.capture_ms);
    println!("  Image processing:  {:9.3} [msec]", timing.process_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: f64) -> FrameTiming {
        FrameTiming { total_ms: ms, capture_ms: ms / 2.0, process_ms: ms / 4.0 }
    }

    #[test]
    fn no_average_before_two_frames() {
        let mut stats = LatencyStats::new();
        assert!(stats.average().is_none());
        stats.record(t(100.0));
        assert!(stats.average().is_none());
    }

    #[test]
    fn first_frame_excluded_from_average() {
        let mut stats = LatencyStats::new();
        stats.record(t(1000.0)); // startup-skewed, must not count
        stats.record(t(10.0));
        stats.record(t(20.0));
        stats.record(t(30.0));

        let avg = stats.average().unwrap();
        assert_eq!(stats.frames(), 4);
        // frames 2..4: (10 + 20 + 30) / 3
        assert!((avg.total_ms - 20.0).abs() < 1e-9);
        assert!((avg.capture_ms - 10.0).abs() < 1e-9);
        assert!((avg.process_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn average_over_n_frames_divides_by_n_minus_one() {
        let mut stats = LatencyStats::new();
        let samples = [7.0, 13.0, 29.0, 31.0, 5.0];
        for &ms in &samples {
            stats.record(t(ms));
        }
        let expected = samples[1..].iter().sum::<f64>() / (samples.len() - 1) as f64;
        assert!((stats.average().unwrap().total_ms - expected).abs() < 1e-9);
    }
}
