//! Frame timing instrumentation.
//!
//! Tracks how long each stage of the frame loop takes and maintains
//! rolling statistics for the periodic status line.

use std::time::{Duration, Instant};

/// Stages of one frame, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Events,
    HeadPose,
    Skeleton,
    Gesture,
    Capture,
    Render,
    Present,
}

pub const STAGE_COUNT: usize = 7;

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Events,
        Stage::HeadPose,
        Stage::Skeleton,
        Stage::Gesture,
        Stage::Capture,
        Stage::Render,
        Stage::Present,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::HeadPose => "head-pose",
            Self::Skeleton => "skeleton",
            Self::Gesture => "gesture",
            Self::Capture => "capture",
            Self::Render => "render",
            Self::Present => "present",
        }
    }
}

/// Stopwatch for the stages of a single frame.
#[derive(Debug)]
pub struct FrameClock {
    durations: [f64; STAGE_COUNT],
    mark: Instant,
}

impl FrameClock {
    pub fn start() -> Self {
        Self {
            durations: [0.0; STAGE_COUNT],
            mark: Instant::now(),
        }
    }

    /// Attribute the time since the previous lap to `stage`.
    pub fn lap(&mut self, stage: Stage) {
        let now = Instant::now();
        self.durations[stage.index()] += duration_ms(now - self.mark);
        self.mark = now;
    }

    pub fn durations(&self) -> &[f64; STAGE_COUNT] {
        &self.durations
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Rolling frame timing statistics over a window of samples.
#[derive(Debug)]
pub struct FrameTiming {
    /// Per-stage samples in milliseconds, indexed by `Stage::index`.
    pub stage_times: Vec<Vec<f64>>,
    /// Per-frame total time.
    pub total_times: Vec<f64>,
    /// Maximum number of samples to keep.
    pub window_size: usize,
    /// Total frames recorded.
    pub total_frames: u64,
    /// Frames that exceeded the budget.
    pub missed_frames: u64,
    /// Frame budget in milliseconds (16.7 for 60 Hz).
    pub budget_ms: f64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(1000, 16.7)
    }
}

impl FrameTiming {
    pub fn new(window_size: usize, budget_ms: f64) -> Self {
        Self {
            stage_times: (0..STAGE_COUNT)
                .map(|_| Vec::with_capacity(window_size))
                .collect(),
            total_times: Vec::with_capacity(window_size),
            window_size,
            total_frames: 0,
            missed_frames: 0,
            budget_ms,
        }
    }

    /// Record one frame's per-stage durations (milliseconds).
    pub fn record_frame(&mut self, durations: &[f64; STAGE_COUNT]) {
        let total: f64 = durations.iter().sum();
        for (samples, value) in self.stage_times.iter_mut().zip(durations) {
            Self::push_sample(samples, *value, self.window_size);
        }
        Self::push_sample(&mut self.total_times, total, self.window_size);

        self.total_frames += 1;
        if total > self.budget_ms {
            self.missed_frames += 1;
        }
    }

    fn push_sample(samples: &mut Vec<f64>, value: f64, window_size: usize) {
        samples.push(value);
        if samples.len() > window_size {
            samples.remove(0);
        }
    }

    /// Compute percentile from a sorted slice.
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn sorted(samples: &[f64]) -> Vec<f64> {
        let mut v = samples.to_vec();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        v
    }

    /// Median duration of one stage.
    pub fn stage_p50(&self, stage: Stage) -> f64 {
        Self::percentile(&Self::sorted(&self.stage_times[stage.index()]), 50.0)
    }

    /// Get timing statistics as percentiles.
    pub fn stats(&self) -> FrameTimingStats {
        let total = Self::sorted(&self.total_times);
        let total_p50 = Self::percentile(&total, 50.0);
        FrameTimingStats {
            capture_p50: self.stage_p50(Stage::Capture),
            render_p50: self.stage_p50(Stage::Render),
            present_p50: self.stage_p50(Stage::Present),
            total_p50,
            total_p95: Self::percentile(&total, 95.0),
            total_p99: Self::percentile(&total, 99.0),
            fps: if total_p50 > 0.0 { 1000.0 / total_p50 } else { 0.0 },
            missed_pct: if self.total_frames > 0 {
                (self.missed_frames as f64 / self.total_frames as f64) * 100.0
            } else {
                0.0
            },
            total_frames: self.total_frames,
            missed_frames: self.missed_frames,
        }
    }

    /// Format stats as an s-expression for the status log.
    pub fn stats_sexp(&self) -> String {
        let s = self.stats();
        format!(
            "(:capture-p50 {:.1} :render-p50 {:.1} :present-p50 {:.1} :total-p50 {:.1} :total-p99 {:.1} :missed-pct {:.1} :fps {:.0} :total-frames {} :missed-frames {})",
            s.capture_p50, s.render_p50, s.present_p50, s.total_p50, s.total_p99,
            s.missed_pct, s.fps, s.total_frames, s.missed_frames,
        )
    }
}

/// Computed frame timing statistics.
#[derive(Debug, Clone)]
pub struct FrameTimingStats {
    pub capture_p50: f64,
    pub render_p50: f64,
    pub present_p50: f64,
    pub total_p50: f64,
    pub total_p95: f64,
    pub total_p99: f64,
    pub fps: f64,
    pub missed_pct: f64,
    pub total_frames: u64,
    pub missed_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(capture: f64, render: f64, present: f64) -> [f64; STAGE_COUNT] {
        let mut d = [0.0; STAGE_COUNT];
        d[Stage::Capture.index()] = capture;
        d[Stage::Render.index()] = render;
        d[Stage::Present.index()] = present;
        d
    }

    #[test]
    fn test_empty_stats() {
        let ft = FrameTiming::new(100, 16.7);
        let stats = ft.stats();
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.missed_frames, 0);
        assert_eq!(stats.fps, 0.0);
    }

    #[test]
    fn test_record_frame() {
        let mut ft = FrameTiming::new(100, 16.7);
        ft.record_frame(&frame(2.0, 3.0, 0.5));
        assert_eq!(ft.total_frames, 1);
        assert_eq!(ft.missed_frames, 0);
        let stats = ft.stats();
        assert!((stats.total_p50 - 5.5).abs() < 0.1);
        assert!((stats.render_p50 - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_missed_frame_detection() {
        let mut ft = FrameTiming::new(100, 16.7);
        ft.record_frame(&frame(5.0, 10.0, 2.0)); // 17ms > budget
        assert_eq!(ft.missed_frames, 1);
        ft.record_frame(&frame(3.0, 3.0, 1.0));
        assert_eq!(ft.missed_frames, 1);
        assert_eq!(ft.total_frames, 2);
    }

    #[test]
    fn test_window_size_trim() {
        let mut ft = FrameTiming::new(5, 16.7);
        for i in 0..10 {
            ft.record_frame(&frame(i as f64, 1.0, 0.5));
        }
        assert_eq!(ft.stage_times[Stage::Capture.index()].len(), 5);
        assert_eq!(ft.total_times.len(), 5);
        assert_eq!(ft.total_frames, 10);
    }

    #[test]
    fn test_clock_laps_accumulate() {
        let mut clock = FrameClock::start();
        std::thread::sleep(Duration::from_millis(2));
        clock.lap(Stage::Render);
        clock.lap(Stage::Present);
        let d = clock.durations();
        assert!(d[Stage::Render.index()] >= 2.0);
        assert!(d[Stage::Present.index()] < d[Stage::Render.index()]);
        assert_eq!(d[Stage::Events.index()], 0.0);
    }

    #[test]
    fn test_stage_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
        assert_eq!(Stage::HeadPose.as_str(), "head-pose");
    }

    #[test]
    fn test_stats_sexp_format() {
        let mut ft = FrameTiming::new(100, 16.7);
        ft.record_frame(&frame(2.0, 3.0, 0.5));
        let sexp = ft.stats_sexp();
        assert!(sexp.starts_with("(:capture-p50"));
        assert!(sexp.contains(":fps"));
        assert!(sexp.contains(":total-frames 1"));
    }
}
