//! Frame timing: delta time and FPS sampling.

use std::time::{Duration, Instant};

/// A completed FPS measurement window.
#[derive(Debug, Clone, Copy)]
pub struct FpsSample {
    /// Average frames per second over the window.
    pub fps: f64,
    /// Number of frames counted in the window.
    pub frames: u32,
    /// Actual length of the window.
    pub window: Duration,
}

/// High-resolution clock for frame timing.
///
/// `tick()` at the top of each frame yields the delta since the previous
/// frame and feeds the FPS accumulator; `fps_sample()` drains a completed
/// measurement window (once per second by default).
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    sample_started: Instant,
    frames_in_sample: u32,
    sample_window: Duration,
}

impl FrameClock {
    /// Create a new clock, starting from now, with a one second FPS window.
    pub fn new() -> Self {
        Self::with_sample_window(Duration::from_secs(1))
    }

    /// Create a new clock with a custom FPS measurement window.
    pub fn with_sample_window(sample_window: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            sample_started: now,
            frames_in_sample: 0,
            sample_window,
        }
    }

    /// Total elapsed time since the clock was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance the clock by one frame and return the time since the last tick.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frames_in_sample += 1;
        delta
    }

    /// Delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Drain the current FPS window if it has run its course.
    ///
    /// Returns `None` until at least the sample window has elapsed since the
    /// previous sample. Frames are counted by `tick()`.
    pub fn fps_sample(&mut self) -> Option<FpsSample> {
        let window = self.sample_started.elapsed();
        if window < self.sample_window {
            return None;
        }
        let frames = self.frames_in_sample;
        let fps = f64::from(frames) / window.as_secs_f64().max(f64::EPSILON);
        self.sample_started = Instant::now();
        self.frames_in_sample = 0;
        Some(FpsSample {
            fps,
            frames,
            window,
        })
    }

    /// Reset the clock to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.sample_started = now;
        self.frames_in_sample = 0;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
