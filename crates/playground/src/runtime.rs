use std::time::{Duration, Instant};

use chrono::{Datelike, TimeZone, Timelike};

/// Default quiet period between the last edit and a recompilation.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed wall-clock or simulated time in seconds.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where `iTime`/`iFrame` values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.origin.elapsed().as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that reports a caller-controlled timestamp. Frames still count.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// `iDate` components: year, zero-based month, day of month and seconds
/// since midnight.
pub fn date_uniform<Tz: TimeZone>(now: &chrono::DateTime<Tz>) -> [f32; 4] {
    let seconds = now.num_seconds_from_midnight() as f32
        + now.nanosecond().min(999_999_999) as f32 / 1_000_000_000.0;
    [
        now.year() as f32,
        now.month0() as f32,
        now.day() as f32,
        seconds,
    ]
}

/// Deadline-based debounce checked from the frame loop.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Records an edit at `now`, pushing the deadline back.
    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Arms the debouncer so the next check at or after `now` fires.
    pub fn trigger_now(&mut self, now: Instant) {
        self.deadline = Some(now);
    }

    /// Returns `true` once the quiet period has elapsed, disarming the timer.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn fixed_time_source_counts_frames() {
        let mut source = FixedTimeSource::new(2.5);
        assert_eq!(source.sample(), TimeSample::new(2.5, 0));
        source.set_time(3.0);
        assert_eq!(source.sample(), TimeSample::new(3.0, 1));
        source.reset();
        assert_eq!(source.sample().frame_index, 0);
    }

    #[test]
    fn debouncer_waits_for_quiet_period() {
        let start = Instant::now();
        let mut debounce = Debouncer::new(Duration::from_millis(300));
        debounce.touch(start);
        assert!(!debounce.fire(start + Duration::from_millis(100)));
        debounce.touch(start + Duration::from_millis(200));
        assert!(!debounce.fire(start + Duration::from_millis(400)));
        assert!(debounce.fire(start + Duration::from_millis(500)));
        assert!(!debounce.fire(start + Duration::from_millis(900)));
    }

    #[test]
    fn date_uniform_uses_zero_based_month() {
        let moment = Utc.with_ymd_and_hms(2024, 3, 9, 1, 2, 3).unwrap();
        assert_eq!(date_uniform(&moment), [2024.0, 2.0, 9.0, 3723.0]);
    }
}
