//! Frame clock and progress tracking for export pipelines.
//!
//! Timeline positions are milliseconds; container timestamps are
//! microseconds. Tick times are computed from the tick index rather than
//! accumulated, so rounding never drifts across a long export.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Convert milliseconds to microseconds.
pub fn ms_to_us(ms: u64) -> i64 {
    (ms as i64).saturating_mul(1000)
}

/// Convert microseconds to milliseconds, truncating.
pub fn us_to_ms(us: i64) -> u64 {
    (us.max(0) / 1000) as u64
}

/// Output frame clock at a fixed integer frame rate.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock ticking `fps` times per second.
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Presentation time of tick `index` in microseconds.
    pub fn tick_time_us(&self, index: u64) -> i64 {
        (index as i128 * 1_000_000 / self.fps as i128) as i64
    }

    /// Presentation time of tick `index` in milliseconds.
    pub fn tick_time_ms(&self, index: u64) -> u64 {
        us_to_ms(self.tick_time_us(index))
    }

    /// Duration of tick `index`: the gap to the next tick.
    pub fn tick_duration_us(&self, index: u64) -> i64 {
        self.tick_time_us(index + 1) - self.tick_time_us(index)
    }

    /// Number of ticks needed to cover `duration_ms`.
    pub fn tick_count(&self, duration_ms: u64) -> u64 {
        (duration_ms * self.fps as u64).div_ceil(1000)
    }

    /// Nominal single frame duration in milliseconds, rounded up.
    pub fn frame_duration_ms(&self) -> u64 {
        1000u64.div_ceil(self.fps as u64)
    }
}

/// A monotonically non-decreasing position marker shared between a
/// producer pipeline and progress observers.
#[derive(Debug, Clone, Default)]
pub struct ProgressWatermark {
    position_ms: Arc<AtomicU64>,
}

impl ProgressWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the watermark to `position_ms`. Lower values are ignored.
    /// Returns the watermark after the update.
    pub fn advance(&self, position_ms: u64) -> u64 {
        let previous = self.position_ms.fetch_max(position_ms, Ordering::AcqRel);
        previous.max(position_ms)
    }

    /// Current watermark.
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_times_do_not_drift() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.tick_time_us(0), 0);
        assert_eq!(clock.tick_time_us(1), 33_333);
        assert_eq!(clock.tick_time_us(300), 10_000_000);
        let total: i64 = (0..300).map(|i| clock.tick_duration_us(i)).sum();
        assert_eq!(total, 10_000_000);
    }

    #[test]
    fn test_tick_count_covers_duration() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.tick_count(10_000), 300);
        assert_eq!(clock.tick_count(1_001), 31);
        assert_eq!(clock.tick_count(0), 0);
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let watermark = ProgressWatermark::new();
        assert_eq!(watermark.advance(100), 100);
        assert_eq!(watermark.advance(50), 100);
        assert_eq!(watermark.position_ms(), 100);

        let shared = watermark.clone();
        shared.advance(250);
        assert_eq!(watermark.position_ms(), 250);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(ms_to_us(1_500), 1_500_000);
        assert_eq!(us_to_ms(1_999), 1);
        assert_eq!(us_to_ms(-5), 0);
    }
}
