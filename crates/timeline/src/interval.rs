//! Display intervals: where an item sits on the timeline and which part of
//! its source it consumes.
//!
//! Two durations must never be conflated:
//! - `duration_ms` is **source** time consumed from the underlying media.
//! - the **timeline** span is `duration_ms / playback_speed`.
//!
//! A clip with `duration_ms = 4000` at `playback_speed = 2.0` reads four
//! seconds of source and occupies two seconds of timeline.

use serde::{Deserialize, Serialize};

use crate::timeline::TimelineError;

fn default_speed() -> f64 {
    1.0
}

/// Placement of an item on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayInterval {
    /// Timeline position where the item begins.
    pub start_ms: u64,

    /// Source time consumed, in milliseconds (unscaled by speed).
    pub duration_ms: u64,

    /// Playback speed multiplier (> 0).
    #[serde(default = "default_speed")]
    pub playback_speed: f64,

    /// Trim offset into the underlying source.
    #[serde(default)]
    pub source_offset_ms: u64,
}

impl DisplayInterval {
    /// Interval at unit speed with no trim.
    pub fn new(start_ms: u64, duration_ms: u64) -> Self {
        Self {
            start_ms,
            duration_ms,
            playback_speed: 1.0,
            source_offset_ms: 0,
        }
    }

    pub fn with_speed(mut self, playback_speed: f64) -> Self {
        self.playback_speed = playback_speed;
        self
    }

    pub fn with_source_offset(mut self, source_offset_ms: u64) -> Self {
        self.source_offset_ms = source_offset_ms;
        self
    }

    /// Exact timeline span in milliseconds.
    pub fn timeline_span_ms(&self) -> f64 {
        self.duration_ms as f64 / self.playback_speed
    }

    /// Effective end on the timeline (exclusive), rounded to the nearest ms.
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.timeline_span_ms().round() as u64
    }

    /// Whether timeline position `t_ms` falls inside `[start, end)`.
    pub fn contains(&self, t_ms: u64) -> bool {
        t_ms >= self.start_ms && t_ms < self.end_ms()
    }

    /// Source position that plays at timeline position `t_ms`.
    ///
    /// Positions before the start map to the trim offset; positions past
    /// the end map to the last consumed source millisecond.
    pub fn source_time_ms(&self, t_ms: u64) -> u64 {
        let elapsed = t_ms.saturating_sub(self.start_ms) as f64;
        let consumed = (elapsed * self.playback_speed).round() as u64;
        self.source_offset_ms + consumed.min(self.duration_ms)
    }

    /// Source range `[offset, offset + duration)` this interval reads.
    pub fn source_range_ms(&self) -> (u64, u64) {
        (
            self.source_offset_ms,
            self.source_offset_ms + self.duration_ms,
        )
    }

    /// Check the structural invariants: positive duration and speed.
    pub fn check(&self) -> Result<(), String> {
        if self.duration_ms == 0 {
            return Err("duration must be positive".to_string());
        }
        if !(self.playback_speed.is_finite() && self.playback_speed > 0.0) {
            return Err(format!(
                "playback speed must be positive, got {}",
                self.playback_speed
            ));
        }
        Ok(())
    }

    /// Split at timeline position `t_ms` into two adjacent intervals.
    ///
    /// The left part consumes `round((t - start) * speed)` source
    /// milliseconds; the right part starts at `t_ms` and its trim offset
    /// advances by exactly that amount. Source consumption is preserved:
    /// `left.duration + right.duration == self.duration`.
    pub fn split_at(&self, t_ms: u64) -> Result<(Self, Self), TimelineError> {
        if t_ms <= self.start_ms || t_ms >= self.end_ms() || self.duration_ms < 2 {
            return Err(TimelineError::SplitOutOfRange {
                at_ms: t_ms,
                start_ms: self.start_ms,
                end_ms: self.end_ms(),
            });
        }

        let elapsed = (t_ms - self.start_ms) as f64;
        let left_source = ((elapsed * self.playback_speed).round() as u64)
            .clamp(1, self.duration_ms - 1);

        let left = Self {
            start_ms: self.start_ms,
            duration_ms: left_source,
            playback_speed: self.playback_speed,
            source_offset_ms: self.source_offset_ms,
        };
        let right = Self {
            start_ms: t_ms,
            duration_ms: self.duration_ms - left_source,
            playback_speed: self.playback_speed,
            source_offset_ms: self.source_offset_ms + left_source,
        };
        Ok((left, right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unit_speed_end() {
        let interval = DisplayInterval::new(1_000, 3_000);
        assert_eq!(interval.end_ms(), 4_000);
        assert!(interval.contains(1_000));
        assert!(interval.contains(3_999));
        assert!(!interval.contains(4_000));
        assert!(!interval.contains(999));
    }

    #[test]
    fn test_speed_scales_timeline_span_not_source() {
        let interval = DisplayInterval::new(0, 4_000).with_speed(2.0);
        assert_eq!(interval.end_ms(), 2_000);
        assert_eq!(interval.source_range_ms(), (0, 4_000));
        assert_eq!(interval.source_time_ms(1_000), 2_000);
    }

    #[test]
    fn test_source_time_respects_trim_and_clamps() {
        let interval = DisplayInterval::new(500, 1_000).with_source_offset(2_000);
        assert_eq!(interval.source_time_ms(500), 2_000);
        assert_eq!(interval.source_time_ms(1_000), 2_500);
        assert_eq!(interval.source_time_ms(10_000), 3_000);
        assert_eq!(interval.source_time_ms(0), 2_000);
    }

    #[test]
    fn test_split_at_double_speed() {
        let interval = DisplayInterval::new(1_000, 4_000)
            .with_speed(2.0)
            .with_source_offset(500);
        let (left, right) = interval.split_at(2_000).unwrap();

        assert_eq!(left.start_ms, 1_000);
        assert_eq!(left.duration_ms, 2_000);
        assert_eq!(left.end_ms(), 2_000);
        assert_eq!(left.source_offset_ms, 500);

        assert_eq!(right.start_ms, 2_000);
        assert_eq!(right.duration_ms, 2_000);
        assert_eq!(right.source_offset_ms, 2_500);
        assert_eq!(right.end_ms(), interval.end_ms());
    }

    #[test]
    fn test_split_outside_interval_rejected() {
        let interval = DisplayInterval::new(1_000, 1_000);
        assert!(interval.split_at(1_000).is_err());
        assert!(interval.split_at(2_000).is_err());
        assert!(interval.split_at(5_000).is_err());
    }

    #[test]
    fn test_check_rejects_bad_speed() {
        assert!(DisplayInterval::new(0, 10).with_speed(0.0).check().is_err());
        assert!(DisplayInterval::new(0, 10).with_speed(f64::NAN).check().is_err());
        assert!(DisplayInterval::new(0, 0).check().is_err());
        assert!(DisplayInterval::new(0, 10).with_speed(0.5).check().is_ok());
    }

    proptest! {
        #[test]
        fn prop_split_preserves_source_consumption(
            start in 0u64..10_000,
            duration in 2u64..20_000,
            speed_pct in 25u32..400,
            offset in 0u64..5_000,
            frac in 0.01f64..0.99,
        ) {
            let speed = speed_pct as f64 / 100.0;
            let interval = DisplayInterval::new(start, duration)
                .with_speed(speed)
                .with_source_offset(offset);
            let span = interval.end_ms() - interval.start_ms;
            prop_assume!(span >= 2);
            let at = start + ((span as f64 * frac) as u64).clamp(1, span - 1);

            let (left, right) = interval.split_at(at).unwrap();
            prop_assert_eq!(left.duration_ms + right.duration_ms, duration);
            prop_assert_eq!(right.source_offset_ms, left.source_offset_ms + left.duration_ms);
            prop_assert_eq!(right.start_ms, at);

            let tolerance = 1 + (1.0 / speed).ceil() as u64;
            prop_assert!(left.end_ms().abs_diff(at) <= tolerance);
            prop_assert!(right.end_ms().abs_diff(interval.end_ms()) <= tolerance);
        }
    }
}
