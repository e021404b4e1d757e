//! Sleep cycle counting
//!
//! A cycle is a contiguous run of non-awake segments. It counts as completed
//! when it lasts at least 90 minutes and contains both deep and REM sleep.
//! An awake segment, or the end of the night, closes the current run.

use std::borrow::Cow;

use crate::models::{SleepSegment, SleepState};

/// Minimum length of a completed cycle, in minutes
pub const MIN_CYCLE_MINUTES: f64 = 90.0;

/// Counts completed sleep cycles in a night's segments
pub struct CycleCounter;

#[derive(Debug, Default)]
struct CycleRun {
    minutes: f64,
    has_deep: bool,
    has_rem: bool,
}

impl CycleRun {
    fn is_complete(&self) -> bool {
        self.minutes >= MIN_CYCLE_MINUTES && self.has_deep && self.has_rem
    }
}

impl CycleCounter {
    /// Number of completed cycles; 0 for an empty sequence
    pub fn count_cycles(segments: &[SleepSegment]) -> u32 {
        let ordered: Cow<[SleepSegment]> =
            if segments.windows(2).all(|w| w[0].start_time <= w[1].start_time) {
                Cow::Borrowed(segments)
            } else {
                let mut sorted = segments.to_vec();
                sorted.sort_by_key(|s| s.start_time);
                Cow::Owned(sorted)
            };

        let mut count = 0;
        let mut run = CycleRun::default();
        let last = ordered.len().saturating_sub(1);

        for (i, segment) in ordered.iter().enumerate() {
            match segment.state {
                SleepState::Awake => {}
                state => {
                    run.minutes += segment.duration_minutes();
                    run.has_deep |= state == SleepState::Deep;
                    run.has_rem |= state == SleepState::REM;
                }
            }

            if segment.state == SleepState::Awake || i == last {
                if run.is_complete() {
                    count += 1;
                }
                run = CycleRun::default();
            }
        }

        count
    }
}
