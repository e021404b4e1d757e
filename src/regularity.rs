//! Sleep regularity over a window of nights
//!
//! Bedtimes and wake times are compared as clock times. Minutes since
//! midnight are shifted so the day starts at a reference hour (20:00 by
//! default), which keeps bedtimes on both sides of midnight on one
//! continuous scale: 23:30 and 00:30 are 60 minutes apart, not 1380.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::metrics::round2;
use crate::models::NightRecord;
use crate::normalizer::TimeNormalizer;

const MINUTES_PER_DAY: i64 = 1440;

/// Bed/wake-time dispersion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegularityResult {
    pub bedtime_stddev_minutes: f64,
    pub waketime_stddev_minutes: f64,

    /// Nights with both boundaries resolved
    pub nights_used: usize,
}

#[derive(Debug, Clone)]
pub struct RegularityEstimator {
    reference_hour: u32,
}

impl Default for RegularityEstimator {
    fn default() -> Self {
        RegularityEstimator { reference_hour: 20 }
    }
}

impl RegularityEstimator {
    pub fn new(reference_hour: u32) -> Self {
        RegularityEstimator {
            reference_hour: reference_hour % 24,
        }
    }

    pub fn reference_hour(&self) -> u32 {
        self.reference_hour
    }

    /// Population standard deviation of bed and wake times, in minutes
    ///
    /// Returns zeros when fewer than two nights have a resolvable window.
    pub fn estimate(&self, nights: &[NightRecord]) -> RegularityResult {
        let (bedtimes, waketimes): (Vec<f64>, Vec<f64>) = nights
            .iter()
            .filter_map(|night| match TimeNormalizer::resolve_window(night) {
                Ok((bed, wake)) => Some((self.normalize(bed), self.normalize(wake))),
                Err(e) => {
                    debug!(night = %night.sleep_date_time, reason = %e, "skipping night");
                    None
                }
            })
            .unzip();

        let nights_used = bedtimes.len();
        if nights_used < 2 {
            debug!(nights_used, "not enough nights for regularity");
            return RegularityResult {
                nights_used,
                ..RegularityResult::default()
            };
        }

        RegularityResult {
            bedtime_stddev_minutes: round2(bedtimes.iter().population_std_dev()),
            waketime_stddev_minutes: round2(waketimes.iter().population_std_dev()),
            nights_used,
        }
    }

    /// Minutes elapsed since the most recent reference hour
    fn normalize(&self, time: NaiveDateTime) -> f64 {
        let minutes = (time.hour() * 60 + time.minute()) as i64;
        (minutes - self.reference_hour as i64 * 60).rem_euclid(MINUTES_PER_DAY) as f64
    }
}
