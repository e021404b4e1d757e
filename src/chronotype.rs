//! Chronotype estimation from corrected mid-sleep on free days (MSFsc)
//!
//! Follows the Munich Chronotype Questionnaire approach: the mid-point of
//! sleep on free days is a good proxy for circadian phase, but people tend to
//! oversleep on weekends to pay back the week's sleep debt, which pushes the
//! mid-point later. MSFsc corrects for that:
//!
//! ```text
//! MSFsc = MSF − 0.5 × (SD_free − SD_week)
//! ```
//!
//! where MSF is the mean mid-sleep on free days, SD_free the mean sleep
//! duration on free days and SD_week the mean duration over all nights.

use chrono::{Datelike, Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::NightRecord;
use crate::normalizer::TimeNormalizer;

/// Chronotype categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chronotype {
    /// Lark
    EarlyType,
    /// Pigeon
    Intermediate,
    /// Owl
    LateType,
}

impl fmt::Display for Chronotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chronotype::EarlyType => write!(f, "Early type (lark)"),
            Chronotype::Intermediate => write!(f, "Intermediate (pigeon)"),
            Chronotype::LateType => write!(f, "Late type (owl)"),
        }
    }
}

/// Clock-time boundaries between chronotype categories
///
/// Mid-sleep times are compared on a noon-to-noon clock, so 23:30 sorts
/// before 03:00.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronotypeThresholds {
    /// Corrected mid-sleep before this time is an early type
    pub early_before: NaiveTime,

    /// Corrected mid-sleep at or after this time is a late type
    pub late_from: NaiveTime,
}

impl Default for ChronotypeThresholds {
    fn default() -> Self {
        ChronotypeThresholds {
            early_before: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default(),
            late_from: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
        }
    }
}

impl ChronotypeThresholds {
    pub fn is_ordered(&self) -> bool {
        from_noon(hours_of(self.early_before)) <= from_noon(hours_of(self.late_from))
    }

    pub fn classify(&self, mid_sleep_hours: f64) -> Chronotype {
        let value = from_noon(mid_sleep_hours);
        if value < from_noon(hours_of(self.early_before)) {
            Chronotype::EarlyType
        } else if value >= from_noon(hours_of(self.late_from)) {
            Chronotype::LateType
        } else {
            Chronotype::Intermediate
        }
    }
}

/// Chronotype assessment over a window of nights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronotypeResult {
    /// Corrected mid-sleep on free days as a time of day
    pub corrected_mid_sleep: NaiveTime,

    /// Same value in fractional hours, 0-24
    pub mid_sleep_hours: f64,

    pub category: Chronotype,

    /// Nights that contributed (bedtime and duration known)
    pub nights_used: usize,

    /// Of those, nights starting on a Saturday or Sunday
    pub free_days_used: usize,

    /// No weekend night was available, so all nights stood in for free
    /// days and the value is plain mid-sleep rather than MSFsc
    pub estimated_without_free_days: bool,
}

/// MSFsc-based chronotype estimator
#[derive(Debug, Clone, Default)]
pub struct ChronotypeEstimator {
    thresholds: ChronotypeThresholds,
}

struct NightSample {
    mid_sleep: f64,
    duration_hours: f64,
    free_day: bool,
}

impl ChronotypeEstimator {
    pub fn new(thresholds: ChronotypeThresholds) -> Self {
        ChronotypeEstimator { thresholds }
    }

    /// Estimate chronotype; `None` when no night in the window is usable
    ///
    /// A window without any weekend night uses all nights as free days,
    /// which makes the oversleep correction zero; the result is flagged
    /// with `estimated_without_free_days`.
    pub fn estimate(&self, nights: &[NightRecord]) -> Option<ChronotypeResult> {
        let samples: Vec<NightSample> = nights.iter().filter_map(Self::sample).collect();
        if samples.is_empty() {
            debug!(nights = nights.len(), "no usable nights for chronotype");
            return None;
        }

        let free: Vec<&NightSample> = samples.iter().filter(|s| s.free_day).collect();
        let without_free_days = free.is_empty();
        let free: Vec<&NightSample> = if without_free_days {
            debug!("no free days in window, using all nights");
            samples.iter().collect()
        } else {
            free
        };

        let msf = mean(free.iter().map(|s| s.mid_sleep));
        let sd_free = mean(free.iter().map(|s| s.duration_hours));
        let sd_week = mean(samples.iter().map(|s| s.duration_hours));

        let corrected = (msf - 0.5 * (sd_free - sd_week)).rem_euclid(24.0);
        let seconds = (corrected * 3600.0).round() as u32 % 86_400;

        Some(ChronotypeResult {
            corrected_mid_sleep: NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
                .unwrap_or_default(),
            mid_sleep_hours: corrected,
            category: self.thresholds.classify(corrected),
            nights_used: samples.len(),
            free_days_used: samples.iter().filter(|s| s.free_day).count(),
            estimated_without_free_days: without_free_days,
        })
    }

    fn sample(night: &NightRecord) -> Option<NightSample> {
        let bedtime = match TimeNormalizer::resolve_bedtime(night) {
            Ok(t) => t,
            Err(e) => {
                debug!(night = %night.sleep_date_time, reason = %e, "skipping night");
                return None;
            }
        };
        let duration = night.duration_minutes?;

        let midpoint = bedtime + Duration::seconds(duration as i64 * 30);
        Some(NightSample {
            mid_sleep: hours_of(midpoint.time()),
            duration_hours: duration as f64 / 60.0,
            free_day: bedtime.weekday().num_days_from_monday() >= 5,
        })
    }
}

fn hours_of(time: NaiveTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0
}

fn from_noon(hours: f64) -> f64 {
    (hours - 12.0).rem_euclid(24.0)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    /// 2024-03-04 is a Monday
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn night(bedtime: NaiveDateTime, duration: u32) -> NightRecord {
        let mut n = NightRecord::new("u1", bedtime);
        n.device_bedtime = Some(bedtime);
        n.user_bedtime = Some(bedtime);
        n.duration_minutes = Some(duration);
        n
    }

    #[test]
    fn test_weekend_oversleep_is_corrected() {
        let mut nights: Vec<NightRecord> = (4..=8).map(|d| night(at(d, 23, 0), 420)).collect();
        nights.push(night(at(9, 1, 0), 540));
        nights.push(night(at(10, 1, 0), 540));

        let result = ChronotypeEstimator::default().estimate(&nights).unwrap();

        // MSF 5.5, SD_free 9, SD_week 53/7
        let expected = 5.5 - 0.5 * (9.0 - 53.0 / 7.0);
        assert!((result.mid_sleep_hours - expected).abs() < 1e-9);
        assert_eq!(result.corrected_mid_sleep, NaiveTime::from_hms_opt(4, 47, 9).unwrap());
        assert_eq!(result.category, Chronotype::Intermediate);
        assert_eq!(result.nights_used, 7);
        assert_eq!(result.free_days_used, 2);
        assert!(!result.estimated_without_free_days);
    }

    #[test]
    fn test_early_and_late_types() {
        let early: Vec<NightRecord> = (4..=10).map(|d| night(at(d, 22, 0), 420)).collect();
        let result = ChronotypeEstimator::default().estimate(&early).unwrap();
        assert_eq!(result.corrected_mid_sleep, NaiveTime::from_hms_opt(1, 30, 0).unwrap());
        assert_eq!(result.category, Chronotype::EarlyType);

        let late: Vec<NightRecord> = (4..=10).map(|d| night(at(d, 2, 0), 480)).collect();
        let result = ChronotypeEstimator::default().estimate(&late).unwrap();
        assert_eq!(result.category, Chronotype::LateType);
    }

    #[test]
    fn test_weekdays_only_window() {
        let nights: Vec<NightRecord> = (4..=6).map(|d| night(at(d, 23, 30), 420)).collect();
        let result = ChronotypeEstimator::default().estimate(&nights).unwrap();
        assert_eq!(result.free_days_used, 0);
        assert!(result.estimated_without_free_days);
        assert_eq!(result.corrected_mid_sleep, NaiveTime::from_hms_opt(3, 0, 0).unwrap());
        assert_eq!(result.category, Chronotype::Intermediate);
    }

    #[test]
    fn test_empty_window() {
        assert!(ChronotypeEstimator::default().estimate(&[]).is_none());

        let mut n = night(at(4, 23, 0), 420);
        n.user_bedtime = None;
        assert!(ChronotypeEstimator::default().estimate(&[n]).is_none());
    }

    #[test]
    fn test_classification_wraps_midnight() {
        let thresholds = ChronotypeThresholds::default();
        assert!(thresholds.is_ordered());
        assert_eq!(thresholds.classify(23.5), Chronotype::EarlyType);
        assert_eq!(thresholds.classify(2.99), Chronotype::EarlyType);
        assert_eq!(thresholds.classify(3.0), Chronotype::Intermediate);
        assert_eq!(thresholds.classify(5.0), Chronotype::LateType);
        assert_eq!(thresholds.classify(9.0), Chronotype::LateType);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = ChronotypeThresholds {
            early_before: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            late_from: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        let estimator = ChronotypeEstimator::new(thresholds);

        let nights: Vec<NightRecord> = (4..=10).map(|d| night(at(d, 2, 0), 480)).collect();
        assert_eq!(estimator.estimate(&nights).unwrap().category, Chronotype::LateType);

        let nights: Vec<NightRecord> = (4..=10).map(|d| night(at(d, 1, 0), 480)).collect();
        assert_eq!(estimator.estimate(&nights).unwrap().category, Chronotype::Intermediate);
    }

    #[test]
    fn test_unordered_thresholds() {
        let thresholds = ChronotypeThresholds {
            early_before: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            late_from: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        };
        assert!(!thresholds.is_ordered());
    }
}
