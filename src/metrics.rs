//! Single-night sleep quality metrics
//!
//! The engine is best-effort: every metric whose inputs are missing or
//! degenerate falls back to 0 instead of failing, so a dashboard can always
//! render a night. Each fallback is logged at debug level with its reason.
//!
//! | Metric               | Falls back to 0 when                                        |
//! |----------------------|-------------------------------------------------------------|
//! | latency              | no segments, bedtime unresolvable, or negative clock skew   |
//! | efficiency           | duration absent/zero, window unresolvable or not positive   |
//! | phase percentages    | duration absent/zero                                        |
//! | fragmentation        | duration absent/zero or awake count absent                  |
//! | calories             | duration absent, or weight/height/age zero                  |

use rayon::prelude::*;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Gender, NightRecord, SleepState, UserProfile};
use crate::normalizer::TimeNormalizer;

/// Share of each phase in the sleep window (0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhasePercentages {
    pub deep: f64,
    pub light: f64,
    pub rem: f64,
    pub awake: f64,
}

impl PhasePercentages {
    pub fn get(&self, state: SleepState) -> f64 {
        match state {
            SleepState::Deep => self.deep,
            SleepState::Light => self.light,
            SleepState::REM => self.rem,
            SleepState::Awake => self.awake,
        }
    }
}

/// Computed metrics for one night
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NightMetrics {
    /// Minutes from resolved bedtime to the first sleep segment
    pub latency_minutes: f64,

    /// Time asleep as a percentage of the resolved sleep window (0-100)
    pub sleep_efficiency_pct: f64,

    pub phase_pct: PhasePercentages,

    /// Awakenings per hour of sleep
    pub fragmentation_index: f64,

    /// Estimated kcal burned while asleep
    pub calories_burned: f64,
}

/// Recommended nightly sleep range for an age group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepNeed {
    pub min_hours: u8,
    pub max_hours: u8,
}

impl SleepNeed {
    pub fn contains(&self, hours: f64) -> bool {
        hours >= self.min_hours as f64 && hours <= self.max_hours as f64
    }
}

/// Single-night metrics calculator
pub struct MetricsEngine;

impl MetricsEngine {
    /// Compute all metrics for a night; never fails
    pub fn compute_night_metrics(night: &NightRecord, profile: &UserProfile) -> NightMetrics {
        let age_months = profile.age_months(night.sleep_date_time.date());

        NightMetrics {
            latency_minutes: round2(Self::latency_minutes(night)),
            sleep_efficiency_pct: round2(Self::sleep_efficiency(night)),
            phase_pct: Self::phase_percentages(night),
            fragmentation_index: round2(Self::fragmentation_index(night)),
            calories_burned: Self::night_calories(night, profile, age_months),
        }
    }

    /// Metrics for many nights at once
    ///
    /// Nights are independent, so the work is spread over the rayon pool.
    /// Output order matches input order.
    pub fn compute_batch(nights: &[NightRecord], profile: &UserProfile) -> Vec<NightMetrics> {
        nights
            .par_iter()
            .map(|night| Self::compute_night_metrics(night, profile))
            .collect()
    }

    pub fn latency_minutes(night: &NightRecord) -> f64 {
        let bedtime = match TimeNormalizer::resolve_bedtime(night) {
            Ok(t) => t,
            Err(e) => {
                debug!(night = %night.sleep_date_time, reason = %e, "latency falls back to 0");
                return 0.0;
            }
        };

        let Some(first_start) = night.segments.iter().map(|s| s.start_time).min() else {
            debug!(night = %night.sleep_date_time, "no segments, latency falls back to 0");
            return 0.0;
        };

        let latency = (first_start - bedtime).num_seconds() as f64 / 60.0;
        if latency < 0.0 {
            debug!(
                night = %night.sleep_date_time,
                latency,
                "first segment precedes bedtime, clamping latency to 0"
            );
            return 0.0;
        }
        latency
    }

    pub fn sleep_efficiency(night: &NightRecord) -> f64 {
        let duration = match night.duration_minutes {
            Some(d) if d > 0 => d as f64,
            _ => {
                debug!(night = %night.sleep_date_time, "no duration, efficiency falls back to 0");
                return 0.0;
            }
        };

        let (bedtime, wake_time) = match TimeNormalizer::resolve_window(night) {
            Ok(window) => window,
            Err(e) => {
                debug!(night = %night.sleep_date_time, reason = %e, "efficiency falls back to 0");
                return 0.0;
            }
        };

        let time_in_bed = (wake_time - bedtime).num_seconds() as f64 / 60.0;
        if time_in_bed <= 0.0 {
            debug!(
                night = %night.sleep_date_time,
                time_in_bed,
                "empty sleep window, efficiency falls back to 0"
            );
            return 0.0;
        }

        (duration * 100.0 / time_in_bed).clamp(0.0, 100.0)
    }

    /// Phase shares of duration + awake time
    pub fn phase_percentages(night: &NightRecord) -> PhasePercentages {
        let duration = match night.duration_minutes {
            Some(d) if d > 0 => d as f64,
            _ => {
                debug!(night = %night.sleep_date_time, "no duration, phase shares fall back to 0");
                return PhasePercentages::default();
            }
        };

        let total_sleep_time = duration + night.phases.awake as f64;
        let pct = |state: SleepState| {
            (night.phases.get(state) as f64 * 100.0 / total_sleep_time).clamp(0.0, 100.0)
        };

        PhasePercentages {
            deep: pct(SleepState::Deep),
            light: pct(SleepState::Light),
            rem: pct(SleepState::REM),
            awake: pct(SleepState::Awake),
        }
    }

    /// Awakenings per hour of sleep
    pub fn fragmentation_index(night: &NightRecord) -> f64 {
        match (night.awake_count, night.duration_minutes) {
            (Some(count), Some(duration)) if duration > 0 => {
                count as f64 / (duration as f64 / 60.0)
            }
            _ => {
                debug!(
                    night = %night.sleep_date_time,
                    "no awake count or duration, fragmentation falls back to 0"
                );
                0.0
            }
        }
    }

    fn night_calories(night: &NightRecord, profile: &UserProfile, age_months: u32) -> f64 {
        let Some(duration) = night.duration_minutes else {
            debug!(night = %night.sleep_date_time, "no duration, calories fall back to 0");
            return 0.0;
        };

        if profile.weight <= Decimal::ZERO || profile.height == 0 || age_months == 0 {
            debug!(
                night = %night.sleep_date_time,
                user = %profile.id,
                "incomplete profile, calories fall back to 0"
            );
            return 0.0;
        }

        calories_burned(profile.gender, profile.weight, profile.height, age_months, duration)
            .to_f64()
            .unwrap_or(0.0)
    }
}

/// Basal metabolic rate (kcal/day), Mifflin-St Jeor
///
/// `bmr = 10·weight + 6.25·height − 5·age_years + s` with s = +5 for men and
/// −161 for women. Age is given in months.
pub fn basal_metabolic_rate(gender: Gender, weight: Decimal, height: u16, age_months: u32) -> Decimal {
    let age_years = Decimal::from(age_months) / dec!(12);
    let constant = match gender {
        Gender::Male => dec!(5),
        Gender::Female => dec!(-161),
    };

    dec!(10) * weight + dec!(6.25) * Decimal::from(height) - dec!(5) * age_years + constant
}

/// Calories burned over a sleep of `duration_minutes`, rounded to 0.1 kcal
pub fn calories_burned(
    gender: Gender,
    weight: Decimal,
    height: u16,
    age_months: u32,
    duration_minutes: u32,
) -> Decimal {
    let bmr = basal_metabolic_rate(gender, weight, height, age_months);
    let hours = Decimal::from(duration_minutes) / dec!(60);

    (bmr * hours / dec!(24)).round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Recommended sleep per night for an age given in months
pub fn recommended_sleep_hours(age_months: u32) -> SleepNeed {
    let (min_hours, max_hours) = match age_months {
        0..=3 => (14, 17),
        4..=11 => (12, 15),
        12..=35 => (11, 14),
        36..=71 => (10, 13),
        72..=167 => (9, 11),
        168..=215 => (8, 10),
        216..=779 => (7, 9),
        _ => (7, 8),
    };
    SleepNeed {
        min_hours,
        max_hours,
    }
}

/// Mean sleep duration in hours over nights that report one, rounded to 0.01
pub fn average_sleep_hours(nights: &[NightRecord]) -> f64 {
    let durations: Vec<f64> = nights
        .iter()
        .filter_map(|n| n.duration_minutes)
        .filter(|&d| d > 0)
        .map(|d| d as f64)
        .collect();

    if durations.is_empty() {
        return 0.0;
    }

    round2(durations.iter().sum::<f64>() / durations.len() as f64 / 60.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhaseDurations, SleepSegment};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            // 21 years old on 2024-03-04
            date_of_birth: NaiveDate::from_ymd_opt(2003, 3, 1).unwrap(),
            weight: dec!(65),
            height: 182,
            gender: Gender::Male,
        }
    }

    fn full_night() -> NightRecord {
        let mut night = NightRecord::new("u1", at(4, 23, 0));
        night.device_bedtime = Some(at(4, 23, 0));
        night.user_bedtime = Some(at(4, 23, 10));
        night.device_wake_time = Some(at(5, 7, 0));
        night.user_wake_time = Some(at(5, 6, 50));
        night.duration_minutes = Some(420);
        night.phases = PhaseDurations {
            deep: 90,
            light: 240,
            rem: 90,
            awake: 30,
        };
        night.awake_count = Some(3);
        night.segments = vec![
            SleepSegment::new(SleepState::Light, at(4, 23, 15), at(5, 0, 0)),
            SleepSegment::new(SleepState::Deep, at(5, 0, 0), at(5, 1, 0)),
        ];
        night
    }

    #[test]
    fn test_full_night_metrics() {
        let m = MetricsEngine::compute_night_metrics(&full_night(), &profile());

        assert_eq!(m.latency_minutes, 15.0);
        // 420 / 480 minutes in bed
        assert_eq!(m.sleep_efficiency_pct, 87.5);
        // denominators are 420 + 30
        assert_eq!(m.phase_pct.deep, 20.0);
        assert!((m.phase_pct.light - 53.333).abs() < 0.01);
        assert!((m.phase_pct.awake - 6.667).abs() < 0.01);
        // 3 awakenings over 7 hours
        assert_eq!(m.fragmentation_index, 0.43);
        assert!(m.calories_burned > 0.0);
    }

    #[test]
    fn test_calories_reference_case() {
        // 10·65 + 6.25·182 − 5·21 + 5 = 1687.5; ×6h/24 = 421.875
        assert_eq!(basal_metabolic_rate(Gender::Male, dec!(65), 182, 252), dec!(1687.5));
        assert_eq!(calories_burned(Gender::Male, dec!(65), 182, 252, 360), dec!(421.9));

        let mut night = NightRecord::new("u1", at(4, 23, 0));
        night.duration_minutes = Some(360);
        let m = MetricsEngine::compute_night_metrics(&night, &profile());
        assert!((m.calories_burned - 421.9).abs() < 1e-9);
    }

    #[test]
    fn test_female_bmr_constant() {
        let male = basal_metabolic_rate(Gender::Male, dec!(60), 170, 360);
        let female = basal_metabolic_rate(Gender::Female, dec!(60), 170, 360);
        assert_eq!(male - female, dec!(166));
    }

    #[test]
    fn test_empty_night_degrades_to_zero() {
        let mut night = NightRecord::new("u1", at(4, 23, 0));
        night.duration_minutes = Some(360);

        let m = MetricsEngine::compute_night_metrics(&night, &profile());
        assert_eq!(m.latency_minutes, 0.0);
        assert_eq!(m.sleep_efficiency_pct, 0.0);
        assert_eq!(m.phase_pct, PhasePercentages::default());
        assert_eq!(m.fragmentation_index, 0.0);
        assert!((m.calories_burned - 421.9).abs() < 1e-9);

        night.duration_minutes = None;
        let m = MetricsEngine::compute_night_metrics(&night, &profile());
        assert_eq!(m, NightMetrics::default());
    }

    #[test]
    fn test_negative_latency_is_clamped() {
        let mut night = full_night();
        night.segments[0].start_time = at(4, 22, 30);
        assert_eq!(MetricsEngine::latency_minutes(&night), 0.0);
    }

    #[test]
    fn test_efficiency_is_capped() {
        let mut night = full_night();
        night.duration_minutes = Some(600);
        assert_eq!(MetricsEngine::sleep_efficiency(&night), 100.0);

        night.device_wake_time = night.device_bedtime;
        night.user_wake_time = night.device_bedtime;
        assert_eq!(MetricsEngine::sleep_efficiency(&night), 0.0);
    }

    #[test]
    fn test_incomplete_profile_gives_no_calories() {
        let mut p = profile();
        p.weight = Decimal::ZERO;
        let m = MetricsEngine::compute_night_metrics(&full_night(), &p);
        assert_eq!(m.calories_burned, 0.0);
    }

    #[test]
    fn test_compute_batch_preserves_order() {
        let mut short = full_night();
        short.duration_minutes = Some(240);
        let nights = vec![full_night(), short];

        let batch = MetricsEngine::compute_batch(&nights, &profile());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], MetricsEngine::compute_night_metrics(&nights[0], &profile()));
        assert_eq!(batch[1], MetricsEngine::compute_night_metrics(&nights[1], &profile()));
    }

    #[test]
    fn test_recommended_sleep_hours() {
        assert_eq!(recommended_sleep_hours(2), SleepNeed { min_hours: 14, max_hours: 17 });
        assert_eq!(recommended_sleep_hours(30), SleepNeed { min_hours: 11, max_hours: 14 });
        assert_eq!(recommended_sleep_hours(21 * 12), SleepNeed { min_hours: 7, max_hours: 9 });
        assert_eq!(recommended_sleep_hours(70 * 12), SleepNeed { min_hours: 7, max_hours: 8 });
        assert!(recommended_sleep_hours(21 * 12).contains(7.5));
        assert!(!recommended_sleep_hours(21 * 12).contains(6.0));
    }

    #[test]
    fn test_average_sleep_hours() {
        let mut a = full_night();
        a.duration_minutes = Some(420);
        let mut b = full_night();
        b.duration_minutes = Some(390);
        let mut c = full_night();
        c.duration_minutes = None;

        assert_eq!(average_sleep_hours(&[a, b, c]), 6.75);
        assert_eq!(average_sleep_hours(&[]), 0.0);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_percentages_stay_in_bounds(
            duration in 0u32..1440u32,
            deep in 0u16..=1440u16,
            light in 0u16..=1440u16,
            rem in 0u16..=1440u16,
            awake in 0u16..=1440u16,
            bed_offset in -120i64..120i64,
            window in -60i64..900i64,
            awake_count in 0u16..40u16,
        ) {
            let mut night = NightRecord::new("u1", at(4, 23, 0));
            night.device_bedtime = Some(at(4, 23, 0));
            night.user_bedtime = Some(at(4, 23, 0) + Duration::minutes(bed_offset));
            night.device_wake_time = Some(at(4, 23, 0) + Duration::minutes(window));
            night.user_wake_time = Some(at(4, 23, 0) + Duration::minutes(window));
            night.duration_minutes = Some(duration);
            night.phases = PhaseDurations { deep, light, rem, awake };
            night.awake_count = Some(awake_count);

            let m = MetricsEngine::compute_night_metrics(&night, &profile());

            prop_assert!(m.sleep_efficiency_pct >= 0.0 && m.sleep_efficiency_pct <= 100.0);
            for state in [SleepState::Deep, SleepState::Light, SleepState::REM, SleepState::Awake] {
                let pct = m.phase_pct.get(state);
                prop_assert!((0.0..=100.0).contains(&pct));
            }
            prop_assert!(m.latency_minutes >= 0.0);
            prop_assert!(m.fragmentation_index >= 0.0);
            prop_assert!(m.calories_burned >= 0.0);
        }
    }
}
