use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SleepRsError};

/// Largest per-phase duration a single night can carry (24 hours)
pub const MAX_PHASE_MINUTES: u16 = 1440;

/// Largest heart rate accepted from a device
pub const MAX_BPM: u16 = 300;

/// Sleep stages reported by the tracking device
///
/// Healthy adult sleep architecture (% of total sleep time):
/// - Deep: 13-23%
/// - Light: 45-55%
/// - REM: 20-25%
/// - Awake: <5%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SleepState {
    /// Light sleep (NREM 1 & 2)
    Light,
    /// Deep sleep / Slow-wave sleep (NREM 3)
    Deep,
    /// REM (Rapid Eye Movement) sleep
    REM,
    /// Awake periods inside the sleep window
    Awake,
}

impl fmt::Display for SleepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepState::Light => write!(f, "Light"),
            SleepState::Deep => write!(f, "Deep"),
            SleepState::REM => write!(f, "REM"),
            SleepState::Awake => write!(f, "Awake"),
        }
    }
}

/// Individual sleep stage segment with timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSegment {
    pub state: SleepState,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

impl SleepSegment {
    pub fn new(state: SleepState, start_time: NaiveDateTime, end_time: NaiveDateTime) -> Self {
        SleepSegment {
            state,
            start_time,
            end_time,
        }
    }

    /// Segment length in (fractional) minutes
    pub fn duration_minutes(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 60.0
    }
}

/// A single heart-rate reading recorded during the night
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub time: NaiveDateTime,
    /// Beats per minute, 0-300
    pub bpm: u16,
}

/// Per-phase duration totals reported by the device, in minutes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDurations {
    #[serde(default)]
    pub deep: u16,
    #[serde(default)]
    pub light: u16,
    #[serde(default)]
    pub rem: u16,
    #[serde(default)]
    pub awake: u16,
}

impl PhaseDurations {
    pub fn get(&self, state: SleepState) -> u16 {
        match state {
            SleepState::Deep => self.deep,
            SleepState::Light => self.light,
            SleepState::REM => self.rem,
            SleepState::Awake => self.awake,
        }
    }
}

/// One night of sleep for one user
///
/// Timestamps are device-local wall-clock values. Both the device and the
/// user may report bed and wake times; see [`crate::normalizer`] for how the
/// authoritative values are chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightRecord {
    /// Owner of the record
    pub user_id: String,

    /// Canonical sleep date-time; unique per user
    pub sleep_date_time: NaiveDateTime,

    pub device_bedtime: Option<NaiveDateTime>,
    pub user_bedtime: Option<NaiveDateTime>,
    pub device_wake_time: Option<NaiveDateTime>,
    pub user_wake_time: Option<NaiveDateTime>,

    /// Time asleep in minutes
    pub duration_minutes: Option<u32>,

    #[serde(default)]
    pub phases: PhaseDurations,

    /// Number of awakenings during the night
    pub awake_count: Option<u16>,

    pub min_heart_rate: Option<u16>,
    pub avg_heart_rate: Option<u16>,
    pub max_heart_rate: Option<u16>,

    /// Stage segments ordered by start time
    #[serde(default)]
    pub segments: Vec<SleepSegment>,

    #[serde(default)]
    pub heart_rate: Vec<HeartRateSample>,
}

impl NightRecord {
    /// Create an empty record for the given user and canonical date-time
    pub fn new(user_id: impl Into<String>, sleep_date_time: NaiveDateTime) -> Self {
        NightRecord {
            user_id: user_id.into(),
            sleep_date_time,
            device_bedtime: None,
            user_bedtime: None,
            device_wake_time: None,
            user_wake_time: None,
            duration_minutes: None,
            phases: PhaseDurations::default(),
            awake_count: None,
            min_heart_rate: None,
            avg_heart_rate: None,
            max_heart_rate: None,
            segments: Vec::new(),
            heart_rate: Vec::new(),
        }
    }

    /// Heart-rate values in recording order
    pub fn bpm_series(&self) -> Vec<u16> {
        let mut samples = self.heart_rate.clone();
        samples.sort_by_key(|s| s.time);
        samples.into_iter().map(|s| s.bpm).collect()
    }

    /// Ingestion-side sanity check for collaborator code
    ///
    /// The estimators accept upstream data as-is and never call this.
    pub fn validate(&self) -> Result<()> {
        for state in [
            SleepState::Deep,
            SleepState::Light,
            SleepState::REM,
            SleepState::Awake,
        ] {
            let minutes = self.phases.get(state);
            if minutes > MAX_PHASE_MINUTES {
                return Err(SleepRsError::Validation(format!(
                    "{} phase duration {} exceeds {} minutes",
                    state, minutes, MAX_PHASE_MINUTES
                )));
            }
        }

        if let Some(sample) = self.heart_rate.iter().find(|s| s.bpm > MAX_BPM) {
            return Err(SleepRsError::Validation(format!(
                "heart rate {} bpm at {} exceeds {} bpm",
                sample.bpm, sample.time, MAX_BPM
            )));
        }

        if let Some(segment) = self.segments.iter().find(|s| s.end_time <= s.start_time) {
            return Err(SleepRsError::Validation(format!(
                "{} segment starting at {} does not end after it starts",
                segment.state, segment.start_time
            )));
        }

        Ok(())
    }
}

/// Biological sex used for BMR and recovery coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => write!(f, "Female"),
            Gender::Male => write!(f, "Male"),
        }
    }
}

/// User profile used as computation input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique user identifier
    pub id: String,

    pub date_of_birth: NaiveDate,

    /// Weight in kilograms
    pub weight: Decimal,

    /// Height in centimeters
    pub height: u16,

    pub gender: Gender,
}

impl UserProfile {
    /// Age in whole months on the given date, counted by calendar month
    pub fn age_months(&self, on: NaiveDate) -> u32 {
        let years = on.year() - self.date_of_birth.year();
        let months = on.month() as i32 - self.date_of_birth.month() as i32;
        (years * 12 + months).max(0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_sleep_state_display() {
        assert_eq!(format!("{}", SleepState::Deep), "Deep");
        assert_eq!(format!("{}", SleepState::REM), "REM");
        assert_eq!(format!("{}", SleepState::Awake), "Awake");
    }

    #[test]
    fn test_segment_duration() {
        let seg = SleepSegment::new(SleepState::Light, at(1, 0), at(1, 45));
        assert_eq!(seg.duration_minutes(), 45.0);
    }

    #[test]
    fn test_age_months() {
        let profile = UserProfile {
            id: "u1".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 5, 20).unwrap(),
            weight: dec!(70),
            height: 175,
            gender: Gender::Female,
        };

        assert_eq!(profile.age_months(NaiveDate::from_ymd_opt(2021, 5, 1).unwrap()), 252);
        assert_eq!(profile.age_months(NaiveDate::from_ymd_opt(2021, 8, 1).unwrap()), 255);
        assert_eq!(profile.age_months(NaiveDate::from_ymd_opt(1999, 1, 1).unwrap()), 0);
    }

    #[test]
    fn test_bpm_series_is_time_ordered() {
        let mut night = NightRecord::new("u1", at(23, 0));
        night.heart_rate = vec![
            HeartRateSample { time: at(2, 0), bpm: 55 },
            HeartRateSample { time: at(1, 0), bpm: 60 },
        ];
        assert_eq!(night.bpm_series(), vec![60, 55]);
    }

    #[test]
    fn test_validate() {
        let mut night = NightRecord::new("u1", at(23, 0));
        assert!(night.validate().is_ok());

        night.phases.deep = 1500;
        assert!(matches!(night.validate(), Err(SleepRsError::Validation(_))));

        night.phases.deep = 90;
        night.heart_rate.push(HeartRateSample { time: at(1, 0), bpm: 301 });
        assert!(night.validate().is_err());

        night.heart_rate.clear();
        night
            .segments
            .push(SleepSegment::new(SleepState::Deep, at(2, 0), at(2, 0)));
        assert!(night.validate().is_err());
    }

    #[test]
    fn test_night_record_serialization() {
        let mut night = NightRecord::new("u1", at(23, 0));
        night.duration_minutes = Some(420);
        night.phases = PhaseDurations {
            deep: 90,
            light: 240,
            rem: 90,
            awake: 20,
        };

        let json = serde_json::to_string(&night).unwrap();
        let back: NightRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(night, back);
    }
}
