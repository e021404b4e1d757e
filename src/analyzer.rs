//! Collaborator-facing entry points
//!
//! [`NightSource`] is what the core needs from whatever stores nights and
//! profiles; [`InMemoryNightStore`] is a ready-made implementation.
//! [`SleepAnalyzer`] looks records up through a source and runs the
//! per-night and multi-night calculations over them.

use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::chronotype::{ChronotypeEstimator, ChronotypeResult};
use crate::config::{AnalysisSettings, AppConfig};
use crate::cycles::CycleCounter;
use crate::error::{Result, SleepRsError};
use crate::hrv::HrvAnalyzer;
use crate::metrics::{MetricsEngine, NightMetrics};
use crate::models::{Gender, NightRecord, UserProfile};
use crate::recovery::{RecoveryBreakdown, RecoveryIndexEstimator};
use crate::regularity::{RegularityEstimator, RegularityResult};

/// Read access to stored nights and profiles
pub trait NightSource {
    /// The night with this canonical sleep date-time, if recorded
    fn night(&self, user: &str, sleep_date_time: NaiveDateTime) -> Result<Option<NightRecord>>;

    /// Nights with `as_of - window_days <= sleep_date_time <= as_of`, oldest first
    fn recent_nights(
        &self,
        user: &str,
        window_days: u32,
        as_of: NaiveDateTime,
    ) -> Result<Vec<NightRecord>>;

    fn profile(&self, user: &str) -> Result<Option<UserProfile>>;
}

/// In-memory night and profile store
///
/// Holds at most one night per (user, sleep date-time); inserting a night
/// for an existing key replaces the previous record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNightStore {
    nights: BTreeMap<(String, NaiveDateTime), NightRecord>,
    profiles: HashMap<String, UserProfile>,
}

impl InMemoryNightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a night, returning the record it replaced
    pub fn insert_night(&mut self, night: NightRecord) -> Option<NightRecord> {
        let key = (night.user_id.clone(), night.sleep_date_time);
        self.nights.insert(key, night)
    }

    /// Store a profile, returning the profile it replaced
    pub fn add_profile(&mut self, profile: UserProfile) -> Option<UserProfile> {
        self.profiles.insert(profile.id.clone(), profile)
    }

    pub fn len(&self) -> usize {
        self.nights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nights.is_empty()
    }
}

impl NightSource for InMemoryNightStore {
    fn night(&self, user: &str, sleep_date_time: NaiveDateTime) -> Result<Option<NightRecord>> {
        Ok(self
            .nights
            .get(&(user.to_string(), sleep_date_time))
            .cloned())
    }

    fn recent_nights(
        &self,
        user: &str,
        window_days: u32,
        as_of: NaiveDateTime,
    ) -> Result<Vec<NightRecord>> {
        // a window reaching past the calendar's start covers all history
        let start = as_of
            .checked_sub_signed(Duration::days(window_days as i64))
            .unwrap_or(NaiveDateTime::MIN);
        Ok(self
            .nights
            .range((user.to_string(), start)..=(user.to_string(), as_of))
            .map(|(_, night)| night.clone())
            .collect())
    }

    fn profile(&self, user: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.get(user).cloned())
    }
}

/// Profiles and nights as exchanged with the collaborator layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleepDataset {
    #[serde(default)]
    pub profiles: Vec<UserProfile>,

    #[serde(default)]
    pub nights: Vec<NightRecord>,
}

impl SleepDataset {
    /// Read a JSON dataset
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load into a store; later nights replace earlier ones with the same key
    pub fn into_store(self) -> InMemoryNightStore {
        let mut store = InMemoryNightStore::new();
        for profile in self.profiles {
            store.add_profile(profile);
        }
        for night in self.nights {
            store.insert_night(night);
        }
        store
    }
}

/// Sleep analysis over a night source
///
/// Windows are anchored at the analyzer's reference time, which defaults to
/// the local time at construction.
pub struct SleepAnalyzer<S: NightSource> {
    source: S,
    as_of: NaiveDateTime,
    settings: AnalysisSettings,
    chronotype: ChronotypeEstimator,
    regularity: RegularityEstimator,
    recovery: RecoveryIndexEstimator,
}

impl<S: NightSource> SleepAnalyzer<S> {
    pub fn new(source: S) -> Self {
        Self::from_config(source, &AppConfig::default())
    }

    pub fn from_config(source: S, config: &AppConfig) -> Self {
        SleepAnalyzer {
            source,
            as_of: Local::now().naive_local(),
            settings: config.analysis.clone(),
            chronotype: ChronotypeEstimator::new(config.chronotype.clone()),
            regularity: RegularityEstimator::new(config.analysis.regularity_reference_hour),
            recovery: RecoveryIndexEstimator::new(HrvAnalyzer::new(config.hrv.clone())),
        }
    }

    /// Anchor windows at a fixed time instead of now
    pub fn with_reference_time(mut self, as_of: NaiveDateTime) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    #[instrument(level = "debug", skip(self))]
    pub fn compute_night_metrics(
        &self,
        user: &str,
        sleep_date_time: NaiveDateTime,
    ) -> Result<NightMetrics> {
        let profile = self.require_profile(user)?;
        let night = self.require_night(user, sleep_date_time)?;
        Ok(MetricsEngine::compute_night_metrics(&night, &profile))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn count_cycles(&self, user: &str, sleep_date_time: NaiveDateTime) -> Result<u32> {
        self.require_profile(user)?;
        let night = self.require_night(user, sleep_date_time)?;
        Ok(CycleCounter::count_cycles(&night.segments))
    }

    /// `None` when no night in the window has a usable bedtime and duration
    #[instrument(level = "debug", skip(self))]
    pub fn estimate_chronotype(
        &self,
        user: &str,
        window_days: u32,
    ) -> Result<Option<ChronotypeResult>> {
        self.require_profile(user)?;
        let nights = self.source.recent_nights(user, window_days, self.as_of)?;
        Ok(self.chronotype.estimate(&nights))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn estimate_regularity(&self, user: &str, window_days: u32) -> Result<RegularityResult> {
        self.require_profile(user)?;
        let nights = self.source.recent_nights(user, window_days, self.as_of)?;
        Ok(self.regularity.estimate(&nights))
    }

    /// Recovery index of the latest night in the window against the baseline
    pub fn estimate_recovery_index(
        &self,
        user: &str,
        age_months: u32,
        gender: Gender,
        window_days: u32,
        baseline_days: u32,
    ) -> Result<f64> {
        self.recovery_breakdown(user, age_months, gender, window_days, baseline_days)
            .map(|b| b.total())
    }

    /// Per-term contributions behind [`Self::estimate_recovery_index`]
    #[instrument(level = "debug", skip(self))]
    pub fn recovery_breakdown(
        &self,
        user: &str,
        age_months: u32,
        gender: Gender,
        window_days: u32,
        baseline_days: u32,
    ) -> Result<RecoveryBreakdown> {
        self.require_profile(user)?;
        let window = self.source.recent_nights(user, window_days, self.as_of)?;
        let baseline = self.source.recent_nights(user, baseline_days, self.as_of)?;

        match self
            .recovery
            .breakdown(user, age_months, gender, &window, &baseline)
        {
            Ok(breakdown) => {
                info!(user, index = breakdown.total(), "recovery index computed");
                Ok(breakdown)
            }
            Err(e) => {
                warn!(user, error = %e, "recovery index unavailable");
                Err(e.into())
            }
        }
    }

    /// Recovery breakdown with age and gender taken from the stored profile
    pub fn profile_recovery_breakdown(
        &self,
        user: &str,
        window_days: u32,
        baseline_days: u32,
    ) -> Result<RecoveryBreakdown> {
        let profile = self.require_profile(user)?;
        let age_months = profile.age_months(self.as_of.date());
        self.recovery_breakdown(user, age_months, profile.gender, window_days, baseline_days)
    }

    /// Per-night metrics for every night in the window, oldest first
    #[instrument(level = "debug", skip(self))]
    pub fn metrics_history(
        &self,
        user: &str,
        window_days: u32,
    ) -> Result<Vec<(NaiveDateTime, NightMetrics)>> {
        let profile = self.require_profile(user)?;
        let nights = self.source.recent_nights(user, window_days, self.as_of)?;
        let metrics = MetricsEngine::compute_batch(&nights, &profile);

        Ok(nights
            .iter()
            .map(|n| n.sleep_date_time)
            .zip(metrics)
            .collect())
    }

    fn require_profile(&self, user: &str) -> Result<UserProfile> {
        self.source.profile(user)?.ok_or_else(|| {
            warn!(user, "unknown user");
            SleepRsError::not_found("user", user)
        })
    }

    fn require_night(&self, user: &str, sleep_date_time: NaiveDateTime) -> Result<NightRecord> {
        self.source.night(user, sleep_date_time)?.ok_or_else(|| {
            warn!(user, night = %sleep_date_time, "unknown night");
            SleepRsError::not_found("night", format!("{user} at {sleep_date_time}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalculationError;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn profile(id: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            weight: dec!(70),
            height: 175,
            gender: Gender::Female,
        }
    }

    fn night(user: &str, day: u32) -> NightRecord {
        let bed = at(day, 23, 0);
        let mut n = NightRecord::new(user, bed);
        n.device_bedtime = Some(bed);
        n.user_bedtime = Some(bed);
        n.device_wake_time = Some(bed + Duration::hours(8));
        n.user_wake_time = Some(bed + Duration::hours(8));
        n.duration_minutes = Some(450);
        n
    }

    fn store() -> InMemoryNightStore {
        let mut store = InMemoryNightStore::new();
        store.add_profile(profile("u1"));
        for day in 1..=10 {
            store.insert_night(night("u1", day));
        }
        store.insert_night(night("u2", 5));
        store
    }

    #[test]
    fn test_reimport_replaces_night() {
        let mut store = InMemoryNightStore::new();
        assert!(store.insert_night(night("u1", 4)).is_none());

        let mut corrected = night("u1", 4);
        corrected.duration_minutes = Some(400);
        let replaced = store.insert_night(corrected).unwrap();

        assert_eq!(replaced.duration_minutes, Some(450));
        assert_eq!(store.len(), 1);
        let stored = store.night("u1", at(4, 23, 0)).unwrap().unwrap();
        assert_eq!(stored.duration_minutes, Some(400));
    }

    #[test]
    fn test_recent_nights_window_is_inclusive() {
        let store = store();
        let nights = store.recent_nights("u1", 3, at(9, 23, 0)).unwrap();
        let days: Vec<NaiveDateTime> = nights.iter().map(|n| n.sleep_date_time).collect();
        assert_eq!(days, vec![at(6, 23, 0), at(7, 23, 0), at(8, 23, 0), at(9, 23, 0)]);

        assert!(store.recent_nights("u3", 30, at(9, 23, 0)).unwrap().is_empty());
        assert_eq!(store.recent_nights("u2", 30, at(9, 23, 0)).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_user_and_night() {
        let analyzer = SleepAnalyzer::new(store()).with_reference_time(at(10, 23, 0));

        let err = analyzer.compute_night_metrics("nobody", at(4, 23, 0)).unwrap_err();
        assert!(matches!(err, SleepRsError::NotFound { ref entity, .. } if entity == "user"));

        let err = analyzer.count_cycles("u1", at(4, 12, 0)).unwrap_err();
        assert!(matches!(err, SleepRsError::NotFound { ref entity, .. } if entity == "night"));

        // nights without a profile are not enough
        assert!(analyzer.estimate_regularity("u2", 7).is_err());
    }

    #[test]
    fn test_window_anchoring() {
        let analyzer = SleepAnalyzer::new(store()).with_reference_time(at(10, 23, 0));
        assert_eq!(analyzer.as_of(), at(10, 23, 0));

        let regularity = analyzer.estimate_regularity("u1", 7).unwrap();
        assert_eq!(regularity.nights_used, 8);
        assert_eq!(regularity.bedtime_stddev_minutes, 0.0);

        let chronotype = analyzer.estimate_chronotype("u1", 7).unwrap().unwrap();
        assert_eq!(chronotype.nights_used, 8);

        let early = SleepAnalyzer::new(store()).with_reference_time(at(1, 0, 0));
        assert!(early.estimate_chronotype("u1", 7).unwrap().is_none());
        assert_eq!(early.estimate_regularity("u1", 7).unwrap(), RegularityResult::default());
    }

    #[test]
    fn test_oversized_window_covers_all_history() {
        let analyzer = SleepAnalyzer::new(store()).with_reference_time(at(10, 23, 0));

        let nights = analyzer.source().recent_nights("u1", u32::MAX, at(10, 23, 0)).unwrap();
        assert_eq!(nights.len(), 10);

        let regularity = analyzer.estimate_regularity("u1", u32::MAX).unwrap();
        assert_eq!(regularity.nights_used, 10);
        let chronotype = analyzer.estimate_chronotype("u1", u32::MAX).unwrap().unwrap();
        assert_eq!(chronotype.nights_used, 10);
        assert_eq!(analyzer.metrics_history("u1", u32::MAX).unwrap().len(), 10);
    }

    #[test]
    fn test_metrics_history() {
        let analyzer = SleepAnalyzer::new(store()).with_reference_time(at(10, 23, 0));
        let history = analyzer.metrics_history("u1", 2).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history[0].0, at(8, 23, 0));
        for (_, metrics) in &history {
            assert_eq!(metrics.sleep_efficiency_pct, 93.75);
        }
    }

    #[test]
    fn test_recovery_without_heart_rate() {
        let analyzer = SleepAnalyzer::new(store()).with_reference_time(at(10, 23, 0));
        let err = analyzer
            .estimate_recovery_index("u1", 400, Gender::Female, 1, 30)
            .unwrap_err();
        assert!(matches!(
            err,
            SleepRsError::Calculation(CalculationError::InsufficientData { .. })
        ));
        assert!(err.is_retryable());
        assert!(analyzer.profile_recovery_breakdown("u1", 1, 30).is_err());
    }

    #[test]
    fn test_dataset_into_store() {
        let dataset = SleepDataset {
            profiles: vec![profile("u1")],
            nights: vec![night("u1", 4), night("u1", 4), night("u1", 5)],
        };
        let json = serde_json::to_string(&dataset).unwrap();
        let parsed: SleepDataset = serde_json::from_str(&json).unwrap();

        let store = parsed.into_store();
        assert_eq!(store.len(), 2);
        assert!(store.profile("u1").unwrap().is_some());
    }
}
