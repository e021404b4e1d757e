//! Recovery index
//!
//! Scores how well the most recent night restored the autonomic nervous
//! system, compared with the user's own longer-term HRV baseline. Four HRV
//! signals are weighted into one number:
//!
//! ```text
//! k_gender = 1.0 (male) | 1.12 (female)
//! k_age    = 1 + (40 − age_years) / 100
//!
//! recovery = k_age · k_gender · (RMSSD_night / RMSSD_baseline) · 40
//!          + (HF / LF)_night · 30
//!          + SD_ratio_night · 20
//!          + k_age · (SDNN_night / SDNN_baseline) · 10
//! ```
//!
//! The baseline pools every heart-rate sample of the baseline nights, in
//! time order, into one series. There is no upper bound on the score; a
//! night matching the baseline for a 40-year-old man lands around 50 plus
//! the spectral and Poincaré terms.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CalculationError;
use crate::hrv::{HrvAnalyzer, HrvSummary, TimeDomain};
use crate::models::{Gender, HeartRateSample, NightRecord};

const RMSSD_WEIGHT: f64 = 40.0;
const HF_LF_WEIGHT: f64 = 30.0;
const SD_RATIO_WEIGHT: f64 = 20.0;
const SDNN_WEIGHT: f64 = 10.0;

const FEMALE_FACTOR: f64 = 1.12;
const AGE_PIVOT_YEARS: f64 = 40.0;

/// Per-term contributions to the recovery index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryBreakdown {
    pub rmssd_component: f64,
    pub hf_lf_component: f64,
    pub sd_ratio_component: f64,
    pub sdnn_component: f64,
}

impl RecoveryBreakdown {
    pub fn total(&self) -> f64 {
        self.rmssd_component + self.hf_lf_component + self.sd_ratio_component + self.sdnn_component
    }
}

/// Compares a night's HRV with a baseline window
#[derive(Debug, Clone, Default)]
pub struct RecoveryIndexEstimator {
    hrv: HrvAnalyzer,
}

impl RecoveryIndexEstimator {
    pub fn new(hrv: HrvAnalyzer) -> Self {
        RecoveryIndexEstimator { hrv }
    }

    /// Recovery index of the latest night in `window_nights`
    ///
    /// Nights of other users are ignored.
    pub fn estimate(
        &self,
        user: &str,
        age_months: u32,
        gender: Gender,
        window_nights: &[NightRecord],
        baseline_nights: &[NightRecord],
    ) -> Result<f64, CalculationError> {
        self.breakdown(user, age_months, gender, window_nights, baseline_nights)
            .map(|b| b.total())
    }

    pub fn breakdown(
        &self,
        user: &str,
        age_months: u32,
        gender: Gender,
        window_nights: &[NightRecord],
        baseline_nights: &[NightRecord],
    ) -> Result<RecoveryBreakdown, CalculationError> {
        let latest = window_nights
            .iter()
            .filter(|n| n.user_id == user)
            .max_by_key(|n| n.sleep_date_time)
            .ok_or_else(|| CalculationError::insufficient("recovery index", "no nights in window"))?;

        let night_bpm = latest.bpm_series();
        require_samples(night_bpm.len(), "night")?;
        let night = self.hrv.analyze(&night_bpm)?;

        let baseline_bpm = pooled_bpm(user, baseline_nights);
        require_samples(baseline_bpm.len(), "baseline")?;
        let baseline = HrvAnalyzer::time_domain(&HrvAnalyzer::rr_intervals(&baseline_bpm)?)?;

        if baseline.rmssd <= 0.0 || baseline.sdnn <= 0.0 {
            return Err(CalculationError::insufficient(
                "recovery index",
                "baseline has no heart-rate variability",
            ));
        }

        debug!(
            user,
            night = %latest.sleep_date_time,
            night_samples = night_bpm.len(),
            baseline_samples = baseline_bpm.len(),
            "computing recovery index"
        );

        Ok(combine(&night, &baseline, age_months, gender))
    }
}

fn combine(
    night: &HrvSummary,
    baseline: &TimeDomain,
    age_months: u32,
    gender: Gender,
) -> RecoveryBreakdown {
    let k_gender = match gender {
        Gender::Male => 1.0,
        Gender::Female => FEMALE_FACTOR,
    };
    let age_years = age_months as f64 / 12.0;
    let k_age = 1.0 + (AGE_PIVOT_YEARS - age_years) / 100.0;

    RecoveryBreakdown {
        rmssd_component: k_age * k_gender * (night.time_domain.rmssd / baseline.rmssd) * RMSSD_WEIGHT,
        hf_lf_component: night.frequency_domain.hf_lf_ratio * HF_LF_WEIGHT,
        sd_ratio_component: night.nonlinear.sd_ratio * SD_RATIO_WEIGHT,
        sdnn_component: k_age * (night.time_domain.sdnn / baseline.sdnn) * SDNN_WEIGHT,
    }
}

/// All of a user's baseline samples, oldest first
fn pooled_bpm(user: &str, nights: &[NightRecord]) -> Vec<u16> {
    let mut samples: Vec<&HeartRateSample> = nights
        .iter()
        .filter(|n| n.user_id == user)
        .flat_map(|n| n.heart_rate.iter())
        .collect();
    samples.sort_by_key(|s| s.time);
    samples.into_iter().map(|s| s.bpm).collect()
}

fn require_samples(count: usize, set: &str) -> Result<(), CalculationError> {
    if count < 2 {
        return Err(CalculationError::insufficient(
            "recovery index",
            format!("{set} has {count} heart-rate samples, need at least 2"),
        ));
    }
    Ok(())
}
