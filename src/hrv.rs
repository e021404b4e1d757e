//! Heart Rate Variability (HRV) analysis
//!
//! Converts heart-rate samples into RR intervals and derives the standard
//! HRV statistics used by the recovery index:
//!
//! - **Time domain**: SDNN (spread of RR intervals), RMSSD (root mean square of
//!   successive differences) and pNN50 (share of successive differences above
//!   50 ms). RMSSD tracks parasympathetic activity and is the most common
//!   single HRV number reported by wearables.
//!
//! - **Frequency domain**: power in the low-frequency (0.04-0.15 Hz) and
//!   high-frequency (0.15-0.40 Hz) bands, estimated with Welch's method on an
//!   evenly resampled RR series. HF power reflects respiratory vagal
//!   modulation, LF mixes sympathetic and parasympathetic input.
//!
//! - **Nonlinear**: Poincaré SD1 (short-term, beat-to-beat dispersion) and
//!   SD2 (long-term dispersion) of the lag-1 RR scatter plot.
//!
//! Every statistic needs at least two RR intervals.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::f64::consts::PI;

use crate::error::CalculationError;

/// Successive RR differences above this many milliseconds count toward pNN50
const NN50_THRESHOLD_MS: f64 = 50.0;

/// Frequency-domain estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvSettings {
    /// Rate the RR series is resampled at before spectral estimation (Hz)
    pub resample_hz: f64,

    /// Maximum Welch segment length in resampled points
    pub welch_segment_len: usize,

    /// Low-frequency band edges (Hz)
    pub lf_band: (f64, f64),

    /// High-frequency band edges (Hz)
    pub hf_band: (f64, f64),
}

impl Default for HrvSettings {
    fn default() -> Self {
        HrvSettings {
            resample_hz: 4.0,
            welch_segment_len: 256,
            lf_band: (0.04, 0.15),
            hf_band: (0.15, 0.40),
        }
    }
}

/// Time-domain HRV statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDomain {
    /// Mean RR interval (ms)
    pub mean_rr: f64,
    /// Population standard deviation of RR intervals (ms)
    pub sdnn: f64,
    /// Root mean square of successive differences (ms)
    pub rmssd: f64,
    /// Fraction of successive differences above 50 ms (0-1)
    pub pnn50: f64,
}

/// Frequency-domain HRV statistics, band powers in ms²
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDomain {
    pub lf: f64,
    pub hf: f64,
    /// HF / max(LF, 1)
    pub hf_lf_ratio: f64,
}

/// Poincaré plot dispersion measures (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nonlinear {
    pub sd1: f64,
    pub sd2: f64,
    /// SD2 / SD1, 0 when SD1 is 0
    pub sd_ratio: f64,
}

/// All HRV statistics for one sample set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    pub time_domain: TimeDomain,
    pub frequency_domain: FrequencyDomain,
    pub nonlinear: Nonlinear,
}

/// HRV statistics calculator
#[derive(Debug, Clone, Default)]
pub struct HrvAnalyzer {
    settings: HrvSettings,
}

impl HrvAnalyzer {
    pub fn new(settings: HrvSettings) -> Self {
        HrvAnalyzer { settings }
    }

    pub fn settings(&self) -> &HrvSettings {
        &self.settings
    }

    /// Convert beats per minute to RR intervals in milliseconds
    pub fn rr_intervals(bpm: &[u16]) -> Result<Vec<f64>, CalculationError> {
        bpm.iter()
            .enumerate()
            .map(|(index, &value)| {
                if value == 0 {
                    Err(CalculationError::InvalidSample { index, bpm: value })
                } else {
                    Ok(60_000.0 / value as f64)
                }
            })
            .collect()
    }

    /// SDNN, RMSSD and pNN50
    pub fn time_domain(rr: &[f64]) -> Result<TimeDomain, CalculationError> {
        ensure_enough(rr, "time-domain HRV")?;

        let diffs = successive_differences(rr);
        let rmssd = diffs.iter().map(|d| d * d).mean().sqrt();
        let nn50 = diffs.iter().filter(|d| d.abs() > NN50_THRESHOLD_MS).count();

        Ok(TimeDomain {
            mean_rr: rr.iter().mean(),
            sdnn: rr.iter().population_std_dev(),
            rmssd,
            pnn50: nn50 as f64 / diffs.len() as f64,
        })
    }

    /// LF and HF band power via Welch's method
    pub fn frequency_domain(&self, rr: &[f64]) -> Result<FrequencyDomain, CalculationError> {
        ensure_enough(rr, "frequency-domain HRV")?;

        let rr_seconds: Vec<f64> = rr.iter().map(|v| v / 1000.0).collect();
        let resampled = resample(&rr_seconds, self.settings.resample_hz);

        let (lf, hf) = if resampled.len() < 2 {
            (0.0, 0.0)
        } else {
            let (freqs, psd) = welch_psd(
                &resampled,
                self.settings.resample_hz,
                self.settings.welch_segment_len,
            );
            // s² -> ms²
            (
                band_power(&freqs, &psd, self.settings.lf_band) * 1e6,
                band_power(&freqs, &psd, self.settings.hf_band) * 1e6,
            )
        };

        Ok(FrequencyDomain {
            lf,
            hf,
            hf_lf_ratio: hf / lf.max(1.0),
        })
    }

    /// Poincaré SD1, SD2 and their ratio
    pub fn nonlinear(rr: &[f64]) -> Result<Nonlinear, CalculationError> {
        ensure_enough(rr, "nonlinear HRV")?;

        let diffs = successive_differences(rr);
        let sums: Vec<f64> = rr.windows(2).map(|w| w[1] + w[0]).collect();

        let sd1 = diffs.iter().population_std_dev() / 2f64.sqrt();
        let sd2 = sums.iter().population_std_dev() / 2f64.sqrt();
        let sd_ratio = if sd1 > 0.0 { sd2 / sd1 } else { 0.0 };

        Ok(Nonlinear { sd1, sd2, sd_ratio })
    }

    /// Full analysis of a heart-rate series
    pub fn analyze(&self, bpm: &[u16]) -> Result<HrvSummary, CalculationError> {
        let rr = Self::rr_intervals(bpm)?;
        Ok(HrvSummary {
            time_domain: Self::time_domain(&rr)?,
            frequency_domain: self.frequency_domain(&rr)?,
            nonlinear: Self::nonlinear(&rr)?,
        })
    }
}

fn ensure_enough(rr: &[f64], calculation: &str) -> Result<(), CalculationError> {
    if rr.len() < 2 {
        return Err(CalculationError::insufficient(
            calculation,
            format!("need at least 2 RR intervals, got {}", rr.len()),
        ));
    }
    Ok(())
}

fn successive_differences(rr: &[f64]) -> Vec<f64> {
    rr.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Linearly interpolate an RR series (seconds) onto an even time grid
///
/// Each interval is placed at the cumulative time of the beats before it.
fn resample(rr_seconds: &[f64], sample_rate: f64) -> Vec<f64> {
    let mut time_points = Vec::with_capacity(rr_seconds.len());
    let mut t = 0.0;
    for &rr in rr_seconds {
        time_points.push(t);
        t += rr;
    }

    let span = time_points.last().copied().unwrap_or(0.0);
    let num_samples = (span * sample_rate).floor() as usize + 1;

    let mut resampled = Vec::with_capacity(num_samples);
    let mut j = 0;
    for i in 0..num_samples {
        let t = i as f64 / sample_rate;
        while j + 1 < time_points.len() - 1 && time_points[j + 1] < t {
            j += 1;
        }
        let (t1, t2) = (time_points[j], time_points[j + 1]);
        let (rr1, rr2) = (rr_seconds[j], rr_seconds[j + 1]);
        let alpha = if t2 > t1 { ((t - t1) / (t2 - t1)).clamp(0.0, 1.0) } else { 0.0 };
        resampled.push(rr1 + alpha * (rr2 - rr1));
    }
    resampled
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// One-sided power spectral density by Welch's method
///
/// Segments overlap by half and are mean-detrended individually.
/// Returns (frequencies, density) in Hz and signal-units²/Hz.
fn welch_psd(signal: &[f64], sample_rate: f64, max_segment_len: usize) -> (Vec<f64>, Vec<f64>) {
    let segment_len = max_segment_len.min(signal.len()).max(2);
    let step = (segment_len / 2).max(1);
    let window = hann_window(segment_len);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * window_power);

    let bins = segment_len / 2 + 1;
    let mut psd = vec![0.0; bins];

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(segment_len);

    let mut segments = 0usize;
    let mut start = 0;
    while start + segment_len <= signal.len() {
        let segment = &signal[start..start + segment_len];
        let mean = segment.iter().mean();

        let mut buffer: Vec<Complex<f64>> = segment
            .iter()
            .zip(&window)
            .map(|(x, w)| Complex::new((x - mean) * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        for (k, value) in psd.iter_mut().enumerate() {
            *value += buffer[k].norm_sqr() * scale;
        }

        segments += 1;
        start += step;
    }

    if segments > 0 {
        for value in psd.iter_mut() {
            *value /= segments as f64;
        }
    }

    // Fold negative frequencies; DC and (even-length) Nyquist appear once
    let last_doubled = if segment_len % 2 == 0 { bins - 1 } else { bins };
    for value in psd.iter_mut().take(last_doubled).skip(1) {
        *value *= 2.0;
    }

    let resolution = sample_rate / segment_len as f64;
    let freqs = (0..bins).map(|k| k as f64 * resolution).collect();
    (freqs, psd)
}

/// Integrate density over [low, high) with the rectangle rule
fn band_power(freqs: &[f64], psd: &[f64], (low, high): (f64, f64)) -> f64 {
    if freqs.len() < 2 {
        return 0.0;
    }
    let df = freqs[1] - freqs[0];
    freqs
        .iter()
        .zip(psd)
        .filter(|(f, _)| **f >= low && **f < high)
        .map(|(_, p)| p * df)
        .sum()
}
