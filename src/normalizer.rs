//! Bedtime and wake-time normalization
//!
//! A night carries two competing readings for each boundary of the sleep
//! window: the device's and the user's. The device reading wins only when it
//! widens the window (an earlier bedtime or a later wake time); otherwise the
//! user's value stands.

use chrono::NaiveDateTime;

use crate::error::CalculationError;
use crate::models::NightRecord;

/// Resolves the authoritative sleep window of a night
pub struct TimeNormalizer;

impl TimeNormalizer {
    /// Earlier of the device and user bedtimes
    pub fn resolve_bedtime(night: &NightRecord) -> Result<NaiveDateTime, CalculationError> {
        let device = night
            .device_bedtime
            .ok_or_else(|| CalculationError::missing_timestamp("device bedtime"))?;
        let user = night
            .user_bedtime
            .ok_or_else(|| CalculationError::missing_timestamp("user bedtime"))?;

        Ok(if device <= user { device } else { user })
    }

    /// Later of the device and user wake times
    pub fn resolve_waketime(night: &NightRecord) -> Result<NaiveDateTime, CalculationError> {
        let device = night
            .device_wake_time
            .ok_or_else(|| CalculationError::missing_timestamp("device wake time"))?;
        let user = night
            .user_wake_time
            .ok_or_else(|| CalculationError::missing_timestamp("user wake time"))?;

        Ok(if device >= user { device } else { user })
    }

    /// Both boundaries at once
    pub fn resolve_window(
        night: &NightRecord,
    ) -> Result<(NaiveDateTime, NaiveDateTime), CalculationError> {
        Ok((Self::resolve_bedtime(night)?, Self::resolve_waketime(night)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn night() -> NightRecord {
        NightRecord::new("u1", at(4, 22, 0))
    }

    #[test]
    fn test_earlier_bedtime_wins() {
        let mut n = night();
        n.device_bedtime = Some(at(4, 10, 0));
        n.user_bedtime = Some(at(4, 10, 15));
        assert_eq!(TimeNormalizer::resolve_bedtime(&n).unwrap(), at(4, 10, 0));

        n.device_bedtime = Some(at(4, 10, 30));
        assert_eq!(TimeNormalizer::resolve_bedtime(&n).unwrap(), at(4, 10, 15));
    }

    #[test]
    fn test_later_waketime_wins() {
        let mut n = night();
        n.device_wake_time = Some(at(5, 6, 0));
        n.user_wake_time = Some(at(5, 5, 45));
        assert_eq!(TimeNormalizer::resolve_waketime(&n).unwrap(), at(5, 6, 0));

        n.user_wake_time = Some(at(5, 6, 20));
        assert_eq!(TimeNormalizer::resolve_waketime(&n).unwrap(), at(5, 6, 20));
    }

    #[test]
    fn test_missing_timestamp() {
        let mut n = night();
        n.device_bedtime = Some(at(4, 23, 0));

        let err = TimeNormalizer::resolve_bedtime(&n).unwrap_err();
        assert_eq!(err, CalculationError::missing_timestamp("user bedtime"));

        assert!(matches!(
            TimeNormalizer::resolve_waketime(&n),
            Err(CalculationError::MissingTimestamp { .. })
        ));
        assert!(TimeNormalizer::resolve_window(&n).is_err());
    }
}
