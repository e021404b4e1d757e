//! Unified error hierarchy for SleepRS
//!
//! Provides a layered error type system: calculation errors raised by the
//! sleep and HRV estimators, wrapped by a top-level error that also covers
//! lookups, configuration and I/O at the collaborator boundary.

use thiserror::Error;

/// Top-level error type for all SleepRS operations
#[derive(Debug, Error)]
pub enum SleepRsError {
    /// Calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested user or night does not exist in the data source
    #[error("Not found: {entity} {key}")]
    NotFound { entity: String, key: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Calculation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculationError {
    /// A bed or wake timestamp needed for normalization is absent
    #[error("Missing timestamp: {field}")]
    MissingTimestamp { field: String },

    /// Insufficient data for calculation
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Non-positive heart-rate sample
    #[error("Invalid heart-rate sample at index {index}: {bpm} bpm")]
    InvalidSample { index: usize, bpm: u16 },
}

impl CalculationError {
    pub fn missing_timestamp(field: impl Into<String>) -> Self {
        CalculationError::MissingTimestamp {
            field: field.into(),
        }
    }

    pub fn insufficient(calculation: impl Into<String>, reason: impl Into<String>) -> Self {
        CalculationError::InsufficientData {
            calculation: calculation.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for SleepRS operations
pub type Result<T> = std::result::Result<T, SleepRsError>;

impl SleepRsError {
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        SleepRsError::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Insufficient data may resolve itself once more nights are imported.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SleepRsError::Calculation(CalculationError::InsufficientData { .. })
                | SleepRsError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SleepRsError::Calculation(CalculationError::InsufficientData { .. }) => {
                ErrorSeverity::Warning
            }
            SleepRsError::Calculation(CalculationError::MissingTimestamp { .. }) => {
                ErrorSeverity::Warning
            }
            SleepRsError::NotFound { .. } => ErrorSeverity::Warning,
            SleepRsError::Validation(_) => ErrorSeverity::Warning,
            SleepRsError::Calculation(CalculationError::InvalidSample { .. }) => {
                ErrorSeverity::Error
            }
            SleepRsError::Io(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SleepRsError::Calculation(CalculationError::InsufficientData {
                calculation, ..
            }) => {
                format!(
                    "Not enough data to calculate {}. Please record more nights with heart-rate data.",
                    calculation
                )
            }
            SleepRsError::Calculation(CalculationError::MissingTimestamp { field }) => {
                format!("The night is missing its {} time.", field)
            }
            SleepRsError::NotFound { entity, key } => {
                format!("No {} found for {}", entity, key)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
