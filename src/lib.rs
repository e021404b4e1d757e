// Library interface for SleepRS modules
// This allows integration tests and benchmarks to access the core functionality

pub mod analyzer;
pub mod chronotype;
pub mod config;
pub mod cycles;
pub mod error;
pub mod hrv;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod recovery;
pub mod regularity;

// Re-export commonly used types for convenience
pub use models::*;
pub use analyzer::{InMemoryNightStore, NightSource, SleepAnalyzer, SleepDataset};
pub use chronotype::{Chronotype, ChronotypeEstimator, ChronotypeResult, ChronotypeThresholds};
pub use config::{AnalysisSettings, AppConfig};
pub use cycles::CycleCounter;
pub use hrv::{HrvAnalyzer, HrvSettings, HrvSummary};
pub use metrics::{MetricsEngine, NightMetrics, PhasePercentages, SleepNeed};
pub use normalizer::TimeNormalizer;
pub use recovery::{RecoveryBreakdown, RecoveryIndexEstimator};
pub use regularity::{RegularityEstimator, RegularityResult};
pub use error::{CalculationError, Result, SleepRsError};
pub use logging::{LogConfig, LogFormat, LogLevel};
