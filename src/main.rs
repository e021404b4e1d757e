use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use sleeprs::analyzer::{InMemoryNightStore, SleepAnalyzer, SleepDataset};
use sleeprs::config::AppConfig;
use sleeprs::logging::{self, init_logging};
use sleeprs::metrics::{self, NightMetrics};
use sleeprs::{Chronotype, NightSource, SleepRsError};

/// SleepRS - Sleep Analysis CLI
///
/// Computes per-night sleep metrics, sleep cycles, chronotype, sleep
/// regularity and an HRV-based recovery index from a JSON dataset of
/// user profiles and recorded nights.
#[derive(Parser)]
#[command(name = "sleeprs")]
#[command(version)]
#[command(about = "Sleep Analysis CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON dataset with `profiles` and `nights`
    #[arg(short, long, value_name = "FILE", global = true)]
    data: Option<PathBuf>,

    /// Anchor analysis windows at this local time (default: now)
    #[arg(long, value_name = "YYYY-MM-DDTHH:MM:SS", global = true)]
    as_of: Option<NaiveDateTime>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Single-night metrics, or the metrics history of a window
    Metrics {
        #[arg(short, long)]
        user: String,

        /// Canonical sleep date-time of the night
        #[arg(short, long)]
        night: Option<NaiveDateTime>,

        /// History window in days when no night is given
        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// Count completed sleep cycles of a night
    Cycles {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        night: NaiveDateTime,
    },

    /// Estimate chronotype from corrected mid-sleep
    Chronotype {
        #[arg(short, long)]
        user: String,

        /// Window in days (default from config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Bed and wake time variability
    Regularity {
        #[arg(short, long)]
        user: String,

        /// Window in days (default from config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// HRV-based recovery index of the latest night
    Recovery {
        #[arg(short, long)]
        user: String,

        /// Window the scored night is taken from, in days
        #[arg(long)]
        window: Option<u32>,

        /// Baseline window in days
        #[arg(long)]
        baseline: Option<u32>,
    },

    /// Show or initialize the configuration file
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Night")]
    night: String,
    #[tabled(rename = "Latency (min)")]
    latency: f64,
    #[tabled(rename = "Efficiency (%)")]
    efficiency: f64,
    #[tabled(rename = "Deep (%)")]
    deep: String,
    #[tabled(rename = "Light (%)")]
    light: String,
    #[tabled(rename = "REM (%)")]
    rem: String,
    #[tabled(rename = "Awake (%)")]
    awake: String,
    #[tabled(rename = "Awakenings/h")]
    fragmentation: f64,
    #[tabled(rename = "kcal")]
    calories: f64,
}

impl MetricsRow {
    fn new(night: NaiveDateTime, m: &NightMetrics) -> Self {
        MetricsRow {
            night: night.format("%Y-%m-%d %H:%M").to_string(),
            latency: m.latency_minutes,
            efficiency: m.sleep_efficiency_pct,
            deep: format!("{:.1}", m.phase_pct.deep),
            light: format!("{:.1}", m.phase_pct.light),
            rem: format!("{:.1}", m.phase_pct.rem),
            awake: format!("{:.1}", m.phase_pct.awake),
            fragmentation: m.fragmentation_index,
            calories: m.calories_burned,
        }
    }
}

#[derive(Tabled)]
struct RecoveryRow {
    #[tabled(rename = "Component")]
    component: &'static str,
    #[tabled(rename = "Points")]
    points: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let config = if cli.config.is_some() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::load_or_default()
    };

    init_logging(&config.logging.clone().with_verbosity(cli.verbose))?;

    if let Commands::Config { init } = cli.command {
        return run_config(config, &config_path, init);
    }

    let Some(data) = cli.data.as_deref() else {
        bail!("--data <FILE> is required for this command");
    };
    let store = load_store(data)?;

    let mut analyzer = SleepAnalyzer::from_config(store, &config);
    if let Some(as_of) = cli.as_of {
        analyzer = analyzer.with_reference_time(as_of);
    }

    if let Err(e) = run(&analyzer, cli.command) {
        if let Some(error) = e.downcast_ref::<SleepRsError>() {
            logging::log_error(error);
            eprintln!("{} {}", "✗".red().bold(), error.user_message().red());
            std::process::exit(1);
        }
        return Err(e);
    }

    Ok(())
}

fn load_store(path: &Path) -> Result<InMemoryNightStore> {
    let dataset = SleepDataset::from_json_file(path)
        .with_context(|| format!("Failed to load dataset: {}", path.display()))?;

    let invalid = dataset
        .nights
        .iter()
        .filter_map(|n| n.validate().err())
        .inspect(|e| tracing::warn!(error = %e, "night failed validation"))
        .count();
    if invalid > 0 {
        eprintln!(
            "{}",
            format!("{} night(s) failed validation and are analyzed as-is", invalid).yellow()
        );
    }

    Ok(dataset.into_store())
}

fn run(analyzer: &SleepAnalyzer<InMemoryNightStore>, command: Commands) -> Result<()> {
    let settings = analyzer.settings().clone();

    match command {
        Commands::Metrics { user, night, days } => {
            let rows: Vec<MetricsRow> = match night {
                Some(night) => {
                    let m = analyzer.compute_night_metrics(&user, night)?;
                    vec![MetricsRow::new(night, &m)]
                }
                None => analyzer
                    .metrics_history(&user, days)?
                    .iter()
                    .map(|(night, m)| MetricsRow::new(*night, m))
                    .collect(),
            };

            println!("{}", format!("Sleep metrics for {}", user).blue().bold());
            if rows.is_empty() {
                println!("  No nights in the last {} days", days);
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }

            let nights = analyzer
                .source()
                .recent_nights(&user, days, analyzer.as_of())?;
            if let Some(profile) = analyzer.source().profile(&user)? {
                let need = metrics::recommended_sleep_hours(profile.age_months(analyzer.as_of().date()));
                let average = metrics::average_sleep_hours(&nights);
                let verdict = if need.contains(average) {
                    "within".green()
                } else {
                    "outside".yellow()
                };
                println!(
                    "  Average sleep {:.2} h over {} days, {} the recommended {}-{} h",
                    average, days, verdict, need.min_hours, need.max_hours
                );
            }
        }

        Commands::Cycles { user, night } => {
            let cycles = analyzer.count_cycles(&user, night)?;
            println!(
                "{} {}",
                "Completed sleep cycles:".cyan().bold(),
                cycles.to_string().bold()
            );
        }

        Commands::Chronotype { user, days } => {
            let days = days.unwrap_or(settings.chronotype_window_days);
            match analyzer.estimate_chronotype(&user, days)? {
                Some(result) => {
                    let category = match result.category {
                        Chronotype::EarlyType => result.category.to_string().yellow(),
                        Chronotype::Intermediate => result.category.to_string().green(),
                        Chronotype::LateType => result.category.to_string().magenta(),
                    };
                    println!("{} {}", "Chronotype:".cyan().bold(), category.bold());
                    println!(
                        "  Corrected mid-sleep {} from {} nights ({} free days)",
                        result.corrected_mid_sleep.format("%H:%M"),
                        result.nights_used,
                        result.free_days_used
                    );
                    if result.estimated_without_free_days {
                        println!(
                            "{}",
                            "  No weekend nights in the window; this is plain mid-sleep, not corrected for oversleep"
                                .yellow()
                        );
                    }
                }
                None => println!("{}", format!("No usable nights in the last {} days", days).yellow()),
            }
        }

        Commands::Regularity { user, days } => {
            let days = days.unwrap_or(settings.regularity_window_days);
            let result = analyzer.estimate_regularity(&user, days)?;
            println!("{}", "Sleep regularity".cyan().bold());
            println!("  Bedtime spread:   {:>6.2} min", result.bedtime_stddev_minutes);
            println!("  Wake time spread: {:>6.2} min", result.waketime_stddev_minutes);
            println!("  Nights used:      {:>6}", result.nights_used);
        }

        Commands::Recovery {
            user,
            window,
            baseline,
        } => {
            let window = window.unwrap_or(settings.recovery_window_days);
            let baseline = baseline.unwrap_or(settings.recovery_baseline_days);
            let breakdown = analyzer.profile_recovery_breakdown(&user, window, baseline)?;

            println!(
                "{} {}",
                "Recovery index:".green().bold(),
                format!("{:.1}", breakdown.total()).bold()
            );

            let rows = vec![
                RecoveryRow {
                    component: "RMSSD vs baseline",
                    points: format!("{:.1}", breakdown.rmssd_component),
                },
                RecoveryRow {
                    component: "HF/LF balance",
                    points: format!("{:.1}", breakdown.hf_lf_component),
                },
                RecoveryRow {
                    component: "Poincaré SD2/SD1",
                    points: format!("{:.1}", breakdown.sd_ratio_component),
                },
                RecoveryRow {
                    component: "SDNN vs baseline",
                    points: format!("{:.1}", breakdown.sdnn_component),
                },
            ];
            println!("{}", Table::new(rows).with(Style::rounded()));
        }

        Commands::Config { .. } => unreachable!("handled before the dataset is loaded"),
    }

    Ok(())
}

fn run_config(mut config: AppConfig, path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }
        config.save_to_file(path)?;
        println!("{} {}", "✓ Configuration written to".green(), path.display());
        return Ok(());
    }

    println!("{} {}", "Configuration".white().bold(), path.display().to_string().dimmed());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
