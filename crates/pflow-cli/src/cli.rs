use clap::{Parser, ValueEnum, ValueHint};
use std::path::PathBuf;

use crate::config::{GenEdit, LineEdit};

#[derive(Parser, Debug)]
#[command(author, version, about = "Distributed AC power flow", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "warn")]
    pub log_level: tracing::Level,

    /// Network file (JSON or TOML case); the built-in 9-bus case if omitted
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub netfile: Option<PathBuf>,

    /// Run configuration (TOML); flags override its fields
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Number of partitions the buses are split across
    #[arg(long)]
    pub partitions: Option<usize>,

    /// Convergence tolerance on the mismatch norm (per-unit)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Maximum number of Newton iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Linear solver backend (sparse-lu, dense-lu)
    #[arg(long)]
    pub linear_solver: Option<String>,

    /// Start from a flat profile instead of the case voltages
    #[arg(long)]
    pub flat_start: bool,

    /// Trip a line after the base solve: FROM-TO or FROM-TO:CKT (repeatable)
    #[arg(long = "trip-line", value_name = "FROM-TO[:CKT]")]
    pub trip_lines: Vec<LineEdit>,

    /// Turn a generator off after the base solve: BUS or BUS:CKT (repeatable)
    #[arg(long = "gen-off", value_name = "BUS[:CKT]")]
    pub gen_off: Vec<GenEdit>,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,

    /// Threading hint (`auto` or integer)
    #[arg(long, default_value = "auto")]
    pub threads: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}
