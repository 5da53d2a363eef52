//! Run configuration: a TOML file with engine options and scenario edits,
//! overridden field by field from the command line.
//!
//! ```toml
//! netfile = "cases/case9.json"
//!
//! [engine]
//! partitions = 3
//! linear_solver = "dense-lu"
//!
//! [engine.newton]
//! tolerance = 1e-8
//!
//! [scenario]
//! trip_lines = ["8-9", "4-6"]
//! gen_off = ["3"]
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use pflow_algo::{EngineOptions, LinearSolverKind, StartMode};
use pflow_core::BusId;
use serde::Deserialize;

use crate::cli::Cli;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub netfile: Option<PathBuf>,
    pub engine: EngineOptions,
    pub scenario: ScenarioConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub trip_lines: Vec<String>,
    pub gen_off: Vec<String>,
}

/// Scenario edits after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scenario {
    pub trip_lines: Vec<LineEdit>,
    pub gen_off: Vec<GenEdit>,
}

impl Scenario {
    pub fn is_empty(&self) -> bool {
        self.trip_lines.is_empty() && self.gen_off.is_empty()
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Config file (if any) with command-line overrides applied.
    pub fn resolve(cli: &Cli) -> Result<(Self, Scenario)> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(netfile) = &cli.netfile {
            config.netfile = Some(netfile.clone());
        }
        let engine = &mut config.engine;
        if let Some(partitions) = cli.partitions {
            engine.partitions = partitions;
        }
        if let Some(tolerance) = cli.tolerance {
            engine.newton.tolerance = tolerance;
        }
        if let Some(max_iterations) = cli.max_iterations {
            engine.newton.max_iterations = max_iterations;
        }
        if let Some(name) = &cli.linear_solver {
            engine.linear_solver = LinearSolverKind::from_str(name)?;
        }
        if cli.flat_start {
            engine.start = StartMode::Flat;
        }

        let mut scenario = Scenario::default();
        for entry in &config.scenario.trip_lines {
            scenario
                .trip_lines
                .push(entry.parse().map_err(anyhow::Error::msg)?);
        }
        for entry in &config.scenario.gen_off {
            scenario.gen_off.push(entry.parse().map_err(anyhow::Error::msg)?);
        }
        scenario.trip_lines.extend(cli.trip_lines.iter().cloned());
        scenario.gen_off.extend(cli.gen_off.iter().cloned());
        Ok((config, scenario))
    }
}

/// `FROM-TO` or `FROM-TO:CKT`; the circuit defaults to "1".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub from: BusId,
    pub to: BusId,
    pub circuit: String,
}

impl FromStr for LineEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ends, circuit) = split_circuit(s);
        let (from, to) = ends
            .split_once('-')
            .ok_or_else(|| format!("invalid line '{s}', expected FROM-TO[:CKT]"))?;
        Ok(Self {
            from: parse_bus(from, s)?,
            to: parse_bus(to, s)?,
            circuit,
        })
    }
}

impl fmt::Display for LineEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}", self.from, self.to, self.circuit)
    }
}

/// `BUS` or `BUS:CKT`; the circuit defaults to "1".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenEdit {
    pub bus: BusId,
    pub circuit: String,
}

impl FromStr for GenEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bus, circuit) = split_circuit(s);
        Ok(Self {
            bus: parse_bus(bus, s)?,
            circuit,
        })
    }
}

impl fmt::Display for GenEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bus, self.circuit)
    }
}

fn split_circuit(s: &str) -> (&str, String) {
    match s.trim().split_once(':') {
        Some((head, ckt)) if !ckt.trim().is_empty() => (head, ckt.trim().to_string()),
        Some((head, _)) => (head, "1".to_string()),
        None => (s.trim(), "1".to_string()),
    }
}

fn parse_bus(token: &str, whole: &str) -> Result<BusId, String> {
    token
        .trim()
        .parse::<usize>()
        .map(BusId::new)
        .map_err(|_| format!("invalid bus id '{}' in '{whole}'", token.trim()))
}
