pub mod cli;
pub mod config;
pub mod report;

use anyhow::{anyhow, Context, Result};
use pflow_algo::{Application, PowerFlow};
use pflow_core::CaseData;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use crate::cli::{Cli, ReportFormat};
use crate::config::RunConfig;
use crate::report::RunReport;

/// Loads the case, solves it, applies the scenario edits, solves again and
/// renders the report. Divergence of either solve is an error.
pub fn run(cli: &Cli) -> Result<String> {
    configure_threads(&cli.threads)?;
    let (config, scenario) = RunConfig::resolve(cli)?;
    let case = match &config.netfile {
        Some(path) => CaseData::from_path(path)
            .with_context(|| format!("loading network {}", path.display()))?,
        None => CaseData::builtin_case9()?,
    };
    let case_name = case.name.clone();

    let mut pf = PowerFlow::from_case(case, config.engine.clone())?;
    pf.set_application(Application::AcPowerFlow);
    pf.setup()?;
    pf.solve()?.into_result().context("base case")?;
    let base = pf.post_solve()?.clone();
    info!(case = %case_name, "base case solved");

    let mut edits = Vec::new();
    let scenario_solution = if scenario.is_empty() {
        None
    } else {
        for line in &scenario.trip_lines {
            pf.set_line_status(line.from, line.to, "tripped", &line.circuit)
                .with_context(|| format!("tripping line {line}"))?;
            edits.push(format!("trip {line}"));
        }
        for unit in &scenario.gen_off {
            pf.set_gen_status(unit.bus, "off", &unit.circuit)
                .with_context(|| format!("switching off generator {unit}"))?;
            edits.push(format!("gen off {unit}"));
        }
        pf.solve()?.into_result().context("after edits")?;
        Some(pf.post_solve()?.clone())
    };

    let diagnostics = pf
        .shared()
        .with(|t| t.connectivity().map(|r| r.diagnostics.clone()))??;
    pf.destroy()?;

    let report = RunReport {
        case: case_name,
        base,
        edits,
        scenario: scenario_solution,
        diagnostics,
    };
    match cli.format {
        ReportFormat::Table => report.to_table(),
        ReportFormat::Json => report.to_json(),
    }
}

/// Resolves a `--threads` hint: `auto` means one worker per logical CPU.
pub fn thread_count(hint: &str) -> Result<usize> {
    if hint.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    match hint.parse::<usize>() {
        Ok(0) | Err(_) => Err(anyhow!(
            "invalid thread count '{hint}'; expected 'auto' or a positive integer"
        )),
        Ok(count) => Ok(count),
    }
}

/// Sizes the global rayon pool used for partition assembly. A pool that is
/// already installed is kept.
fn configure_threads(hint: &str) -> Result<()> {
    let count = thread_count(hint)?;
    match ThreadPoolBuilder::new().num_threads(count).build_global() {
        Ok(()) => info!(threads = count, "rayon pool configured"),
        Err(err) => warn!(threads = count, "keeping existing rayon pool: {err}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_hint_accepts_auto_and_positive_counts() {
        assert_eq!(thread_count("auto").unwrap(), num_cpus::get());
        assert_eq!(thread_count("AUTO").unwrap(), num_cpus::get());
        assert_eq!(thread_count("3").unwrap(), 3);
    }

    #[test]
    fn thread_hint_rejects_zero_and_garbage() {
        assert!(thread_count("0").is_err());
        assert!(thread_count("many").is_err());
    }
}
