use std::io::Write;

use anyhow::Result;
use pflow_algo::PowerFlowSolution;
use pflow_core::{Diagnostics, IslandStatus};
use serde::Serialize;
use tabwriter::TabWriter;

/// What one CLI run produced: the base solve and, when edits were given, the
/// solve after them.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub case: String,
    pub base: PowerFlowSolution,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<PowerFlowSolution>,
    pub diagnostics: Diagnostics,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_table(&self) -> Result<String> {
        let mut out = Vec::new();
        writeln!(out, "Case: {}", self.case)?;
        write_solution(&mut out, "Base case", &self.base)?;
        if let Some(scenario) = &self.scenario {
            writeln!(out)?;
            let title = format!("After {}", self.edits.join(", "));
            write_solution(&mut out, &title, scenario)?;
        }
        for issue in &self.diagnostics.issues {
            writeln!(out, "[{:?}] {}: {}", issue.severity, issue.category, issue.message)?;
        }
        Ok(String::from_utf8(out)?)
    }
}

fn write_solution(out: &mut Vec<u8>, title: &str, solution: &PowerFlowSolution) -> Result<()> {
    writeln!(
        out,
        "{title}: {} in {} iterations (residual {:.3e})",
        if solution.converged { "converged" } else { "diverged" },
        solution.iterations,
        solution.residual_norm
    )?;

    let mut tw = TabWriter::new(Vec::new()).padding(2);
    writeln!(tw, "Island\tStatus\tReference\tBuses\tGen MW\tLoad MW\tLoss MW")?;
    for island in &solution.islands {
        let buses: Vec<String> = island.buses.iter().map(ToString::to_string).collect();
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{:.2}\t{:.2}\t{:.2}",
            island.island,
            match island.status {
                IslandStatus::Energized => "energized",
                IslandStatus::BlackedOut => "blacked out",
            },
            island.reference.map_or("-".to_string(), |b| b.to_string()),
            buses.join(" "),
            island.generation_mw,
            island.load_mw,
            island.losses_mw
        )?;
    }
    writeln!(tw)?;
    writeln!(tw, "Bus\tType\tVm (pu)\tVa (deg)\tPg MW\tQg MVAr\tPd MW\tQd MVAr")?;
    for bus in &solution.buses {
        writeln!(
            tw,
            "{}\t{}\t{:.4}\t{:.3}\t{:.2}\t{:.2}\t{:.2}\t{:.2}",
            bus.bus,
            bus.kind.as_str(),
            bus.vm,
            bus.va_deg,
            bus.p_gen_mw,
            bus.q_gen_mvar,
            bus.p_load_mw,
            bus.q_load_mvar
        )?;
    }
    writeln!(tw)?;
    writeln!(tw, "Line\tCkt\tStatus\tPf MW\tQf MVAr\tPt MW\tQt MVAr\tLoss MW\tLoading %")?;
    for line in &solution.lines {
        writeln!(
            tw,
            "{}-{}\t{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.3}\t{}",
            line.from,
            line.to,
            line.circuit,
            if line.status.is_active() { "active" } else { "tripped" },
            line.pf_mw,
            line.qf_mvar,
            line.pt_mw,
            line.qt_mvar,
            line.loss_mw,
            line.loading_pct.map_or("-".to_string(), |p| format!("{p:.1}"))
        )?;
    }
    writeln!(tw)?;
    writeln!(tw, "Gen\tBus\tCkt\tStatus\tPg MW\tQg MVAr")?;
    for unit in &solution.generators {
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{:.2}\t{:.2}{}",
            unit.generator,
            unit.bus,
            unit.circuit,
            if unit.status.is_on() { "on" } else { "off" },
            unit.pg_mw,
            unit.qg_mvar,
            if unit.at_q_limit { " (Q limit)" } else { "" }
        )?;
    }
    out.extend_from_slice(&tw.into_inner()?);
    Ok(())
}
