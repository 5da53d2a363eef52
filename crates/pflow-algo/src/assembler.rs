//! Power-balance residuals and the analytic sparse Jacobian.
//!
//! For every owned, energized bus `i`:
//!
//! ```text
//! F_P(i) = Vm²·gs + Σ Pd(on) − Σ Pg(on) + Σ_lines P_out(i)
//! F_Q(i) = −Vm²·bs + Σ Qd(on) − Σ Qg(on) + Σ_lines Q_out(i)
//! ```
//!
//! where `P_out`/`Q_out` is the flow leaving `i` into each active incident
//! line, evaluated from `i`'s own end. The P row exists for non-reference
//! buses and the Q row for PQ buses, numbered like the unknowns. A tie-line
//! is evaluated once on each side, each side filling only its own rows, so
//! the assembled system equals the unpartitioned one.
//!
//! Partitions assemble independently (in parallel with the `parallel`
//! feature) and their row blocks / triplets are merged.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use pflow_core::{
    BusId, LineId, NetworkTopology, Partition, PartitionLayout, PflowError, PflowResult,
    VariableNumbering,
};
use sprs::{CsMat, TriMat};

use crate::admittance::{end_flow, LineAdmittance};
use crate::halo::{HaloStates, LocalState};
use crate::newton::NonlinearProblem;

type Triplet = (usize, usize, f64);

/// Full P/Q mismatch of one bus, including rows that are not unknowns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusMismatch {
    pub bus: BusId,
    pub p: f64,
    pub q: f64,
}

pub struct EquationAssembler<'a> {
    topology: &'a NetworkTopology,
    layout: &'a PartitionLayout,
    numbering: &'a VariableNumbering,
    admittances: Vec<LineAdmittance>,
}

impl<'a> EquationAssembler<'a> {
    /// Fails with `InvalidState` if the topology is not finalized or its
    /// connectivity is stale.
    pub fn new(topology: &'a NetworkTopology) -> PflowResult<Self> {
        let numbering = topology.numbering()?;
        let layout = topology.layout()?;
        let admittances = topology
            .lines()
            .iter()
            .map(LineAdmittance::from_line)
            .collect();
        Ok(Self {
            topology,
            layout,
            numbering,
            admittances,
        })
    }

    pub fn dimension(&self) -> usize {
        self.numbering.total()
    }

    pub fn layout(&self) -> &'a PartitionLayout {
        self.layout
    }

    pub fn numbering(&self) -> &'a VariableNumbering {
        self.numbering
    }

    pub fn admittance(&self, line: LineId) -> Option<&LineAdmittance> {
        self.admittances.get(line.value())
    }

    /// Halo state initialized from `voltage(pos) -> (vm, va)`, ghosts included.
    pub fn halo(&self, voltage: impl Fn(usize) -> (f64, f64)) -> HaloStates {
        HaloStates::new(self.layout, voltage)
    }

    pub fn residual(&self, halo: &HaloStates) -> Vec<f64> {
        let blocks: Vec<Vec<f64>> = self.map_partitions(halo, |part, state| {
            let range = self.numbering.partition_range(part.id);
            let mut block = vec![0.0; range.len()];
            for &pos in part.owned() {
                if !self.topology.bus_at(pos).energized {
                    continue;
                }
                let (p, q) = self.bus_balance(part, state, pos, None);
                let vars = self.numbering.bus(pos);
                if let Some(i) = vars.angle {
                    block[i - range.start] = p;
                }
                if let Some(i) = vars.magnitude {
                    block[i - range.start] = q;
                }
            }
            block
        });
        blocks.concat()
    }

    pub fn jacobian(&self, halo: &HaloStates) -> CsMat<f64> {
        let blocks: Vec<Vec<Triplet>> = self.map_partitions(halo, |part, state| {
            let mut triplets = Vec::new();
            for &pos in part.owned() {
                if self.topology.bus_at(pos).energized {
                    self.bus_balance(part, state, pos, Some(&mut triplets));
                }
            }
            triplets
        });

        let n = self.dimension();
        let nnz = blocks.iter().map(Vec::len).sum();
        let mut matrix = TriMat::with_capacity((n, n), nnz);
        for (row, col, value) in blocks.into_iter().flatten() {
            matrix.add_triplet(row, col, value);
        }
        matrix.to_csr()
    }

    /// P/Q mismatch of every energized bus, in bus id order.
    pub fn mismatches(&self, halo: &HaloStates) -> Vec<BusMismatch> {
        let blocks: Vec<Vec<BusMismatch>> = self.map_partitions(halo, |part, state| {
            part.owned()
                .iter()
                .filter(|&&pos| self.topology.bus_at(pos).energized)
                .map(|&pos| {
                    let (p, q) = self.bus_balance(part, state, pos, None);
                    BusMismatch {
                        bus: self.topology.bus_at(pos).id,
                        p,
                        q,
                    }
                })
                .collect()
        });
        let mut all: Vec<BusMismatch> = blocks.into_iter().flatten().collect();
        all.sort_by_key(|m| m.bus);
        all
    }

    fn map_partitions<T, F>(&self, halo: &HaloStates, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&Partition, &LocalState) -> T + Sync + Send,
    {
        let parts = self.layout.parts();
        let states = halo.states();
        #[cfg(feature = "parallel")]
        {
            parts
                .par_iter()
                .zip(states.par_iter())
                .map(|(part, state)| f(part, state))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            parts
                .iter()
                .zip(states.iter())
                .map(|(part, state)| f(part, state))
                .collect()
        }
    }

    /// Mismatch of the bus at `pos`; pushes its Jacobian rows when asked.
    fn bus_balance(
        &self,
        part: &Partition,
        state: &LocalState,
        pos: usize,
        mut jacobian: Option<&mut Vec<Triplet>>,
    ) -> (f64, f64) {
        let topology = self.topology;
        let bus = topology.bus_at(pos);
        let Some(slot) = part.slot(pos) else {
            return (0.0, 0.0);
        };
        let (vm, va) = (state.vm[slot], state.va[slot]);
        let own = self.numbering.bus(pos);

        let mut p = vm * vm * bus.gs;
        let mut q = -vm * vm * bus.bs;
        for load in topology.loads_at(pos).iter().filter_map(|&id| topology.load(id).ok()) {
            if load.status.is_on() {
                p += load.pd;
                q += load.qd;
            }
        }
        for unit in topology
            .generators_at(pos)
            .iter()
            .filter_map(|&id| topology.generator(id).ok())
        {
            if unit.status.is_on() {
                p -= unit.pg;
                q -= unit.qg;
            }
        }

        // dP/dθ, dP/dV, dQ/dθ, dQ/dV of the bus's own variables
        let mut own_p = [0.0, 2.0 * vm * bus.gs];
        let mut own_q = [0.0, -2.0 * vm * bus.bs];

        for &line_id in topology.incident_at(pos) {
            let Ok(line) = topology.line(line_id) else {
                continue;
            };
            if !line.status.is_active() {
                continue;
            }
            let Some(other) = topology.position(line.other_end(bus.id)) else {
                continue;
            };
            let far = topology.bus_at(other);
            if !far.active || !far.energized {
                continue;
            }
            let Some(other_slot) = part.slot(other) else {
                continue;
            };
            let (y_self, y_mutual) = self.admittances[line_id.value()].at(line, bus.id);
            let flow = end_flow(
                y_self,
                y_mutual,
                vm,
                va,
                state.vm[other_slot],
                state.va[other_slot],
            );
            p += flow.p;
            q += flow.q;

            if let Some(triplets) = jacobian.as_deref_mut() {
                own_p[0] += flow.dp[0];
                own_p[1] += flow.dp[1];
                own_q[0] += flow.dq[0];
                own_q[1] += flow.dq[1];
                let far_vars = self.numbering.bus(other);
                push_row(triplets, own.angle, far_vars.angle, flow.dp[2]);
                push_row(triplets, own.angle, far_vars.magnitude, flow.dp[3]);
                push_row(triplets, own.magnitude, far_vars.angle, flow.dq[2]);
                push_row(triplets, own.magnitude, far_vars.magnitude, flow.dq[3]);
            }
        }

        if let Some(triplets) = jacobian {
            push_row(triplets, own.angle, own.angle, own_p[0]);
            push_row(triplets, own.angle, own.magnitude, own_p[1]);
            push_row(triplets, own.magnitude, own.angle, own_q[0]);
            push_row(triplets, own.magnitude, own.magnitude, own_q[1]);
        }

        (p, q)
    }
}

fn push_row(triplets: &mut Vec<Triplet>, row: Option<usize>, col: Option<usize>, value: f64) {
    if let (Some(r), Some(c)) = (row, col) {
        triplets.push((r, c, value));
    }
}

/// The power-flow equations bound to a halo state, as seen by the Newton
/// solver: every evaluation scatters `x`, refreshes ghosts, then assembles.
pub struct PowerFlowProblem<'a> {
    assembler: EquationAssembler<'a>,
    halo: HaloStates,
}

impl<'a> PowerFlowProblem<'a> {
    pub fn new(assembler: EquationAssembler<'a>, halo: HaloStates) -> Self {
        Self { assembler, halo }
    }

    /// Initial Newton vector read from the owned slots.
    pub fn initial_guess(&self) -> Vec<f64> {
        self.halo
            .gather(self.assembler.layout(), self.assembler.numbering())
    }

    pub fn assembler(&self) -> &EquationAssembler<'a> {
        &self.assembler
    }

    pub fn halo(&self) -> &HaloStates {
        &self.halo
    }

    pub fn into_halo(self) -> HaloStates {
        self.halo
    }

    fn load(&mut self, x: &[f64]) -> PflowResult<()> {
        let n = self.assembler.dimension();
        if x.len() != n {
            return Err(PflowError::invalid_state(format!(
                "state vector has {} entries, expected {n}",
                x.len()
            )));
        }
        let layout = self.assembler.layout();
        self.halo.scatter(layout, self.assembler.numbering(), x);
        self.halo.exchange(layout);
        Ok(())
    }
}

impl NonlinearProblem for PowerFlowProblem<'_> {
    fn dimension(&self) -> usize {
        self.assembler.dimension()
    }

    fn residual(&mut self, x: &[f64]) -> PflowResult<Vec<f64>> {
        self.load(x)?;
        Ok(self.assembler.residual(&self.halo))
    }

    fn jacobian(&mut self, x: &[f64]) -> PflowResult<CsMat<f64>> {
        self.load(x)?;
        Ok(self.assembler.jacobian(&self.halo))
    }
}
