//! Power-flow engine: the lifecycle facade over a shared topology.
//!
//! ```text
//! create → set_application(AcPowerFlow) → setup → solve → post_solve
//!                                            ▲                   │
//!                                            └── set_*_status ◀──┘
//! ```
//!
//! Mutations go through the shared topology and mark its connectivity stale;
//! the next `solve` reruns island detection and renumbering, then warm-starts
//! from the voltages of the previous solve.
//!
//! Powers cross this boundary in MW / MVAr and angles in degrees.

use std::sync::Arc;

use pflow_core::units::{Megavars, MegavoltAmperes, Megawatts};
use pflow_core::{
    BusId, BusType, CaseData, GenStatus, LineStatus, LoadStatus, NetworkTopology, PflowError,
    PflowResult, ReferencePolicy, SharedTopology,
};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use tracing::{debug, info, warn};

use crate::assembler::{EquationAssembler, PowerFlowProblem};
use crate::linear::{LinearSolve, LinearSolverKind};
use crate::newton::{NewtonConfig, NewtonOutcome, NewtonSolver, NonlinearProblem};
use crate::post_solve::{self, PowerFlowSolution};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Application {
    #[default]
    None,
    AcPowerFlow,
}

/// Where the Newton iteration starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartMode {
    /// Current bus state; controlled buses take the generator setpoint
    #[default]
    Warm,
    /// 1.0 pu and 0 rad, controlled buses at their setpoint
    Flat,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub partitions: usize,
    pub newton: NewtonConfig,
    pub linear_solver: LinearSolverKind,
    pub start: StartMode,
    pub reference_policy: ReferencePolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            partitions: 1,
            newton: NewtonConfig::default(),
            linear_solver: LinearSolverKind::default(),
            start: StartMode::Warm,
            reference_policy: ReferencePolicy::default(),
        }
    }
}

impl EngineOptions {
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_newton(mut self, newton: NewtonConfig) -> Self {
        self.newton = newton;
        self
    }

    pub fn with_linear_solver(mut self, kind: LinearSolverKind) -> Self {
        self.linear_solver = kind;
        self
    }

    pub fn with_start(mut self, start: StartMode) -> Self {
        self.start = start;
        self
    }

    pub fn with_reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }
}

pub struct PowerFlow {
    topology: SharedTopology,
    options: EngineOptions,
    application: Application,
    solver: NewtonSolver,
    linear: Arc<dyn LinearSolve>,
    is_setup: bool,
    outcome: Option<NewtonOutcome>,
    solution: Option<PowerFlowSolution>,
}

impl PowerFlow {
    /// Takes ownership of `topology` as the first holder of a new shared handle.
    pub fn create(topology: NetworkTopology, options: EngineOptions) -> PflowResult<Self> {
        Self::build(SharedTopology::new(topology), options)
    }

    pub fn from_case(case: CaseData, options: EngineOptions) -> PflowResult<Self> {
        Self::create(case.into_topology()?, options)
    }

    /// Joins an existing shared topology as an additional holder.
    pub fn with_shared(shared: &SharedTopology, options: EngineOptions) -> PflowResult<Self> {
        Self::build(shared.retain()?, options)
    }

    fn build(topology: SharedTopology, options: EngineOptions) -> PflowResult<Self> {
        if options.partitions == 0 {
            return Err(PflowError::configuration("at least one partition is required"));
        }
        let linear = options.linear_solver.build()?;
        let solver = NewtonSolver::new(options.newton.clone());
        Ok(Self {
            topology,
            options,
            application: Application::None,
            solver,
            linear,
            is_setup: false,
            outcome: None,
            solution: None,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn shared(&self) -> &SharedTopology {
        &self.topology
    }

    pub fn set_application(&mut self, application: Application) {
        self.application = application;
    }

    pub fn application(&self) -> Application {
        self.application
    }

    /// Partitions and finalizes the topology if nobody has yet; otherwise
    /// refreshes stale connectivity. Joining a finalized topology requires
    /// the same partition count as its installed layout.
    pub fn setup(&mut self) -> PflowResult<()> {
        let partitions = self.options.partitions;
        let policy = self.options.reference_policy;
        self.topology.with_mut(|t| -> PflowResult<()> {
            if t.is_finalized() {
                let installed = t.layout()?.len();
                if installed != partitions {
                    return Err(PflowError::configuration(format!(
                        "topology is already split into {installed} partitions, \
                         cannot set up with {partitions}"
                    )));
                }
                debug!(partitions, "topology already finalized; reusing its layout");
                return t.ensure_connectivity();
            }
            t.set_reference_policy(policy);
            t.partition(partitions)?;
            t.finalize()
        })??;
        self.is_setup = true;
        Ok(())
    }

    fn require_setup(&self) -> PflowResult<()> {
        if self.is_setup {
            Ok(())
        } else {
            Err(PflowError::invalid_state("setup() must be called first"))
        }
    }

    /// Starting point of the next solve, sized to the current unknowns.
    pub fn create_global_vector(&self) -> PflowResult<Vec<f64>> {
        self.require_setup()?;
        let start = self.options.start;
        self.topology.with_mut(|t| -> PflowResult<Vec<f64>> {
            t.ensure_connectivity()?;
            let t: &NetworkTopology = t;
            let assembler = EquationAssembler::new(t)?;
            let halo = assembler.halo(|pos| start_voltage(t, pos, start));
            Ok(PowerFlowProblem::new(assembler, halo).initial_guess())
        })?
    }

    /// Jacobian at the starting point, with the sparsity of every later solve.
    pub fn create_matrix(&self) -> PflowResult<CsMat<f64>> {
        self.require_setup()?;
        let start = self.options.start;
        self.topology.with_mut(|t| -> PflowResult<CsMat<f64>> {
            t.ensure_connectivity()?;
            let t: &NetworkTopology = t;
            let assembler = EquationAssembler::new(t)?;
            let halo = assembler.halo(|pos| start_voltage(t, pos, start));
            let mut problem = PowerFlowProblem::new(assembler, halo);
            let x = problem.initial_guess();
            problem.jacobian(&x)
        })?
    }

    /// Runs Newton on the current topology and writes the final iterate back
    /// into the bus state, converged or not.
    pub fn solve(&mut self) -> PflowResult<NewtonOutcome> {
        self.require_setup()?;
        if self.application != Application::AcPowerFlow {
            return Err(PflowError::invalid_state(
                "solve requires the AcPowerFlow application",
            ));
        }
        self.solution = None;
        self.solver.reset();

        let start = self.options.start;
        let solver = &mut self.solver;
        let linear = self.linear.as_ref();
        let outcome = self.topology.with_mut(|t| -> PflowResult<NewtonOutcome> {
            t.ensure_connectivity()?;
            let (outcome, voltages) = {
                let view: &NetworkTopology = t;
                let assembler = EquationAssembler::new(view)?;
                let halo = assembler.halo(|pos| start_voltage(view, pos, start));
                let mut problem = PowerFlowProblem::new(assembler, halo);
                let mut x = problem.initial_guess();
                debug!(unknowns = x.len(), "starting Newton");
                let outcome = solver.solve(&mut problem, linear, &mut x)?;

                let layout = view.layout()?;
                let halo = problem.into_halo();
                let voltages: Vec<(usize, f64, f64)> = (0..view.buses().len())
                    .filter(|&pos| view.bus_at(pos).energized)
                    .map(|pos| {
                        let (vm, va) = halo.voltage(layout, pos);
                        (pos, vm, va)
                    })
                    .collect();
                (outcome, voltages)
            };
            for (pos, vm, va) in voltages {
                t.store_voltage(pos, vm, va);
            }
            Ok(outcome)
        })??;

        if outcome.converged() {
            info!(iterations = outcome.iterations, "power flow solved");
        } else {
            warn!(
                iterations = outcome.iterations,
                residual_norm = outcome.residual_norm,
                "power flow diverged; partial voltages kept"
            );
        }
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Branch flows, generator dispatch and island balance of the last solve.
    pub fn post_solve(&mut self) -> PflowResult<&PowerFlowSolution> {
        let outcome = self
            .outcome
            .as_ref()
            .ok_or_else(|| PflowError::invalid_state("post_solve requires a prior solve"))?;
        let solution = self
            .topology
            .with_mut(|t| post_solve::compute(t, outcome))??;
        Ok(self.solution.insert(solution))
    }

    pub fn converged(&self) -> bool {
        self.outcome.as_ref().is_some_and(NewtonOutcome::converged)
    }

    pub fn outcome(&self) -> Option<&NewtonOutcome> {
        self.outcome.as_ref()
    }

    pub fn solution(&self) -> Option<&PowerFlowSolution> {
        self.solution.as_ref()
    }

    /// `status` accepts the textual forms of [`LineStatus::parse`].
    pub fn set_line_status(
        &mut self,
        from: BusId,
        to: BusId,
        status: &str,
        circuit: &str,
    ) -> PflowResult<()> {
        let status = LineStatus::parse(status)?;
        self.topology.with_mut(|t| -> PflowResult<()> {
            let line = t.find_line(from, to, circuit)?;
            t.set_line_status(line, status)
        })??;
        self.invalidate();
        Ok(())
    }

    pub fn set_gen_status(&mut self, bus: BusId, status: &str, circuit: &str) -> PflowResult<()> {
        let status = GenStatus::parse(status)?;
        self.topology.with_mut(|t| -> PflowResult<()> {
            let unit = t.find_generator(bus, circuit)?;
            t.set_generator_status(unit, status)
        })??;
        self.invalidate();
        Ok(())
    }

    /// Sets status first, then dispatch, so a unit turned on keeps the new
    /// output.
    pub fn set_gen_dispatch_and_status(
        &mut self,
        bus: BusId,
        circuit: &str,
        status: GenStatus,
        pg: Megawatts,
        qg: Megavars,
    ) -> PflowResult<()> {
        self.topology.with_mut(|t| -> PflowResult<()> {
            let base = MegavoltAmperes(t.base_mva());
            let unit = t.find_generator(bus, circuit)?;
            t.set_generator_status(unit, status)?;
            if status.is_on() {
                t.set_generator_dispatch(unit, pg.to_per_unit(base).0, qg.to_per_unit(base).0)?;
            }
            Ok(())
        })??;
        self.invalidate();
        Ok(())
    }

    /// `(vm [pu], va [deg])`; zero magnitude on a bus that is not energized.
    pub fn bus_voltage(&self, bus: BusId) -> PflowResult<(f64, f64)> {
        self.topology.with(|t| -> PflowResult<(f64, f64)> {
            let bus = t.bus(bus)?;
            if bus.energized {
                Ok((bus.vm, bus.va.to_degrees()))
            } else {
                Ok((0.0, bus.va.to_degrees()))
            }
        })?
    }

    pub fn bus_type(&self, bus: BusId) -> PflowResult<BusType> {
        self.topology.with(|t| t.bus(bus).map(|b| b.kind))?
    }

    pub fn set_load_power(
        &mut self,
        bus: BusId,
        circuit: &str,
        pd: Megawatts,
        qd: Megavars,
    ) -> PflowResult<()> {
        self.topology.with_mut(|t| -> PflowResult<()> {
            let base = MegavoltAmperes(t.base_mva());
            let load = t.find_load(bus, circuit)?;
            t.set_load_demand(load, pd.to_per_unit(base).0, qd.to_per_unit(base).0)
        })??;
        self.invalidate();
        Ok(())
    }

    pub fn set_load_status(&mut self, bus: BusId, circuit: &str, status: LoadStatus) -> PflowResult<()> {
        self.topology.with_mut(|t| -> PflowResult<()> {
            let load = t.find_load(bus, circuit)?;
            t.set_load_status(load, status)
        })??;
        self.invalidate();
        Ok(())
    }

    pub fn load_power(&self, bus: BusId, circuit: &str) -> PflowResult<(Megawatts, Megavars)> {
        self.topology.with(|t| -> PflowResult<(Megawatts, Megavars)> {
            let base = t.base_mva();
            let load = t.load(t.find_load(bus, circuit)?)?;
            Ok((Megawatts(load.pd * base), Megavars(load.qd * base)))
        })?
    }

    /// Adds `gs` (MW at 1 pu) and `bs` (MVAr at 1 pu) to the bus shunt.
    pub fn add_bus_shunt(&mut self, bus: BusId, gs: Megawatts, bs: Megavars) -> PflowResult<()> {
        self.topology.with_mut(|t| -> PflowResult<()> {
            let base = MegavoltAmperes(t.base_mva());
            t.add_bus_shunt(bus, gs.to_per_unit(base).0, bs.to_per_unit(base).0)
        })??;
        self.invalidate();
        Ok(())
    }

    /// A new holder of the underlying topology.
    pub fn retain(&self) -> PflowResult<SharedTopology> {
        self.topology.retain()
    }

    /// Drops this engine's hold; returns the holders left. The topology is
    /// torn down when none remain.
    pub fn release(self) -> PflowResult<usize> {
        self.topology.release()
    }

    pub fn destroy(self) -> PflowResult<usize> {
        self.release()
    }

    fn invalidate(&mut self) {
        self.outcome = None;
        self.solution = None;
    }
}

/// `(vm, va)` the iteration starts from at bus position `pos`.
fn start_voltage(topology: &NetworkTopology, pos: usize, start: StartMode) -> (f64, f64) {
    let bus = topology.bus_at(pos);
    let setpoint = topology
        .generators_at(pos)
        .iter()
        .filter_map(|&id| topology.generator(id).ok())
        .find(|g| g.status.is_on())
        .map(|g| g.vs);
    let controlled = bus.kind != BusType::Pq;
    match start {
        StartMode::Warm => {
            let vm = match setpoint {
                Some(vs) if controlled => vs,
                _ if bus.vm > 0.0 => bus.vm,
                _ => 1.0,
            };
            (vm, bus.va)
        }
        StartMode::Flat => {
            let vm = match setpoint {
                Some(vs) if controlled => vs,
                _ => 1.0,
            };
            (vm, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newton::SolverState;

    fn engine(partitions: usize) -> PowerFlow {
        let options = EngineOptions::default().with_partitions(partitions);
        let mut pf = PowerFlow::from_case(CaseData::builtin_case9().unwrap(), options).unwrap();
        pf.set_application(Application::AcPowerFlow);
        pf.setup().unwrap();
        pf
    }

    #[test]
    fn test_lifecycle_order_is_enforced() {
        let mut pf =
            PowerFlow::from_case(CaseData::builtin_case9().unwrap(), EngineOptions::default())
                .unwrap();
        assert!(matches!(pf.solve(), Err(PflowError::InvalidState(_))));
        assert!(matches!(pf.post_solve(), Err(PflowError::InvalidState(_))));

        pf.setup().unwrap();
        // Application still unset
        assert!(matches!(pf.solve(), Err(PflowError::InvalidState(_))));
        pf.set_application(Application::AcPowerFlow);
        assert!(pf.solve().unwrap().converged());
        assert!(pf.converged());
    }

    #[test]
    fn test_vector_and_matrix_are_compatible() {
        let pf = engine(2);
        let x = pf.create_global_vector().unwrap();
        let j = pf.create_matrix().unwrap();
        assert_eq!(x.len(), 14);
        assert_eq!((j.rows(), j.cols()), (14, 14));
    }

    #[test]
    fn test_generator_setpoints_hold_after_solve() {
        let mut pf = engine(1);
        pf.solve().unwrap().into_result().unwrap();
        let (vm1, va1) = pf.bus_voltage(BusId::new(1)).unwrap();
        let (vm2, _) = pf.bus_voltage(BusId::new(2)).unwrap();
        assert!((vm1 - 1.04).abs() < 1e-12);
        assert!(va1.abs() < 1e-12);
        assert!((vm2 - 1.025).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_line_is_not_found() {
        let mut pf = engine(1);
        let err = pf
            .set_line_status(BusId::new(1), BusId::new(9), "tripped", "1")
            .unwrap_err();
        assert!(matches!(err, PflowError::NotFound(_)));
        let err = pf
            .set_line_status(BusId::new(8), BusId::new(9), "sideways", "1")
            .unwrap_err();
        assert!(matches!(err, PflowError::Parse(_)));
    }

    #[test]
    fn test_load_power_round_trips_in_megawatts() {
        let mut pf = engine(1);
        pf.set_load_power(BusId::new(5), "1", Megawatts(100.0), Megavars(40.0))
            .unwrap();
        let (p, q) = pf.load_power(BusId::new(5), "1").unwrap();
        assert!((p.0 - 100.0).abs() < 1e-9 && (q.0 - 40.0).abs() < 1e-9);
        assert!(pf.outcome().is_none());
        assert!(pf.solve().unwrap().converged());
    }

    #[test]
    fn test_flat_start_reaches_same_solution() {
        let mut warm = engine(1);
        warm.solve().unwrap();
        let options = EngineOptions::default().with_start(StartMode::Flat);
        let mut flat =
            PowerFlow::from_case(CaseData::builtin_case9().unwrap(), options).unwrap();
        flat.set_application(Application::AcPowerFlow);
        flat.setup().unwrap();
        flat.solve().unwrap();
        for id in 1..=9 {
            let a = warm.bus_voltage(BusId::new(id)).unwrap();
            let b = flat.bus_voltage(BusId::new(id)).unwrap();
            assert!((a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-4);
        }
    }

    #[test]
    fn test_iteration_cap_keeps_partial_state() {
        let options = EngineOptions::default()
            .with_newton(NewtonConfig::default().with_max_iterations(1).with_tolerance(1e-12))
            .with_start(StartMode::Flat);
        let mut pf = PowerFlow::from_case(CaseData::builtin_case9().unwrap(), options).unwrap();
        pf.set_application(Application::AcPowerFlow);
        pf.setup().unwrap();
        let outcome = pf.solve().unwrap();
        assert_eq!(outcome.state, SolverState::Diverged);
        assert!(!pf.converged());
        // The single step moved the PQ voltages off the flat start
        let (vm5, _) = pf.bus_voltage(BusId::new(5)).unwrap();
        assert!((vm5 - 1.0).abs() > 1e-6);
    }

    #[test]
    fn test_elements_added_after_partition_are_solved() {
        use pflow_core::{Bus, Generator, Line, Load};

        let mut t = NetworkTopology::new(100.0);
        t.add_bus(Bus::new(BusId::new(1), BusType::Reference)).unwrap();
        t.add_bus(Bus::new(BusId::new(2), BusType::Pq)).unwrap();
        t.add_line(Line::new(BusId::new(1), BusId::new(2), 0.01, 0.1))
            .unwrap();
        t.add_generator(Generator::new(BusId::new(1))).unwrap();
        t.partition(1).unwrap();

        t.add_bus(Bus::new(BusId::new(3), BusType::Pq)).unwrap();
        t.add_line(Line::new(BusId::new(2), BusId::new(3), 0.01, 0.1))
            .unwrap();
        t.add_load(Load::new(BusId::new(3), 0.3, 0.1)).unwrap();
        t.finalize().unwrap();
        assert_eq!(t.num_variables().unwrap(), 4);

        let mut pf = PowerFlow::create(t, EngineOptions::default()).unwrap();
        pf.set_application(Application::AcPowerFlow);
        pf.setup().unwrap();
        assert_eq!(pf.create_global_vector().unwrap().len(), 4);
        assert!(pf.solve().unwrap().converged());

        let (vm, _) = pf.bus_voltage(BusId::new(3)).unwrap();
        assert!(vm > 0.9 && vm < 1.0);
        let solution = pf.post_solve().unwrap();
        let slack = solution.bus(BusId::new(1)).unwrap();
        assert!(slack.p_gen_mw > 30.0);
    }

    #[test]
    fn test_setup_rejects_a_different_partition_count() {
        let first = engine(2);
        let mut second =
            PowerFlow::with_shared(first.shared(), EngineOptions::default().with_partitions(3))
                .unwrap();
        assert!(matches!(second.setup(), Err(PflowError::Configuration(_))));

        let mut third =
            PowerFlow::with_shared(first.shared(), EngineOptions::default().with_partitions(2))
                .unwrap();
        third.setup().unwrap();
    }

    #[test]
    fn test_release_tears_down_with_last_holder() {
        let pf = engine(1);
        let extra = pf.retain().unwrap();
        assert_eq!(pf.release().unwrap(), 1);
        assert!(extra.is_alive());
        assert_eq!(extra.release().unwrap(), 0);
        assert!(!extra.is_alive());
    }
}
