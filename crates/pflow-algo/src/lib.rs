//! # pflow-algo: Newton-Raphson AC power flow over a partitioned network
//!
//! Builds the polar power-balance equations of a [`pflow_core::NetworkTopology`],
//! assembles them partition by partition with ghost exchange, and drives them
//! to zero with an inspectable Newton state machine.
//!
//! ## Pipeline
//!
//! | Stage | Type | Notes |
//! |-------|------|-------|
//! | Line model | [`LineAdmittance`] | Tap ratio and phase shift |
//! | Ghost sync | [`HaloStates`] | Owner → ghost copy, once per evaluation |
//! | Assembly | [`EquationAssembler`] | Residual + sparse Jacobian, rayon per partition |
//! | Iteration | [`NewtonSolver`] | `Init → Iterating → Converged \| Diverged` |
//! | Linear step | [`LinearSolve`] | `sparse-lu` (rsparse) or `dense-lu` (faer) |
//! | Reporting | [`PowerFlowSolution`] | Flows, losses, dispatch, island balance |
//!
//! [`PowerFlow`] ties these together behind the create / setup / solve /
//! post_solve lifecycle and the status-edit operations.
//!
//! ## Example
//!
//! ```ignore
//! use pflow_algo::{Application, EngineOptions, PowerFlow};
//! use pflow_core::{BusId, CaseData};
//!
//! let mut pf = PowerFlow::from_case(CaseData::builtin_case9()?, EngineOptions::default())?;
//! pf.set_application(Application::AcPowerFlow);
//! pf.setup()?;
//! pf.solve()?.into_result()?;
//!
//! pf.set_line_status(BusId::new(8), BusId::new(9), "tripped", "1")?;
//! pf.solve()?.into_result()?;
//! let solution = pf.post_solve()?;
//! println!("Losses: {:.2} MW", solution.total_losses_mw());
//! ```

pub mod admittance;
pub mod assembler;
pub mod engine;
pub mod halo;
pub mod linear;
pub mod newton;
pub mod post_solve;

pub use admittance::{end_flow, EndFlow, LineAdmittance};
pub use assembler::{BusMismatch, EquationAssembler, PowerFlowProblem};
pub use engine::{Application, EngineOptions, PowerFlow, StartMode};
pub use halo::{HaloStates, LocalState};
#[cfg(feature = "sparse-lu")]
pub use linear::SparseLu;
pub use linear::{DenseLu, LinearSolve, LinearSolverKind};
pub use newton::{NewtonConfig, NewtonOutcome, NewtonSolver, NonlinearProblem, NormKind, SolverState};
pub use post_solve::{BusResult, GeneratorDispatch, IslandBalance, LineFlow, PowerFlowSolution};
