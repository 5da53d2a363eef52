//! Newton-Raphson iteration as an inspectable state machine.
//!
//! ```text
//!   Init ──solve()──▶ Iterating ──‖F‖ ≤ tol──────────▶ Converged
//!                        │
//!                        └──cap reached / ‖F‖ not finite──▶ Diverged
//! ```
//!
//! Each step evaluates `F(x)` and `J(x)`, solves `J·Δx = −F` through a
//! [`LinearSolve`] backend and updates `x ← x + α·Δx`. With damping enabled
//! `α` starts at 1 and is halved while the trial norm exceeds
//! `growth_threshold × ‖F‖`. Terminal states are sticky until [`NewtonSolver::reset`].

use pflow_core::{PflowError, PflowResult};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use tracing::{debug, info, warn};

use crate::linear::LinearSolve;

/// A square nonlinear system `F(x) = 0` with an analytic Jacobian.
pub trait NonlinearProblem {
    fn dimension(&self) -> usize;

    fn residual(&mut self, x: &[f64]) -> PflowResult<Vec<f64>>;

    fn jacobian(&mut self, x: &[f64]) -> PflowResult<CsMat<f64>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormKind {
    /// Largest absolute mismatch
    #[default]
    Inf,
    L2,
}

impl NormKind {
    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            NormKind::Inf => values.iter().fold(0.0_f64, |m, v| {
                if v.is_nan() || m.is_nan() {
                    f64::NAN
                } else {
                    m.max(v.abs())
                }
            }),
            NormKind::L2 => values.iter().map(|v| v * v).sum::<f64>().sqrt(),
        }
    }

    pub fn from_str(input: &str) -> PflowResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "inf" | "max" | "infinity" => Ok(NormKind::Inf),
            "l2" | "2" | "euclidean" => Ok(NormKind::L2),
            other => Err(PflowError::configuration(format!(
                "unknown norm '{other}'; expected inf or l2"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Convergence tolerance on the residual norm (per-unit)
    pub tolerance: f64,
    pub max_iterations: usize,
    pub norm: NormKind,
    /// Halve the step while the trial norm grows too much
    pub damping: bool,
    pub growth_threshold: f64,
    pub max_backtracks: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 20,
            norm: NormKind::Inf,
            damping: true,
            growth_threshold: 10.0,
            max_backtracks: 5,
        }
    }
}

impl NewtonConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_norm(mut self, norm: NormKind) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_damping(mut self, damping: bool) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_growth_threshold(mut self, growth_threshold: f64) -> Self {
        self.growth_threshold = growth_threshold;
        self
    }

    pub fn with_max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }

    fn validate(&self) -> PflowResult<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(PflowError::configuration(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.damping && !(self.growth_threshold > 0.0) {
            return Err(PflowError::configuration(
                "growth_threshold must be positive when damping is enabled",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverState {
    Init,
    Iterating,
    Converged,
    Diverged,
}

impl SolverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SolverState::Converged | SolverState::Diverged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverState::Init => "init",
            SolverState::Iterating => "iterating",
            SolverState::Converged => "converged",
            SolverState::Diverged => "diverged",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewtonOutcome {
    pub state: SolverState,
    pub iterations: usize,
    pub residual_norm: f64,
    /// Norm before the first step and after every accepted step
    pub history: Vec<f64>,
}

impl NewtonOutcome {
    pub fn converged(&self) -> bool {
        self.state == SolverState::Converged
    }

    /// `ConvergenceFailure` for a diverged run.
    pub fn into_result(self) -> PflowResult<Self> {
        match self.state {
            SolverState::Converged => Ok(self),
            _ => Err(PflowError::ConvergenceFailure {
                iterations: self.iterations,
                residual_norm: self.residual_norm,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewtonSolver {
    config: NewtonConfig,
    state: SolverState,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self::new(NewtonConfig::default())
    }
}

impl NewtonSolver {
    pub fn new(config: NewtonConfig) -> Self {
        Self {
            config,
            state: SolverState::Init,
        }
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = SolverState::Init;
    }

    /// Iterates from `x` in place. Divergence is reported through the
    /// outcome's state; errors are reserved for misuse and linear-solve
    /// failures.
    pub fn solve<P>(
        &mut self,
        problem: &mut P,
        linear: &dyn LinearSolve,
        x: &mut Vec<f64>,
    ) -> PflowResult<NewtonOutcome>
    where
        P: NonlinearProblem + ?Sized,
    {
        if self.state != SolverState::Init {
            return Err(PflowError::invalid_state(format!(
                "Newton solver is {}; reset() before solving again",
                self.state.as_str()
            )));
        }
        self.config.validate()?;
        if x.len() != problem.dimension() {
            return Err(PflowError::invalid_state(format!(
                "initial vector has {} entries, problem dimension is {}",
                x.len(),
                problem.dimension()
            )));
        }

        let config = self.config.clone();
        self.state = SolverState::Iterating;

        let mut residual = problem.residual(x)?;
        let mut norm = config.norm.apply(&residual);
        let mut history = vec![norm];
        let mut iterations = 0;

        loop {
            if !norm.is_finite() {
                warn!(iterations, "Newton residual is not finite");
                self.state = SolverState::Diverged;
                break;
            }
            if norm <= config.tolerance {
                info!(iterations, residual_norm = norm, "Newton converged");
                self.state = SolverState::Converged;
                break;
            }
            if iterations >= config.max_iterations {
                warn!(
                    iterations,
                    residual_norm = norm,
                    "Newton reached the iteration cap without converging"
                );
                self.state = SolverState::Diverged;
                break;
            }

            let jacobian = problem.jacobian(x)?;
            let rhs: Vec<f64> = residual.iter().map(|v| -v).collect();
            let step = match linear.solve(&jacobian, &rhs) {
                Ok(step) => step,
                Err(err) => {
                    self.state = SolverState::Diverged;
                    return Err(err);
                }
            };

            let mut alpha = 1.0;
            let mut trial = advance(x, &step, alpha);
            let mut trial_residual = problem.residual(&trial)?;
            let mut trial_norm = config.norm.apply(&trial_residual);
            if config.damping {
                let mut backtracks = 0;
                while (!trial_norm.is_finite() || trial_norm > config.growth_threshold * norm)
                    && backtracks < config.max_backtracks
                {
                    alpha *= 0.5;
                    backtracks += 1;
                    trial = advance(x, &step, alpha);
                    trial_residual = problem.residual(&trial)?;
                    trial_norm = config.norm.apply(&trial_residual);
                }
            }

            *x = trial;
            residual = trial_residual;
            norm = trial_norm;
            iterations += 1;
            history.push(norm);
            debug!(iteration = iterations, residual_norm = norm, step = alpha, "Newton step");
        }

        Ok(NewtonOutcome {
            state: self.state,
            iterations,
            residual_norm: norm,
            history,
        })
    }
}

fn advance(x: &[f64], step: &[f64], alpha: f64) -> Vec<f64> {
    x.iter().zip(step).map(|(xi, di)| xi + alpha * di).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::DenseLu;
    use sprs::TriMat;

    /// x² + y² = 4, x = y
    struct Circle;

    impl NonlinearProblem for Circle {
        fn dimension(&self) -> usize {
            2
        }

        fn residual(&mut self, x: &[f64]) -> PflowResult<Vec<f64>> {
            Ok(vec![x[0] * x[0] + x[1] * x[1] - 4.0, x[0] - x[1]])
        }

        fn jacobian(&mut self, x: &[f64]) -> PflowResult<CsMat<f64>> {
            let mut t = TriMat::new((2, 2));
            t.add_triplet(0, 0, 2.0 * x[0]);
            t.add_triplet(0, 1, 2.0 * x[1]);
            t.add_triplet(1, 0, 1.0);
            t.add_triplet(1, 1, -1.0);
            Ok(t.to_csr())
        }
    }

    /// x² + 1 = 0 has no real root.
    struct NoRoot;

    impl NonlinearProblem for NoRoot {
        fn dimension(&self) -> usize {
            1
        }

        fn residual(&mut self, x: &[f64]) -> PflowResult<Vec<f64>> {
            Ok(vec![x[0] * x[0] + 1.0])
        }

        fn jacobian(&mut self, x: &[f64]) -> PflowResult<CsMat<f64>> {
            let mut t = TriMat::new((1, 1));
            t.add_triplet(0, 0, 2.0 * x[0]);
            Ok(t.to_csr())
        }
    }

    #[test]
    fn test_converges_quadratically() {
        let mut solver = NewtonSolver::default();
        let mut x = vec![1.0, 2.0];
        let outcome = solver.solve(&mut Circle, &DenseLu, &mut x).unwrap();

        assert_eq!(outcome.state, SolverState::Converged);
        assert_eq!(solver.state(), SolverState::Converged);
        assert!(outcome.residual_norm <= 1e-6);
        assert_eq!(outcome.history.len(), outcome.iterations + 1);
        let root = 2f64.sqrt();
        assert!((x[0] - root).abs() < 1e-6 && (x[1] - root).abs() < 1e-6);
    }

    #[test]
    fn test_already_converged_takes_no_steps() {
        let root = 2f64.sqrt();
        let mut x = vec![root, root];
        let outcome = NewtonSolver::default()
            .solve(&mut Circle, &DenseLu, &mut x)
            .unwrap();
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.converged());
    }

    #[test]
    fn test_iteration_cap_diverges() {
        let mut solver = NewtonSolver::new(NewtonConfig::default().with_max_iterations(5));
        let mut x = vec![0.5];
        let outcome = solver.solve(&mut NoRoot, &DenseLu, &mut x).unwrap();

        assert_eq!(outcome.state, SolverState::Diverged);
        assert_eq!(outcome.iterations, 5);
        assert!(matches!(
            outcome.into_result(),
            Err(PflowError::ConvergenceFailure { iterations: 5, .. })
        ));
    }

    #[test]
    fn test_terminal_state_is_sticky_until_reset() {
        let mut solver = NewtonSolver::default();
        let mut x = vec![1.0, 2.0];
        solver.solve(&mut Circle, &DenseLu, &mut x).unwrap();

        let err = solver.solve(&mut Circle, &DenseLu, &mut x).unwrap_err();
        assert!(matches!(err, PflowError::InvalidState(_)));
        assert_eq!(solver.state(), SolverState::Converged);

        solver.reset();
        assert_eq!(solver.state(), SolverState::Init);
        assert!(solver.solve(&mut Circle, &DenseLu, &mut x).unwrap().converged());
    }

    #[test]
    fn test_l2_norm_and_dimension_check() {
        assert!((NormKind::L2.apply(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(NormKind::Inf.apply(&[3.0, -4.0]), 4.0);
        assert!(NormKind::Inf.apply(&[1.0, f64::NAN]).is_nan());
        assert_eq!(NormKind::from_str("L2").unwrap(), NormKind::L2);

        let mut x = vec![1.0];
        let err = NewtonSolver::default()
            .solve(&mut Circle, &DenseLu, &mut x)
            .unwrap_err();
        assert!(matches!(err, PflowError::InvalidState(_)));
    }

    #[test]
    fn test_singular_jacobian_is_reported() {
        // J = [0] at x = 0
        let mut solver = NewtonSolver::default();
        let mut x = vec![0.0];
        let err = solver.solve(&mut NoRoot, &DenseLu, &mut x).unwrap_err();
        assert!(matches!(err, PflowError::LinearSolve(_)));
        assert_eq!(solver.state(), SolverState::Diverged);
    }
}
