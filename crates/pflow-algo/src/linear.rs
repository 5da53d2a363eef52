//! Linear solve backends for the Newton step `J·Δx = b`.
//!
//! - [`SparseLu`]: left-looking sparse LU from `rsparse` (feature `sparse-lu`)
//! - [`DenseLu`]: partial-pivot LU from `faer` on a densified copy, for small
//!   systems and as a cross-check

use std::sync::Arc;

use faer::{prelude::*, solvers::PartialPivLu, Mat};
use pflow_core::{PflowError, PflowResult};
use serde::{Deserialize, Serialize};
use sprs::CsMat;

/// Solves `A·x = b` for a square sparse `A`.
pub trait LinearSolve: Send + Sync {
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> PflowResult<Vec<f64>>;

    fn name(&self) -> &'static str;
}

fn check_dimensions(matrix: &CsMat<f64>, rhs: &[f64]) -> PflowResult<usize> {
    let n = matrix.rows();
    if matrix.cols() != n {
        return Err(PflowError::LinearSolve(format!(
            "matrix must be square, got {}x{}",
            n,
            matrix.cols()
        )));
    }
    if rhs.len() != n {
        return Err(PflowError::LinearSolve(format!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        )));
    }
    Ok(n)
}

fn check_finite(solution: Vec<f64>, backend: &str) -> PflowResult<Vec<f64>> {
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(PflowError::LinearSolve(format!(
            "singular Jacobian ({backend} produced non-finite values)"
        )));
    }
    Ok(solution)
}

#[derive(Debug, Clone, Default)]
pub struct DenseLu;

impl LinearSolve for DenseLu {
    fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> PflowResult<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut mat = Mat::<f64>::zeros(n, n);
        for (value, (row, col)) in matrix.iter() {
            mat.write(row, col, mat.read(row, col) + *value);
        }
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        check_finite((0..n).map(|i| sol.read(i, 0)).collect(), "dense-lu")
    }

    fn name(&self) -> &'static str {
        "dense-lu"
    }
}

#[cfg(feature = "sparse-lu")]
pub use sparse::SparseLu;

#[cfg(feature = "sparse-lu")]
mod sparse {
    use super::*;
    use rsparse::data::Sprs;
    use rsparse::{lsolve, lu, sqr, usolve};

    /// Pivot threshold for the numeric factorization.
    const PIVOT_TOL: f64 = 1e-6;

    #[derive(Debug, Clone, Default)]
    pub struct SparseLu;

    impl LinearSolve for SparseLu {
        fn solve(&self, matrix: &CsMat<f64>, rhs: &[f64]) -> PflowResult<Vec<f64>> {
            let n = check_dimensions(matrix, rhs)?;
            if n == 0 {
                return Ok(Vec::new());
            }

            let csc = matrix.to_csc();
            let mut p: Vec<isize> = Vec::with_capacity(n + 1);
            let mut i = Vec::with_capacity(csc.nnz());
            let mut x = Vec::with_capacity(csc.nnz());
            p.push(0);
            for column in csc.outer_iterator() {
                for (row, &value) in column.iter() {
                    i.push(row);
                    x.push(value);
                }
                p.push(i.len() as isize);
            }
            let a = Sprs {
                m: n,
                n,
                nzmax: x.len(),
                i,
                p,
                x,
            };

            let mut symbolic = sqr(&a, 1, false);
            let numeric = lu(&a, &mut symbolic, PIVOT_TOL)
                .map_err(|_| PflowError::LinearSolve("sparse LU factorization failed".into()))?;

            let mut work = vec![0.0; n];
            let mut solution = vec![0.0; n];
            ipvec(&numeric.pinv, rhs, &mut work); // work = P*b
            lsolve(&numeric.l, &mut work); // work = L\work
            usolve(&numeric.u, &mut work); // work = U\work
            ipvec(&symbolic.q, &work, &mut solution); // x = Q*work

            check_finite(solution, "sparse-lu")
        }

        fn name(&self) -> &'static str {
            "sparse-lu"
        }
    }

    fn ipvec(perm: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
        match perm {
            Some(p) => {
                for (k, &value) in b.iter().enumerate() {
                    x[p[k] as usize] = value;
                }
            }
            None => x.copy_from_slice(b),
        }
    }
}

/// Linear backend selectable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinearSolverKind {
    SparseLu,
    DenseLu,
}

impl Default for LinearSolverKind {
    fn default() -> Self {
        if cfg!(feature = "sparse-lu") {
            LinearSolverKind::SparseLu
        } else {
            LinearSolverKind::DenseLu
        }
    }
}

impl LinearSolverKind {
    pub fn from_str(input: &str) -> PflowResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "sparse-lu" | "sparse" | "rsparse" => Ok(LinearSolverKind::SparseLu),
            "dense-lu" | "dense" | "faer" => Ok(LinearSolverKind::DenseLu),
            "default" => Ok(LinearSolverKind::default()),
            other => Err(PflowError::configuration(format!(
                "unknown linear solver '{}'; supported values: {}",
                other,
                Self::available().join(", ")
            ))),
        }
    }

    pub fn build(self) -> PflowResult<Arc<dyn LinearSolve>> {
        match self {
            #[cfg(feature = "sparse-lu")]
            LinearSolverKind::SparseLu => Ok(Arc::new(SparseLu)),
            #[cfg(not(feature = "sparse-lu"))]
            LinearSolverKind::SparseLu => Err(PflowError::configuration(
                "sparse-lu backend requires the `sparse-lu` feature",
            )),
            LinearSolverKind::DenseLu => Ok(Arc::new(DenseLu)),
        }
    }

    pub fn available() -> &'static [&'static str] {
        if cfg!(feature = "sparse-lu") {
            &["sparse-lu", "dense-lu"]
        } else {
            &["dense-lu"]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinearSolverKind::SparseLu => "sparse-lu",
            LinearSolverKind::DenseLu => "dense-lu",
        }
    }
}
