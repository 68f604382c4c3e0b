use crate::sparse::SparseMatrix;
use montage_core::{Error, Result};
use nalgebra::DVector;

/// Default convergence tolerance on the residual 2-norm.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Maximum iterations before declaring non-convergence.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Result of an iterative or direct solve.
///
/// A solve that runs out of iterations is not an error: the best iterate is
/// returned with `converged == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub x: DVector<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Iterative solver for square systems `A x = b` started from `x0`.
pub trait LinearSolver {
    fn solve_from(
        &self,
        a: &SparseMatrix,
        b: &DVector<f64>,
        x0: &DVector<f64>,
    ) -> Result<SolveOutcome>;

    fn solve(&self, a: &SparseMatrix, b: &DVector<f64>) -> Result<SolveOutcome> {
        self.solve_from(a, b, &DVector::zeros(b.len()))
    }
}

/// Conjugate gradient for symmetric positive (semi-)definite systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for CgSolver {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl CgSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }
}

impl LinearSolver for CgSolver {
    fn solve_from(
        &self,
        a: &SparseMatrix,
        b: &DVector<f64>,
        x0: &DVector<f64>,
    ) -> Result<SolveOutcome> {
        conjugate_gradient_solve(a, b, x0, self.tolerance, self.max_iterations)
    }
}

/// Gauss-Seidel sweeps; only reliable for diagonally dominant systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussSeidelSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for GaussSeidelSolver {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl LinearSolver for GaussSeidelSolver {
    fn solve_from(
        &self,
        a: &SparseMatrix,
        b: &DVector<f64>,
        x0: &DVector<f64>,
    ) -> Result<SolveOutcome> {
        gauss_seidel_solve(a, b, x0, self.tolerance, self.max_iterations)
    }
}

fn check_square_system(a: &SparseMatrix, b: &DVector<f64>, x0: &DVector<f64>, tolerance: f64) -> Result<()> {
    if a.rows() != a.cols() {
        return Err(Error::DimensionMismatch(format!(
            "iterative solvers need a square matrix, got {}x{}",
            a.rows(),
            a.cols()
        )));
    }
    if b.len() != a.rows() || x0.len() != a.rows() {
        return Err(Error::DimensionMismatch(format!(
            "system is {n}x{n} but rhs has {} entries and initial guess {}",
            b.len(),
            x0.len(),
            n = a.rows()
        )));
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "tolerance must be finite and non-negative, got {tolerance}"
        )));
    }
    Ok(())
}

fn residual(a: &SparseMatrix, b: &DVector<f64>, x: &DVector<f64>) -> Result<DVector<f64>> {
    let ax = a.multiply(x)?;
    Ok(b - ax)
}

/// Conjugate gradient from the initial guess `x0`.
///
/// Stops once `‖b - A x‖₂ <= tolerance` or after `max_iterations` steps,
/// whichever comes first.
pub fn conjugate_gradient_solve(
    a: &SparseMatrix,
    b: &DVector<f64>,
    x0: &DVector<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Result<SolveOutcome> {
    check_square_system(a, b, x0, tolerance)?;

    let n = b.len();
    let mut x = x0.clone();
    // r₀ = b - A x₀
    let mut r = residual(a, b, &x)?;
    let mut rr = r.dot(&r);
    if rr.sqrt() <= tolerance {
        return Ok(SolveOutcome {
            x,
            converged: true,
            iterations: 0,
            residual_norm: rr.sqrt(),
        });
    }

    let mut p = r.clone();
    let mut ap = DVector::zeros(n);
    let mut converged = false;
    let mut iterations = 0;

    for k in 0..max_iterations {
        a.multiply_into(&p, &mut ap)?;

        let p_ap = p.dot(&ap);
        if !(p_ap > 0.0) {
            tracing::debug!(iteration = k, p_ap, "conjugate gradient breakdown");
            break;
        }
        let alpha = rr / p_ap;

        // x = x + α p, r = r - α A p
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);
        iterations = k + 1;

        let rr_new = r.dot(&r);
        if rr_new.sqrt() <= tolerance {
            converged = true;
            break;
        }

        // p = r + β p
        let beta = rr_new / rr;
        p.axpy(1.0, &r, beta);
        rr = rr_new;
    }

    let residual_norm = residual(a, b, &x)?.norm();
    tracing::debug!(iterations, residual_norm, converged, "conjugate gradient finished");

    Ok(SolveOutcome {
        x,
        converged: converged || residual_norm <= tolerance,
        iterations,
        residual_norm,
    })
}

/// Gauss-Seidel from `x0`; converged when the largest update of a sweep is
/// at most `tolerance`.
pub fn gauss_seidel_solve(
    a: &SparseMatrix,
    b: &DVector<f64>,
    x0: &DVector<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Result<SolveOutcome> {
    check_square_system(a, b, x0, tolerance)?;

    let diag = a.diagonal();
    if let Some(i) = diag.iter().position(|&d| d == 0.0) {
        return Err(Error::InvalidInput(format!(
            "Gauss-Seidel needs a non-zero diagonal, row {i} is zero"
        )));
    }

    let mut x = x0.clone();
    let mut converged = false;
    let mut iterations = 0;

    for sweep in 0..max_iterations {
        let mut max_delta = 0.0f64;
        for i in 0..a.rows() {
            let off_diag: f64 = a.row(i).filter(|&(j, _)| j != i).map(|(j, v)| v * x[j]).sum();
            let updated = (b[i] - off_diag) / diag[i];
            max_delta = max_delta.max((updated - x[i]).abs());
            x[i] = updated;
        }
        iterations = sweep + 1;
        if max_delta <= tolerance {
            converged = true;
            break;
        }
    }

    let residual_norm = residual(a, b, &x)?.norm();
    Ok(SolveOutcome {
        x,
        converged,
        iterations,
        residual_norm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::Triplet;

    fn spd_3x3() -> SparseMatrix {
        // [4 1 0; 1 3 1; 0 1 2]
        let triplets = vec![
            Triplet::new(0, 0, 4.0),
            Triplet::new(0, 1, 1.0),
            Triplet::new(1, 0, 1.0),
            Triplet::new(1, 1, 3.0),
            Triplet::new(1, 2, 1.0),
            Triplet::new(2, 1, 1.0),
            Triplet::new(2, 2, 2.0),
        ];
        SparseMatrix::from_triplets(3, 3, &triplets).unwrap()
    }

    #[test]
    fn cg_reaches_analytic_solution_quickly() {
        let a = spd_3x3();
        let expected = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        let b = a.multiply(&expected).unwrap();

        let out = conjugate_gradient_solve(&a, &b, &DVector::zeros(3), 1e-6, 100).unwrap();
        assert!(out.converged);
        assert!(out.iterations < 10, "took {} iterations", out.iterations);
        assert!((out.x - expected).norm() < 1e-6);
    }

    #[test]
    fn cg_from_exact_guess_does_no_work() {
        let a = spd_3x3();
        let x = DVector::from_vec(vec![0.5, 0.25, -1.0]);
        let b = a.multiply(&x).unwrap();
        let out = CgSolver::new().solve_from(&a, &b, &x).unwrap();
        assert_eq!(out.iterations, 0);
        assert!(out.converged);
        assert_eq!(out.x, x);
    }

    #[test]
    fn cg_reports_non_convergence_when_budget_exhausted() {
        // 5x5 tridiagonal SPD matrix
        let n = 5;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push(Triplet::new(i, i, 4.0));
            if i > 0 {
                triplets.push(Triplet::new(i, i - 1, -1.0));
                triplets.push(Triplet::new(i - 1, i, -1.0));
            }
        }
        let a = SparseMatrix::from_triplets(n, n, &triplets).unwrap();
        let b = DVector::from_vec(vec![1.0, 0.0, 3.0, -2.0, 5.0]);

        let out = CgSolver::new()
            .with_tolerance(1e-12)
            .with_max_iterations(1)
            .solve(&a, &b)
            .unwrap();
        assert!(!out.converged);
        assert_eq!(out.iterations, 1);
        assert!(out.residual_norm > 1e-12);

        let full = CgSolver::new().with_tolerance(1e-10).solve(&a, &b).unwrap();
        assert!(full.converged);
        let ax = a.multiply(&full.x).unwrap();
        assert!((ax - b).norm() < 1e-9);
    }

    #[test]
    fn cg_rejects_mismatched_dimensions() {
        let a = spd_3x3();
        let b = DVector::zeros(2);
        assert!(matches!(
            conjugate_gradient_solve(&a, &b, &DVector::zeros(3), 1e-6, 10),
            Err(Error::DimensionMismatch(_))
        ));
        let rect = SparseMatrix::zeros(2, 3);
        assert!(CgSolver::new().solve(&rect, &DVector::zeros(2)).is_err());
    }

    #[test]
    fn gauss_seidel_on_diagonally_dominant_system() {
        let a = spd_3x3();
        let expected = DVector::from_vec(vec![2.0, 1.0, -1.0]);
        let b = a.multiply(&expected).unwrap();
        let out = GaussSeidelSolver::default().solve(&a, &b).unwrap();
        assert!(out.converged);
        assert!((out.x - expected).norm() < 1e-5);
    }

    #[test]
    fn gauss_seidel_rejects_zero_diagonal() {
        let a = SparseMatrix::from_triplets(2, 2, &[Triplet::new(0, 1, 1.0), Triplet::new(1, 0, 1.0)]).unwrap();
        let err = GaussSeidelSolver::default().solve(&a, &DVector::zeros(2)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
