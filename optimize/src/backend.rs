use faer::prelude::Solve;
use faer::sparse::SparseColMat;
use faer::{Mat, Side};
use montage_core::{Error, Result};
use nalgebra::DVector;

use crate::cg::{CgSolver, LinearSolver, SolveOutcome};
use crate::sparse::{SparseMatrix, Triplet};

/// Per-channel result of a least-squares solve.
pub type ChannelSolve = SolveOutcome;

/// Over-determined system `A x ≈ b` collected as coordinate triplets.
#[derive(Debug, Clone)]
pub struct LeastSquaresSystem {
    pub rows: usize,
    pub cols: usize,
    triplets: Vec<Triplet<usize, usize, f64>>,
}

impl LeastSquaresSystem {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            triplets: Vec::new(),
        }
    }

    /// Pre-sizes the triplet buffer, surfacing allocation failure as an error.
    pub fn with_capacity(rows: usize, cols: usize, nnz: usize) -> Result<Self> {
        let mut triplets = Vec::new();
        triplets.try_reserve_exact(nnz)?;
        Ok(Self { rows, cols, triplets })
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.triplets.push(Triplet::new(row, col, value));
    }

    pub fn triplets(&self) -> &[Triplet<usize, usize, f64>] {
        &self.triplets
    }

    pub fn to_matrix(&self) -> Result<SparseMatrix> {
        SparseMatrix::from_triplets(self.rows, self.cols, &self.triplets)
    }
}

/// A system whose normal equations have been assembled (and possibly
/// factorized) once; only the right-hand side changes between solves.
pub trait PreparedSystem: Send + Sync {
    fn unknowns(&self) -> usize;

    /// Least-squares solve for the right-hand side `rhs` (length = rows of A).
    fn solve(&self, rhs: &DVector<f64>, initial_guess: &DVector<f64>) -> Result<ChannelSolve>;
}

pub trait LeastSquaresBackend {
    fn name(&self) -> &'static str;

    fn prepare(&self, system: &LeastSquaresSystem) -> Result<Box<dyn PreparedSystem>>;
}

/// Which least-squares engine a fusion run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverBackend {
    /// Sparse Cholesky factorization from `faer`.
    Reference,
    /// In-house CSR matrix with conjugate gradient.
    #[default]
    Custom,
}

impl SolverBackend {
    pub fn instantiate(self, cg: CgSolver) -> Box<dyn LeastSquaresBackend> {
        match self {
            SolverBackend::Reference => Box::new(CholeskyBackend),
            SolverBackend::Custom => Box::new(CgBackend { solver: cg }),
        }
    }
}

fn check_rhs(rhs: &DVector<f64>, rows: usize, guess: &DVector<f64>, cols: usize) -> Result<()> {
    if rhs.len() != rows || guess.len() != cols {
        return Err(Error::DimensionMismatch(format!(
            "system is {rows}x{cols}, got rhs of {} and initial guess of {}",
            rhs.len(),
            guess.len()
        )));
    }
    Ok(())
}

/// Normal equations solved by conjugate gradient on `AᵗA`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CgBackend {
    pub solver: CgSolver,
}

struct CgPrepared {
    a: SparseMatrix,
    gram: SparseMatrix,
    solver: CgSolver,
}

impl LeastSquaresBackend for CgBackend {
    fn name(&self) -> &'static str {
        "custom-cg"
    }

    fn prepare(&self, system: &LeastSquaresSystem) -> Result<Box<dyn PreparedSystem>> {
        let a = system.to_matrix()?;
        let gram = a.gram_matrix()?;
        tracing::debug!(rows = a.rows(), cols = a.cols(), nnz = gram.nnz(), "assembled normal equations");
        Ok(Box::new(CgPrepared {
            a,
            gram,
            solver: self.solver,
        }))
    }
}

impl PreparedSystem for CgPrepared {
    fn unknowns(&self) -> usize {
        self.gram.rows()
    }

    fn solve(&self, rhs: &DVector<f64>, initial_guess: &DVector<f64>) -> Result<ChannelSolve> {
        check_rhs(rhs, self.a.rows(), initial_guess, self.a.cols())?;
        let atb = self.a.transpose_multiply(rhs)?;
        self.solver.solve_from(&self.gram, &atb, initial_guess)
    }
}

/// Normal equations factorized once with a sparse LLᵀ.
#[derive(Debug, Clone, Copy, Default)]
pub struct CholeskyBackend;

struct CholeskyPrepared {
    rows: usize,
    cols: usize,
    // A in row-major triplet order, kept for Aᵗb
    a_triplets: Vec<Triplet<usize, usize, f64>>,
    gram_triplets: Vec<Triplet<usize, usize, f64>>,
    llt: faer::sparse::linalg::solvers::Llt<usize, f64>,
}

impl LeastSquaresBackend for CholeskyBackend {
    fn name(&self) -> &'static str {
        "reference-cholesky"
    }

    fn prepare(&self, system: &LeastSquaresSystem) -> Result<Box<dyn PreparedSystem>> {
        let n = system.cols;
        for t in system.triplets() {
            if t.row >= system.rows || t.col >= n {
                return Err(Error::InvalidInput(format!(
                    "triplet ({}, {}) outside {}x{}",
                    t.row, t.col, system.rows, n
                )));
            }
        }

        let mut a_triplets = system.triplets().to_vec();
        a_triplets.sort_by_key(|t| (t.row, t.col));

        // AᵗA = Σ_rows rᵗ r; duplicates are summed by faer.
        let mut gram_triplets = Vec::new();
        let mut start = 0;
        while start < a_triplets.len() {
            let row = a_triplets[start].row;
            let end = start + a_triplets[start..].iter().take_while(|t| t.row == row).count();
            let entries = &a_triplets[start..end];
            gram_triplets.try_reserve(entries.len() * entries.len())?;
            for ti in entries {
                for tj in entries {
                    gram_triplets.push(Triplet::new(ti.col, tj.col, ti.val * tj.val));
                }
            }
            start = end;
        }

        let gram = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &gram_triplets)
            .map_err(|e| Error::allocation(format!("sparse normal matrix: {e:?}")))?;
        let llt = gram
            .as_ref()
            .sp_cholesky(Side::Lower)
            .map_err(|e| Error::allocation(format!("sparse Cholesky factorization: {e:?}")))?;
        tracing::debug!(unknowns = n, entries = gram_triplets.len(), "factorized normal equations");

        Ok(Box::new(CholeskyPrepared {
            rows: system.rows,
            cols: n,
            a_triplets,
            gram_triplets,
            llt,
        }))
    }
}

impl PreparedSystem for CholeskyPrepared {
    fn unknowns(&self) -> usize {
        self.cols
    }

    fn solve(&self, rhs: &DVector<f64>, initial_guess: &DVector<f64>) -> Result<ChannelSolve> {
        check_rhs(rhs, self.rows, initial_guess, self.cols)?;

        let mut atb = vec![0.0; self.cols];
        for t in &self.a_triplets {
            atb[t.col] += t.val * rhs[t.row];
        }

        let b_mat = Mat::from_fn(self.cols, 1, |i, _| atb[i]);
        let sol = self.llt.solve(b_mat.as_ref());
        let x = DVector::from_fn(self.cols, |i, _| *sol.get(i, 0));

        let mut ax = vec![0.0; self.cols];
        for t in &self.gram_triplets {
            ax[t.row] += t.val * x[t.col];
        }
        let residual_norm = ax
            .iter()
            .zip(&atb)
            .map(|(l, r)| (r - l) * (r - l))
            .sum::<f64>()
            .sqrt();

        Ok(ChannelSolve {
            x,
            converged: true,
            iterations: 1,
            residual_norm,
        })
    }
}
