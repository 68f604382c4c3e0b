//! Numerical back end for the montage pipeline.
//!
//! - [`sparse`]: compressed sparse-row matrices, Gram products
//! - [`cg`]: conjugate gradient and Gauss-Seidel solvers
//! - [`backend`]: least-squares backends (in-house CG, `faer` sparse Cholesky)
//! - [`maxflow`]: s-t max-flow / min-cut
//! - [`mrf`]: α-expansion and α-β swap on grid MRFs

pub mod backend;
pub mod cg;
pub mod maxflow;
pub mod mrf;
pub mod sparse;

pub use backend::{
    CgBackend, ChannelSolve, CholeskyBackend, LeastSquaresBackend, LeastSquaresSystem,
    PreparedSystem, SolverBackend,
};
pub use cg::{
    conjugate_gradient_solve, gauss_seidel_solve, CgSolver, GaussSeidelSolver, LinearSolver,
    SolveOutcome,
};
pub use maxflow::FlowGraph;
pub use mrf::{GridMrf, MoveKind, MoveReport, MrfEnergy};
pub use sparse::{SparseMatrix, Triplet};

pub use montage_core::{Error, Result};
