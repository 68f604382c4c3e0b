use montage_optimize::{
    conjugate_gradient_solve, CgSolver, LeastSquaresSystem, LinearSolver, SolverBackend,
    SparseMatrix, Triplet,
};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_sparse(rng: &mut StdRng, rows: usize, cols: usize, density: f64) -> SparseMatrix {
    let mut triplets = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if rng.gen_bool(density) {
                triplets.push(Triplet::new(r, c, rng.gen_range(-5.0..5.0)));
            }
        }
    }
    SparseMatrix::from_triplets(rows, cols, &triplets).unwrap()
}

#[test]
fn test_gram_matches_transpose_product() {
    let mut rng = StdRng::seed_from_u64(2024);
    let densities = [0.05, 0.1, 0.2, 0.3, 0.5, 0.7, 0.9, 1.0, 0.15, 0.4, 0.6, 0.25];
    for (k, &density) in densities.iter().enumerate() {
        let rows = 3 + k * 2;
        let cols = 2 + (k % 5) * 3;
        let a = random_sparse(&mut rng, rows, cols, density);

        let gram = a.gram_matrix().unwrap();
        let reference = a.transpose().matmul(&a).unwrap();

        assert_eq!(gram.rows(), cols);
        assert_eq!(gram.cols(), cols);
        assert_eq!(gram.row_ptr(), reference.row_ptr(), "pattern differs at density {density}");
        assert_eq!(gram.col_indices(), reference.col_indices());
        assert_eq!(gram.values(), reference.values());
        assert!(gram.is_symmetric(1e-12));
    }
}

#[test]
fn test_duplicates_summed_and_zeros_dropped() {
    let triplets = [
        Triplet::new(0, 1, 2.0),
        Triplet::new(0, 1, 3.0),
        Triplet::new(1, 0, 4.0),
        Triplet::new(1, 0, -4.0),
        Triplet::new(1, 1, 0.0),
    ];
    let m = SparseMatrix::from_triplets(2, 2, &triplets).unwrap();
    assert_eq!(m.nnz(), 1);
    assert_eq!(m.get(0, 1), 5.0);
    assert_eq!(m.get(1, 0), 0.0);
}

#[test]
fn test_cg_small_spd_system() {
    // [[4, 1, 0], [1, 3, 1], [0, 1, 2]] x = [6, 9, 8] => x = [1, 2, 3]
    let triplets = [
        Triplet::new(0, 0, 4.0),
        Triplet::new(0, 1, 1.0),
        Triplet::new(1, 0, 1.0),
        Triplet::new(1, 1, 3.0),
        Triplet::new(1, 2, 1.0),
        Triplet::new(2, 1, 1.0),
        Triplet::new(2, 2, 2.0),
    ];
    let a = SparseMatrix::from_triplets(3, 3, &triplets).unwrap();
    let b = DVector::from_vec(vec![6.0, 9.0, 8.0]);

    let out = conjugate_gradient_solve(&a, &b, &DVector::zeros(3), 1e-6, 100).unwrap();
    assert!(out.converged);
    assert!(out.iterations < 10);
    let expected = DVector::from_vec(vec![1.0, 2.0, 3.0]);
    assert!((out.x - expected).norm() < 1e-6);
}

#[test]
fn test_cg_on_random_normal_equations() {
    let mut rng = StdRng::seed_from_u64(11);
    // tall, full column rank with an identity block on top
    let cols = 8;
    let mut triplets: Vec<_> = (0..cols).map(|i| Triplet::new(i, i, 1.0)).collect();
    for r in cols..3 * cols {
        for c in 0..cols {
            if rng.gen_bool(0.3) {
                triplets.push(Triplet::new(r, c, rng.gen_range(-1.0..1.0)));
            }
        }
    }
    let a = SparseMatrix::from_triplets(3 * cols, cols, &triplets).unwrap();
    let gram = a.gram_matrix().unwrap();
    let x_true = DVector::from_fn(cols, |i, _| i as f64 - 3.5);
    let rhs = gram.multiply(&x_true).unwrap();

    let out = CgSolver::new().with_tolerance(1e-10).solve(&gram, &rhs).unwrap();
    assert!(out.converged);
    assert!((out.x - x_true).norm() < 1e-6);
}

#[test]
fn test_backends_agree_on_random_system() {
    let mut rng = StdRng::seed_from_u64(5);
    let cols = 10;
    let rows = 25;
    let mut system = LeastSquaresSystem::new(rows, cols);
    for i in 0..cols {
        system.add(i, i, 1.0);
    }
    for r in cols..rows {
        let c = rng.gen_range(0..cols - 1);
        system.add(r, c, -1.0);
        system.add(r, c + 1, 1.0);
    }
    let rhs = DVector::from_fn(rows, |_, _| rng.gen_range(-10.0..10.0));
    let guess = DVector::zeros(cols);

    let cg = CgSolver::new().with_tolerance(1e-10);
    let custom = SolverBackend::Custom
        .instantiate(cg)
        .prepare(&system)
        .unwrap()
        .solve(&rhs, &guess)
        .unwrap();
    let reference = SolverBackend::Reference
        .instantiate(cg)
        .prepare(&system)
        .unwrap()
        .solve(&rhs, &guess)
        .unwrap();

    assert!(custom.converged);
    assert!((custom.x - reference.x).amax() < 1e-6);
}
