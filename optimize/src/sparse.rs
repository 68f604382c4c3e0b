//! Compressed sparse-row matrices.

use montage_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

pub use faer::sparse::Triplet;

/// Immutable CSR matrix.
///
/// Entries within a row are stored with strictly increasing column indices,
/// duplicates are summed on construction and exact zeros are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            row_ptr: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Builds a matrix from coordinate triplets in any order.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        triplets: &[Triplet<usize, usize, f64>],
    ) -> Result<Self> {
        let mut entries: Vec<(usize, usize, f64)> = Vec::new();
        entries.try_reserve_exact(triplets.len())?;
        for t in triplets {
            if t.row >= rows || t.col >= cols {
                return Err(Error::InvalidInput(format!(
                    "triplet ({}, {}) outside {rows}x{cols} matrix",
                    t.row, t.col
                )));
            }
            entries.push((t.row, t.col, t.val));
        }
        // stable, so duplicates are summed in insertion order
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        col_indices.try_reserve_exact(entries.len())?;
        values.try_reserve_exact(entries.len())?;

        let mut i = 0;
        while i < entries.len() {
            let (r, c, mut v) = entries[i];
            i += 1;
            while i < entries.len() && entries[i].0 == r && entries[i].1 == c {
                v += entries[i].2;
                i += 1;
            }
            if v != 0.0 {
                col_indices.push(c);
                values.push(v);
                row_ptr[r + 1] += 1;
            }
        }
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Ok(Self {
            rows,
            cols,
            row_ptr,
            col_indices,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Non-zero `(col, value)` pairs of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.row_ptr[row]..self.row_ptr[row + 1]
    }

    /// Element lookup; absent or out-of-range entries read as zero.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        let range = self.row_range(row);
        match self.col_indices[range.clone()].binary_search(&col) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    pub fn diagonal(&self) -> DVector<f64> {
        let n = self.rows.min(self.cols);
        DVector::from_fn(n, |i, _| self.get(i, i))
    }

    pub fn transpose(&self) -> Self {
        let mut row_ptr = vec![0usize; self.cols + 1];
        for &c in &self.col_indices {
            row_ptr[c + 1] += 1;
        }
        for c in 0..self.cols {
            row_ptr[c + 1] += row_ptr[c];
        }

        let mut next = row_ptr.clone();
        let mut col_indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0f64; self.nnz()];
        for r in 0..self.rows {
            for k in self.row_range(r) {
                let c = self.col_indices[k];
                let dst = next[c];
                col_indices[dst] = r;
                values[dst] = self.values[k];
                next[c] += 1;
            }
        }

        Self {
            rows: self.cols,
            cols: self.rows,
            row_ptr,
            col_indices,
            values,
        }
    }

    /// `y = A x`.
    pub fn multiply(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        let mut y = DVector::zeros(self.rows);
        self.multiply_into(x, &mut y)?;
        Ok(y)
    }

    pub fn multiply_into(&self, x: &DVector<f64>, y: &mut DVector<f64>) -> Result<()> {
        if x.len() != self.cols || y.len() != self.rows {
            return Err(Error::DimensionMismatch(format!(
                "cannot multiply {}x{} matrix by vector of length {} into length {}",
                self.rows,
                self.cols,
                x.len(),
                y.len()
            )));
        }
        let xs = x.as_slice();
        y.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(r, out)| {
                *out = self.row_range(r)
                    .map(|k| self.values[k] * xs[self.col_indices[k]])
                    .sum();
            });
        Ok(())
    }

    /// `Aᵗ b` computed by scattering rows, without building `Aᵗ`.
    pub fn transpose_multiply(&self, b: &DVector<f64>) -> Result<DVector<f64>> {
        if b.len() != self.rows {
            return Err(Error::DimensionMismatch(format!(
                "cannot multiply transpose of {}x{} matrix by vector of length {}",
                self.rows,
                self.cols,
                b.len()
            )));
        }
        let mut out = DVector::zeros(self.cols);
        for r in 0..self.rows {
            let br = b[r];
            if br == 0.0 {
                continue;
            }
            for k in self.row_range(r) {
                out[self.col_indices[k]] += self.values[k] * br;
            }
        }
        Ok(out)
    }

    /// Sparse product `A B`.
    pub fn matmul(&self, other: &SparseMatrix) -> Result<SparseMatrix> {
        if self.cols != other.rows {
            return Err(Error::DimensionMismatch(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut acc = SparseAccumulator::new(other.cols);
        let mut out = CsrBuilder::new(self.rows, other.cols);
        for i in 0..self.rows {
            for k in self.row_range(i) {
                let a_ik = self.values[k];
                let row_k = self.col_indices[k];
                for s in other.row_range(row_k) {
                    acc.add(other.col_indices[s], a_ik * other.values[s]);
                }
            }
            acc.drain_into(&mut out)?;
        }
        Ok(out.finish())
    }

    /// Gram matrix `AᵗA`.
    ///
    /// Row `i` of the result is accumulated from the rows of `A` that touch
    /// column `i`, visited in increasing row order, so the values match
    /// `transpose().matmul(A)` exactly. Only a column index of `A` is built,
    /// never the explicit transpose followed by a second product.
    pub fn gram_matrix(&self) -> Result<SparseMatrix> {
        let n = self.cols;

        // column -> (row, position in `values`)
        let mut col_ptr = vec![0usize; n + 1];
        for &c in &self.col_indices {
            col_ptr[c + 1] += 1;
        }
        for c in 0..n {
            col_ptr[c + 1] += col_ptr[c];
        }
        let mut col_rows = Vec::new();
        let mut col_pos = Vec::new();
        col_rows.try_reserve_exact(self.nnz())?;
        col_pos.try_reserve_exact(self.nnz())?;
        col_rows.resize(self.nnz(), 0usize);
        col_pos.resize(self.nnz(), 0usize);
        let mut next = col_ptr.clone();
        for r in 0..self.rows {
            for k in self.row_range(r) {
                let c = self.col_indices[k];
                col_rows[next[c]] = r;
                col_pos[next[c]] = k;
                next[c] += 1;
            }
        }

        let mut acc = SparseAccumulator::new(n);
        let mut out = CsrBuilder::new(n, n);
        for i in 0..n {
            for t in col_ptr[i]..col_ptr[i + 1] {
                let a_ki = self.values[col_pos[t]];
                for s in self.row_range(col_rows[t]) {
                    acc.add(self.col_indices[s], a_ki * self.values[s]);
                }
            }
            acc.drain_into(&mut out)?;
        }
        Ok(out.finish())
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        if self.rows != self.cols {
            return false;
        }
        (0..self.rows).all(|r| self.row(r).all(|(c, v)| (self.get(c, r) - v).abs() <= tol))
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.rows, self.cols);
        for r in 0..self.rows {
            for (c, v) in self.row(r) {
                dense[(r, c)] = v;
            }
        }
        dense
    }
}

/// Dense-indexed scratch row used by the sparse products.
struct SparseAccumulator {
    values: Vec<f64>,
    occupied: Vec<bool>,
    touched: Vec<usize>,
}

impl SparseAccumulator {
    fn new(width: usize) -> Self {
        Self {
            values: vec![0.0; width],
            occupied: vec![false; width],
            touched: Vec::new(),
        }
    }

    #[inline]
    fn add(&mut self, col: usize, v: f64) {
        if !self.occupied[col] {
            self.occupied[col] = true;
            self.values[col] = 0.0;
            self.touched.push(col);
        }
        self.values[col] += v;
    }

    fn drain_into(&mut self, out: &mut CsrBuilder) -> Result<()> {
        self.touched.sort_unstable();
        for &c in &self.touched {
            self.occupied[c] = false;
            out.push(c, self.values[c])?;
        }
        self.touched.clear();
        out.end_row();
        Ok(())
    }
}

struct CsrBuilder {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrBuilder {
    fn new(rows: usize, cols: usize) -> Self {
        let mut row_ptr = Vec::with_capacity(rows + 1);
        row_ptr.push(0);
        Self {
            rows,
            cols,
            row_ptr,
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    fn push(&mut self, col: usize, v: f64) -> Result<()> {
        if v == 0.0 {
            return Ok(());
        }
        self.col_indices.try_reserve(1)?;
        self.values.try_reserve(1)?;
        self.col_indices.push(col);
        self.values.push(v);
        Ok(())
    }

    fn end_row(&mut self) {
        self.row_ptr.push(self.col_indices.len());
    }

    fn finish(self) -> SparseMatrix {
        SparseMatrix {
            rows: self.rows,
            cols: self.cols,
            row_ptr: self.row_ptr,
            col_indices: self.col_indices,
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(row: usize, col: usize, val: f64) -> Triplet<usize, usize, f64> {
        Triplet::new(row, col, val)
    }

    #[test]
    fn duplicates_are_summed_and_zeros_dropped() {
        let m = SparseMatrix::from_triplets(
            2,
            3,
            &[t(1, 2, 1.5), t(0, 1, 2.0), t(1, 2, 2.5), t(0, 0, 0.0), t(1, 0, 3.0), t(1, 0, -3.0)],
        )
        .unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(1, 2), 4.0);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(1, 0), 0.0);
        assert_eq!(m.row_ptr(), &[0, 1, 2]);
        assert_eq!(m.get(7, 7), 0.0);
    }

    #[test]
    fn out_of_range_triplet_is_rejected() {
        let err = SparseMatrix::from_triplets(2, 2, &[t(2, 0, 1.0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn transpose_swaps_rows_and_cols() {
        let m = SparseMatrix::from_triplets(2, 3, &[t(0, 2, 1.0), t(1, 0, 2.0), t(0, 0, 3.0)]).unwrap();
        let mt = m.transpose();
        assert_eq!((mt.rows(), mt.cols()), (3, 2));
        assert_eq!(mt.get(2, 0), 1.0);
        assert_eq!(mt.get(0, 1), 2.0);
        assert_eq!(mt.get(0, 0), 3.0);
        assert_eq!(mt.row(0).collect::<Vec<_>>(), vec![(0, 3.0), (1, 2.0)]);
        assert_eq!(mt.transpose(), m);
    }

    #[test]
    fn multiply_checks_dimensions() {
        let m = SparseMatrix::from_triplets(2, 3, &[t(0, 0, 1.0), t(0, 2, 2.0), t(1, 1, -1.0)]).unwrap();
        let y = m.multiply(&DVector::from_vec(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(y.as_slice(), &[7.0, -2.0]);
        assert!(matches!(
            m.multiply(&DVector::from_vec(vec![1.0, 2.0])),
            Err(Error::DimensionMismatch(_))
        ));

        let atb = m.transpose_multiply(&DVector::from_vec(vec![1.0, 1.0])).unwrap();
        assert_eq!(atb.as_slice(), &[1.0, -1.0, 2.0]);
    }

    #[test]
    fn gram_matches_dense_product() {
        let m = SparseMatrix::from_triplets(
            3,
            2,
            &[t(0, 0, 1.0), t(0, 1, 2.0), t(1, 1, -1.0), t(2, 0, 3.0)],
        )
        .unwrap();
        let gram = m.gram_matrix().unwrap();
        let dense = m.to_dense();
        let expected = dense.transpose() * &dense;
        assert_eq!(gram.to_dense(), expected);
        assert!(gram.is_symmetric(0.0));
        assert_eq!(m.diagonal().len(), 2);
    }

    #[test]
    fn identity_is_neutral_for_matmul() {
        let m = SparseMatrix::from_triplets(2, 2, &[t(0, 1, 4.0), t(1, 0, 5.0)]).unwrap();
        assert_eq!(SparseMatrix::identity(2).matmul(&m).unwrap(), m);
        assert!(m.matmul(&SparseMatrix::identity(3)).is_err());
        assert_eq!(SparseMatrix::zeros(3, 3).nnz(), 0);
    }
}
