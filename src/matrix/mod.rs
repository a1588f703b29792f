//! Column-major matrices for the forward/backward recursion.
//!
//! Each column is written inside a bracket: [Matrix::start_column] hands out a
//! [ColumnEditor], and the column gets its used row range and its scaling factor
//! when the editor is finished. After finishing, the column is divided by its maximum,
//! and the logarithm of the maximum is kept so that the true values can be recovered by
//! [Matrix::log_prod_scales].
//!
//! Raw writes are not part of the public interface.
//!
//! ```compile_fail
//! use quill::{BandedMatrix, Matrix};
//! let mut m = BandedMatrix::new(2, 2);
//! m.set(0, 0, 1f64);
//! ```
pub mod banded;
pub mod dense;
pub use banded::BandedMatrix;
pub use dense::DenseMatrix;

/// Half-open row range `[begin, end)`.
pub type Interval = (usize, usize);

/// Union of two intervals, assuming they are both non-empty.
pub fn range_union(x: Interval, y: Interval) -> Interval {
    (x.0.min(y.0), x.1.max(y.1))
}

mod sealed {
    /// Raw column storage, reachable only through [super::ColumnEditor].
    pub trait ColumnStore {
        /// Clear the `j`-th column and prepare rows `[begin, end)`.
        fn reset_column(&mut self, j: usize, begin: usize, end: usize);
        fn set(&mut self, i: usize, j: usize, value: f64);
        /// Record the used rows and normalize.
        fn finish_column(&mut self, j: usize, begin: usize, end: usize);
    }
}

pub trait Matrix: sealed::ColumnStore + Clone + std::fmt::Debug + Send + Sync {
    fn new(rows: usize, columns: usize) -> Self;
    /// Sentinel, meaning "no guide available."
    fn null() -> Self {
        Self::new(0, 0)
    }
    fn is_null(&self) -> bool {
        self.rows() == 0 && self.columns() == 0
    }
    fn rows(&self) -> usize;
    fn columns(&self) -> usize;
    /// Scaled value at `(i, j)`. Cells not written are zero.
    fn get(&self, i: usize, j: usize) -> f64;
    fn used_row_range(&self, j: usize) -> Interval;
    fn is_column_empty(&self, j: usize) -> bool {
        let (begin, end) = self.used_row_range(j);
        end <= begin
    }
    /// Logarithm of the factor the `j`-th column was divided by.
    fn log_scale(&self, j: usize) -> f64;
    /// Sum of the log scales of `[start, end)` columns.
    fn log_prod_scales(&self, start: usize, end: usize) -> f64 {
        (start..end).map(|j| self.log_scale(j)).sum()
    }
    fn total_log_scale(&self) -> f64 {
        self.log_prod_scales(0, self.columns())
    }
    /// Number of cells inside the used ranges.
    fn used_entries(&self) -> usize;
    fn allocated_entries(&self) -> usize;
    /// Open the `j`-th column. `begin` and `end` are hints; writes outside of them are fine.
    fn start_column(&mut self, j: usize, begin: usize, end: usize) -> ColumnEditor<'_, Self> {
        assert!(j < self.columns(), "{} >= {}", j, self.columns());
        self.reset_column(j, begin, end);
        ColumnEditor {
            matrix: self,
            column: j,
            finished: false,
        }
    }
}

/// Write access to one column of a matrix. Other columns are read-only.
/// Dropping an editor without calling [ColumnEditor::finish] is a bug.
#[derive(Debug)]
pub struct ColumnEditor<'a, M: Matrix> {
    matrix: &'a mut M,
    column: usize,
    finished: bool,
}

impl<'a, M: Matrix> ColumnEditor<'a, M> {
    pub fn column(&self) -> usize {
        self.column
    }
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix.get(i, j)
    }
    pub fn set(&mut self, i: usize, value: f64) {
        self.matrix.set(i, self.column, value);
    }
    pub fn finish(mut self, begin: usize, end: usize) {
        self.matrix.finish_column(self.column, begin, end);
        self.finished = true;
    }
}

impl<'a, M: Matrix> std::ops::Drop for ColumnEditor<'a, M> {
    fn drop(&mut self) {
        debug_assert!(
            self.finished || std::thread::panicking(),
            "column {} was not finished",
            self.column
        );
    }
}

/// Divide `values` by its maximum and return the log of the maximum,
/// or 0 if the maximum is zero (empty column) or already one.
pub(crate) fn normalize(values: &mut [f64]) -> f64 {
    let max = values.iter().fold(0f64, |x, &y| x.max(y));
    if 0f64 < max && max != 1f64 {
        values.iter_mut().for_each(|x| *x /= max);
        max.ln()
    } else {
        0f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn column_protocol<M: Matrix>() {
        let mut m = M::new(10, 4);
        assert!(!m.is_null());
        assert!(M::null().is_null());
        assert!((0..4).all(|j| m.is_column_empty(j)));
        let mut column = m.start_column(1, 3, 6);
        for i in 3..6 {
            column.set(i, (i as f64) * 0.5);
        }
        column.set(7, 0.25);
        column.finish(3, 8);
        assert_eq!(m.used_row_range(1), (3, 8));
        assert!(!m.is_column_empty(1));
        assert!((m.log_scale(1) - 2.5f64.ln()).abs() < 1e-12);
        assert!((m.get(5, 1) - 1f64).abs() < 1e-12);
        assert!((m.get(7, 1) - 0.1).abs() < 1e-12);
        assert_eq!(m.get(2, 1), 0f64);
        assert_eq!(m.get(5, 0), 0f64);
        assert_eq!(m.used_entries(), 5);
        assert!(m.allocated_entries() >= 5);
        // Restarting clears the column.
        let mut column = m.start_column(1, 0, 1);
        column.set(0, 1f64);
        column.finish(0, 1);
        assert_eq!(m.get(5, 1), 0f64);
        assert_eq!(m.log_scale(1), 0f64);
        let mut column = m.start_column(2, 0, 2);
        column.set(1, 0.5);
        column.finish(0, 2);
        assert!((m.log_prod_scales(0, 4) - 0.5f64.ln()).abs() < 1e-12);
        assert!((m.total_log_scale() - 0.5f64.ln()).abs() < 1e-12);
    }
    #[test]
    fn banded_columns() {
        column_protocol::<BandedMatrix>();
    }
    #[test]
    fn dense_columns() {
        column_protocol::<DenseMatrix>();
    }
    #[test]
    fn empty_column_is_not_scaled() {
        let mut values = vec![0f64; 3];
        assert_eq!(normalize(&mut values), 0f64);
        let mut values = vec![0.2, 1f64];
        assert_eq!(normalize(&mut values), 0f64);
        assert_eq!(values, vec![0.2, 1f64]);
    }
    #[test]
    fn union() {
        assert_eq!(range_union((2, 5), (4, 9)), (2, 9));
        assert_eq!(range_union((3, 4), (0, 1)), (0, 4));
    }
    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn unfinished_column() {
        let mut m = BandedMatrix::new(4, 4);
        let mut column = m.start_column(0, 0, 1);
        column.set(0, 1f64);
    }
}
