use super::sealed::ColumnStore;
use super::{normalize, Interval, Matrix};

/// Dense matrix. All the cells are allocated up front.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    rows: usize,
    columns: usize,
    // Column major.
    mem: Vec<f64>,
    used: Vec<Interval>,
    log_scales: Vec<f64>,
}

impl DenseMatrix {
    fn column_mut(&mut self, j: usize) -> &mut [f64] {
        &mut self.mem[j * self.rows..(j + 1) * self.rows]
    }
}

impl Matrix for DenseMatrix {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            mem: vec![0f64; rows * columns],
            used: vec![(0, 0); columns],
            log_scales: vec![0f64; columns],
        }
    }
    fn rows(&self) -> usize {
        self.rows
    }
    fn columns(&self) -> usize {
        self.columns
    }
    fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.rows && j < self.columns);
        self.mem[j * self.rows + i]
    }
    fn used_row_range(&self, j: usize) -> Interval {
        self.used[j]
    }
    fn log_scale(&self, j: usize) -> f64 {
        self.log_scales[j]
    }
    fn used_entries(&self) -> usize {
        self.used.iter().map(|&(b, e)| e.saturating_sub(b)).sum()
    }
    fn allocated_entries(&self) -> usize {
        self.mem.len()
    }
}

impl ColumnStore for DenseMatrix {
    fn reset_column(&mut self, j: usize, _begin: usize, _end: usize) {
        self.column_mut(j).iter_mut().for_each(|x| *x = 0f64);
        self.used[j] = (0, 0);
        self.log_scales[j] = 0f64;
    }
    fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(i < self.rows);
        self.column_mut(j)[i] = value;
    }
    fn finish_column(&mut self, j: usize, begin: usize, end: usize) {
        self.used[j] = (begin, end);
        self.log_scales[j] = normalize(self.column_mut(j));
    }
}
