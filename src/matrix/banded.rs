use super::sealed::ColumnStore;
use super::{normalize, Interval, Matrix};

#[derive(Debug, Clone, Default)]
struct Column {
    // Row index of values[0].
    offset: usize,
    values: Vec<f64>,
    used: Interval,
    log_scale: f64,
}

/// Sparse matrix. Each column only allocates the span of rows written into it,
/// growing on demand if a write falls outside of it.
#[derive(Debug, Clone)]
pub struct BandedMatrix {
    rows: usize,
    columns: Vec<Column>,
}

impl Matrix for BandedMatrix {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns: vec![Column::default(); columns],
        }
    }
    fn rows(&self) -> usize {
        self.rows
    }
    fn columns(&self) -> usize {
        self.columns.len()
    }
    fn get(&self, i: usize, j: usize) -> f64 {
        let column = &self.columns[j];
        match i.checked_sub(column.offset) {
            Some(idx) => column.values.get(idx).copied().unwrap_or(0f64),
            None => 0f64,
        }
    }
    fn used_row_range(&self, j: usize) -> Interval {
        self.columns[j].used
    }
    fn log_scale(&self, j: usize) -> f64 {
        self.columns[j].log_scale
    }
    fn used_entries(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.used.1.saturating_sub(c.used.0))
            .sum()
    }
    fn allocated_entries(&self) -> usize {
        self.columns.iter().map(|c| c.values.capacity()).sum()
    }
}

impl ColumnStore for BandedMatrix {
    fn reset_column(&mut self, j: usize, begin: usize, end: usize) {
        let column = &mut self.columns[j];
        column.offset = begin;
        column.values.clear();
        column.values.resize(end.saturating_sub(begin), 0f64);
        column.used = (0, 0);
        column.log_scale = 0f64;
    }
    fn set(&mut self, i: usize, j: usize, value: f64) {
        debug_assert!(i < self.rows);
        let column = &mut self.columns[j];
        if column.values.is_empty() {
            column.offset = i;
        } else if i < column.offset {
            let pad = column.offset - i;
            column
                .values
                .splice(0..0, std::iter::repeat(0f64).take(pad));
            column.offset = i;
        }
        let idx = i - column.offset;
        if column.values.len() <= idx {
            column.values.resize(idx + 1, 0f64);
        }
        column.values[idx] = value;
    }
    fn finish_column(&mut self, j: usize, begin: usize, end: usize) {
        let column = &mut self.columns[j];
        column.used = (begin, end);
        column.log_scale = normalize(&mut column.values);
    }
}
