//! Banded forward/backward recursion between a read and a template.
//!
//! Rows are read positions and columns are template positions, both shifted by one so that
//! the 0-th row/column is the empty prefix. The alignment is pinned: it starts with a match
//! between the first bases and ends with a match between the last bases.
//! Moving out of the `j`-th template base uses the transition parameters of `j`.
//! Each column is normalized by its maximum, so values are not in log scale.
use crate::config::{BandingOptions, ModelParams};
use crate::context::TransitionParameters;
use crate::error::{Result, ScoringError};
use crate::matrix::{range_union, ColumnEditor, Interval, Matrix};
use crate::read::Read;
use crate::template::Template;
use std::marker::PhantomData;

/// Tolerance of `|alpha - beta|` in log scale.
const ALPHA_BETA_MISMATCH_TOLERANCE: f64 = 0.001;
const MAX_FLIP_FLOPS: usize = 5;
/// If more than this fraction of the matrix is used, re-band the matrices three more times.
const REBANDING_THRESHOLD: f64 = 0.04;
/// Initial width of the band at the end of the backward recursion.
const BETA_INITIAL_BAND: usize = 25;

/// How to combine the probabilities of different paths.
pub trait Combiner: Clone + Copy + Default + std::fmt::Debug + Send + Sync {
    fn combine(x: f64, y: f64) -> f64;
}

/// Forward algorithm. Sums up all the paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumProduct;

impl Combiner for SumProduct {
    fn combine(x: f64, y: f64) -> f64 {
        x + y
    }
}

/// Viterbi algorithm. Takes the best path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Viterbi;

impl Combiner for Viterbi {
    fn combine(x: f64, y: f64) -> f64 {
        x.max(y)
    }
}

/// The recursion over one read and one template.
#[derive(Debug, Clone)]
pub struct Recursor<M: Matrix, C: Combiner> {
    read: Read,
    tpl: Template,
    params: ModelParams,
    banding: BandingOptions,
    _marker: PhantomData<fn() -> (M, C)>,
}

impl<M: Matrix, C: Combiner> Recursor<M, C> {
    pub fn new(read: Read, tpl: Template, params: ModelParams, banding: BandingOptions) -> Self {
        Self {
            read,
            tpl,
            params,
            banding,
            _marker: PhantomData,
        }
    }
    pub fn read(&self) -> &Read {
        &self.read
    }
    pub fn template(&self) -> &Template {
        &self.tpl
    }
    pub fn template_mut(&mut self) -> &mut Template {
        &mut self.tpl
    }
    pub fn set_template(&mut self, tpl: Template) {
        self.tpl = tpl;
    }
    pub fn params(&self) -> &ModelParams {
        &self.params
    }
    fn emission(&self, read_base: u8, tpl_base: u8) -> f64 {
        if read_base == tpl_base {
            self.params.pr_not_miscall()
        } else {
            self.params.pr_third_of_miscall()
        }
    }
    // An inserted base is compared with the next template base.
    fn insertion(trans: &TransitionParameters, matches_next: bool) -> f64 {
        if matches_next {
            trans.branch
        } else {
            trans.stick / 3f64
        }
    }
    // Rows within the band of the j-th column of `m`, trimmed to the cells above the
    // max / exp(score_diff).
    fn row_range(&self, j: usize, m: &M) -> Interval {
        let (begin, end) = m.used_row_range(j);
        let (max_row, max_score) = (begin..end)
            .map(|i| (i, m.get(i, j)))
            .fold((begin, m.get(begin, j)), |(mr, ms), (i, s)| {
                if ms < s {
                    (i, s)
                } else {
                    (mr, ms)
                }
            });
        let threshold = max_score / self.banding.score_diff.exp();
        let start = (begin..max_row)
            .find(|&i| threshold <= m.get(i, j))
            .unwrap_or(max_row);
        let end = (max_row..end)
            .rev()
            .find(|&i| threshold <= m.get(i, j))
            .map(|i| i + 1)
            .unwrap_or(max_row + 1);
        (start, end)
    }
    // Merge the hint with the bands of the guide and of the previous fill of the matrix itself.
    fn range_guide(&self, j: usize, guide: &M, matrix: &M, hint: Interval) -> Interval {
        let mut interval = hint;
        if !guide.is_null() && !guide.is_column_empty(j) {
            interval = range_union(self.row_range(j, guide), interval);
        }
        if !matrix.is_column_empty(j) {
            interval = range_union(self.row_range(j, matrix), interval);
        }
        interval
    }
    /// Fill the forward matrix. `guide` is used to widen the band, and can be null.
    pub fn fill_alpha(&self, guide: &M, alpha: &mut M) {
        let read = self.read.seq.as_slice();
        let (rlen, tlen) = (read.len(), self.tpl.len());
        assert!(alpha.rows() == rlen + 1 && alpha.columns() == tlen + 1);
        assert!(guide.is_null() || (guide.rows() == rlen + 1 && guide.columns() == tlen + 1));
        let score_diff = self.banding.score_diff.exp();
        let mut column = alpha.start_column(0, 0, 1);
        column.set(0, 1f64);
        column.finish(0, 1);
        let mut hint = (1, rlen - 1);
        let mut prev_trans = TransitionParameters::zero();
        for j in 1..tlen {
            let (cur_base, cur_trans) = self.tpl.get(j - 1);
            let next_base = self.tpl.get(j).0;
            let (begin, end) = self.range_guide(j, guide, alpha, hint);
            let required_end = end.min(rlen);
            let mut column = alpha.start_column(j, begin, end);
            let (mut max, mut threshold, mut score) = (0f64, 0f64, 0f64);
            let mut i = begin;
            while i < rlen && (threshold <= score || i < required_end) {
                let read_base = read[i - 1];
                let emission = self.emission(read_base, cur_base);
                score = 0f64;
                if i == 1 && j == 1 {
                    score = C::combine(score, column.get(0, 0) * emission);
                } else if i != 1 && j != 1 {
                    let mat = column.get(i - 1, j - 1) * emission * prev_trans.mat;
                    score = C::combine(score, mat);
                }
                if 1 < i {
                    let ins = Self::insertion(&cur_trans, read_base == next_base);
                    score = C::combine(score, column.get(i - 1, j) * ins);
                }
                if 1 < j {
                    score = C::combine(score, column.get(i, j - 1) * prev_trans.del);
                }
                column.set(i, score);
                if max < score {
                    max = score;
                    threshold = max / score_diff;
                }
                i += 1;
            }
            let end = i;
            column.finish(begin, end);
            // Values are normalized by `max` now.
            let cutoff = if 0f64 < max { score_diff.recip() } else { 0f64 };
            let next_begin = (begin..end)
                .find(|&i| cutoff <= alpha.get(i, j))
                .unwrap_or(end);
            let next_end = (next_begin..end)
                .rev()
                .find(|&i| cutoff <= alpha.get(i, j))
                .map(|i| i + 1)
                .unwrap_or(end);
            hint = (next_begin, next_end);
            prev_trans = cur_trans;
        }
        let last_base = self.tpl.get(tlen - 1).0;
        let emission = self.emission(read[rlen - 1], last_base);
        let mut column = alpha.start_column(tlen, rlen, rlen + 1);
        let value = column.get(rlen - 1, tlen - 1) * emission;
        column.set(rlen, value);
        column.finish(rlen, rlen + 1);
    }
    /// Fill the backward matrix. `guide` is used to widen the band, and can be null.
    pub fn fill_beta(&self, guide: &M, beta: &mut M) {
        let read = self.read.seq.as_slice();
        let (rlen, tlen) = (read.len(), self.tpl.len());
        assert!(beta.rows() == rlen + 1 && beta.columns() == tlen + 1);
        assert!(guide.is_null() || (guide.rows() == rlen + 1 && guide.columns() == tlen + 1));
        let score_diff = self.banding.score_diff.exp();
        let mut column = beta.start_column(tlen, rlen, rlen + 1);
        column.set(rlen, 1f64);
        column.finish(rlen, rlen + 1);
        let mut hint = (rlen.saturating_sub(BETA_INITIAL_BAND), rlen);
        for j in (1..tlen).rev() {
            let next_base = self.tpl.get(j).0;
            let cur_trans = self.tpl.get(j - 1).1;
            let (begin, end) = self.range_guide(j, guide, beta, hint);
            let required_begin = begin;
            let mut column = beta.start_column(j, begin, end);
            let (mut max, mut threshold, mut score) = (0f64, 0f64, 0f64);
            let mut i = end.saturating_sub(1);
            while 0 < i && (threshold <= score || required_begin <= i) {
                let matches_next = read[i] == next_base;
                let match_prev = column.get(i + 1, j + 1) * self.emission(read[i], next_base);
                score = 0f64;
                if i + 1 < rlen {
                    score = C::combine(score, match_prev * cur_trans.mat);
                } else if i + 1 == rlen && j + 1 == tlen {
                    score = C::combine(score, match_prev);
                }
                if 0 < i && i + 1 < rlen {
                    let ins = Self::insertion(&cur_trans, matches_next);
                    score = C::combine(score, column.get(i + 1, j) * ins);
                }
                if 0 < j && j + 1 < tlen {
                    score = C::combine(score, column.get(i, j + 1) * cur_trans.del);
                }
                column.set(i, score);
                if max < score {
                    max = score;
                    threshold = max / score_diff;
                }
                i -= 1;
            }
            let begin = i + 1;
            column.finish(begin, end);
            let cutoff = if 0f64 < max { score_diff.recip() } else { 0f64 };
            let next_end = (begin..end)
                .rev()
                .find(|&i| cutoff <= beta.get(i, j))
                .map(|i| i + 1)
                .unwrap_or(begin);
            hint = (begin, next_end);
        }
        let first_base = self.tpl.get(0).0;
        let emission = self.emission(read[0], first_base);
        let mut column = beta.start_column(0, 0, 1);
        let value = emission * column.get(1, 1);
        column.set(0, value);
        column.finish(0, 1);
    }
    /// Fill both matrices until they agree, and return the number of re-fills (flip-flops).
    pub fn fill_alpha_beta(&self, alpha: &mut M, beta: &mut M) -> Result<usize> {
        let (rlen, tlen) = (self.read.len(), self.tpl.len());
        self.fill_alpha(&M::null(), alpha);
        self.fill_beta(alpha, beta);
        let mut flip_flops = 0;
        let max_size = (0.5 + REBANDING_THRESHOLD * ((rlen + 1) * (tlen + 1)) as f64) as usize;
        if max_size <= alpha.used_entries() || max_size <= beta.used_entries() {
            self.fill_alpha(beta, alpha);
            self.fill_beta(alpha, beta);
            self.fill_alpha(beta, alpha);
            flip_flops += 3;
        }
        let mut alpha_score = alpha.get(rlen, tlen).ln() + alpha.total_log_scale();
        let mut beta_score = beta.get(0, 0).ln() + beta.total_log_scale();
        while ALPHA_BETA_MISMATCH_TOLERANCE < (alpha_score - beta_score).abs()
            && flip_flops <= MAX_FLIP_FLOPS
        {
            if flip_flops % 2 == 0 {
                self.fill_alpha(beta, alpha);
            } else {
                self.fill_beta(alpha, beta);
            }
            flip_flops += 1;
            alpha_score = alpha.get(rlen, tlen).ln() + alpha.total_log_scale();
            beta_score = beta.get(0, 0).ln() + beta.total_log_scale();
        }
        let consistent = (1f64 - alpha_score / beta_score).abs() <= ALPHA_BETA_MISMATCH_TOLERANCE;
        if !consistent || !alpha_score.is_finite() || !beta_score.is_finite() {
            return Err(ScoringError::AlphaBetaMismatch {
                alpha: alpha_score,
                beta: beta_score,
                flip_flops,
            });
        }
        Ok(flip_flops)
    }
    // Rows to fill at the j-th column of the virtual template, borrowed from the
    // neighboring columns of the original matrix. This is not exact around indels.
    fn extend_alpha_range(alpha: &M, j: usize, rlen: usize, tlen: usize) -> Interval {
        let range = (j - 1..=j + 1)
            .filter(|&k| 1 <= k && k < tlen && !alpha.is_column_empty(k))
            .map(|k| alpha.used_row_range(k))
            .fold(None, |acc: Option<Interval>, x| match acc {
                Some(acc) => Some(range_union(acc, x)),
                None => Some(x),
            });
        let (begin, mut end) = range.unwrap_or((1, rlen));
        if tlen <= j + 2 {
            end = rlen;
        }
        (begin.max(1), end.min(rlen))
    }
    /// Fill `num_columns` columns of `ext` by the forward recursion on the virtual template,
    /// from the `begin_column`-th column. The preceding column is taken from `alpha`.
    pub fn extend_alpha(&self, alpha: &M, begin_column: usize, ext: &mut M, num_columns: usize) {
        let read = self.read.seq.as_slice();
        let rlen = read.len();
        let (tlen, vlen) = (self.tpl.len(), self.tpl.virtual_len());
        assert!(num_columns <= ext.columns() && 1 <= begin_column);
        for c in 0..num_columns {
            let j = begin_column + c;
            if j == vlen {
                let last_base = self.tpl.get_virtual(j - 1).0;
                let emission = self.emission(read[rlen - 1], last_base);
                let mut column = ext.start_column(c, rlen, rlen + 1);
                let value = previous_column(alpha, &column, c, j, rlen - 1) * emission;
                column.set(rlen, value);
                column.finish(rlen, rlen + 1);
                continue;
            }
            let (begin, end) = Self::extend_alpha_range(alpha, j, rlen, tlen);
            let (cur_base, cur_trans) = self.tpl.get_virtual(j - 1);
            let prev_trans = match j {
                1 => TransitionParameters::zero(),
                _ => self.tpl.get_virtual(j - 2).1,
            };
            let next_base = self.tpl.get_virtual(j).0;
            let mut column = ext.start_column(c, begin, end);
            for i in begin..end {
                let read_base = read[i - 1];
                let emission = self.emission(read_base, cur_base);
                let mut score = 0f64;
                if i == 1 && j == 1 {
                    let start = previous_column(alpha, &column, c, j, 0);
                    score = C::combine(score, start * emission);
                } else if i != 1 && j != 1 {
                    let diagonal = previous_column(alpha, &column, c, j, i - 1);
                    score = C::combine(score, diagonal * prev_trans.mat * emission);
                }
                if 1 < i {
                    let ins = Self::insertion(&cur_trans, read_base == next_base);
                    score = C::combine(score, column.get(i - 1, c) * ins);
                }
                if 1 < j {
                    let left = previous_column(alpha, &column, c, j, i);
                    score = C::combine(score, left * prev_trans.del);
                }
                column.set(i, score);
            }
            column.finish(begin, end);
        }
    }
    fn extend_beta_range(beta: &M, j: usize, rlen: usize, tlen: usize, diff: isize) -> Interval {
        let original = (j as isize - diff) as usize;
        let range = (original.saturating_sub(1)..=original + 1)
            .filter(|&k| 1 <= k && k < tlen && !beta.is_column_empty(k))
            .map(|k| beta.used_row_range(k))
            .fold(None, |acc: Option<Interval>, x| match acc {
                Some(acc) => Some(range_union(acc, x)),
                None => Some(x),
            });
        let (mut begin, end) = range.unwrap_or((1, rlen));
        if original <= 2 {
            begin = 1;
        }
        (begin.max(1), end.min(rlen))
    }
    /// Fill `[0, last_column]` columns of `ext` by the backward recursion on the virtual
    /// template. The column after `last_column` is the `last_column + 1 - length_diff`-th
    /// column of `beta`.
    pub fn extend_beta(&self, beta: &M, last_column: usize, ext: &mut M, length_diff: isize) {
        let read = self.read.seq.as_slice();
        let rlen = read.len();
        let (tlen, vlen) = (self.tpl.len(), self.tpl.virtual_len());
        assert!(last_column < ext.columns());
        for j in (0..=last_column).rev() {
            if j == 0 {
                let first_base = self.tpl.get_virtual(0).0;
                let emission = self.emission(read[0], first_base);
                let mut column = ext.start_column(0, 0, 1);
                let next = next_column(beta, &column, 0, 1, last_column, length_diff);
                let value = emission * next;
                column.set(0, value);
                column.finish(0, 1);
                continue;
            }
            let (begin, end) = Self::extend_beta_range(beta, j, rlen, tlen, length_diff);
            let next_base = self.tpl.get_virtual(j).0;
            let cur_trans = self.tpl.get_virtual(j - 1).1;
            let mut column = ext.start_column(j, begin, end);
            for i in (begin..end).rev() {
                let matches_next = read[i] == next_base;
                let diagonal = next_column(beta, &column, j, i + 1, last_column, length_diff);
                let match_prev = diagonal * self.emission(read[i], next_base);
                let mut score = 0f64;
                if i + 1 < rlen {
                    score = C::combine(score, match_prev * cur_trans.mat);
                } else if i + 1 == rlen && j + 1 == vlen {
                    score = C::combine(score, match_prev);
                }
                if 0 < i && i + 1 < rlen {
                    let ins = Self::insertion(&cur_trans, matches_next);
                    score = C::combine(score, column.get(i + 1, j) * ins);
                }
                if 0 < j && j + 1 < vlen {
                    let right = next_column(beta, &column, j, i, last_column, length_diff);
                    score = C::combine(score, right * cur_trans.del);
                }
                column.set(i, score);
            }
            column.finish(begin, end);
        }
    }
    /// Join the `ext_column`-th column of `ext` with the `beta_column`-th column of `beta`.
    /// `absolute_column` is the position of the beta column in the virtual template.
    /// Returns the scaled likelihood.
    pub fn link_alpha_beta(
        &self,
        ext: &M,
        ext_column: usize,
        beta: &M,
        beta_column: usize,
        absolute_column: usize,
    ) -> f64 {
        let read = self.read.seq.as_slice();
        let rlen = read.len();
        let (begin, end) = ext.used_row_range(ext_column);
        let cur_base = self.tpl.get_virtual(absolute_column - 1).0;
        let prev_trans = self.tpl.get_virtual(absolute_column - 2).1;
        let mut score = 0f64;
        for i in begin..end {
            let forward = ext.get(i, ext_column);
            if i < rlen {
                let emission = self.emission(read[i], cur_base);
                let mat = forward * prev_trans.mat * emission * beta.get(i + 1, beta_column);
                score = C::combine(score, mat);
            }
            score = C::combine(score, forward * prev_trans.del * beta.get(i, beta_column));
        }
        score
    }
}

// The `c-1`-th column of the extension, or the column before the extension in `alpha`.
fn previous_column<M: Matrix>(
    alpha: &M,
    ext: &ColumnEditor<M>,
    c: usize,
    j: usize,
    i: usize,
) -> f64 {
    match c {
        0 => alpha.get(i, j - 1),
        _ => ext.get(i, c - 1),
    }
}

// The `c+1`-th column of the extension, or the column after the extension in `beta`.
fn next_column<M: Matrix>(
    beta: &M,
    ext: &ColumnEditor<M>,
    c: usize,
    i: usize,
    last_column: usize,
    length_diff: isize,
) -> f64 {
    if c < last_column {
        ext.get(i, c + 1)
    } else {
        beta.get(i, (c as isize + 1 - length_diff) as usize)
    }
}
