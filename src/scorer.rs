//! Score a read against a template, and against a template with a single-base edit.
//!
//! After the forward and backward matrices are filled, the likelihood of an edited template
//! is computed by re-filling only a few columns around the edit: the forward matrix is
//! extended over the edited columns and linked to the untouched suffix of the backward matrix.
//! Edits too close to the ends are handled by extending only one of the two matrices.
use crate::error::{Result, ScoringError};
use crate::matrix::Matrix;
use crate::mutation::{Mutation, MutationType};
use crate::recursor::{Combiner, Recursor};
use crate::template::Template;

/// Number of columns in the extension buffer. A single-base edit needs at most four.
const EXTEND_BUFFER_COLUMNS: usize = 8;

/// Edits starting before this column are scored by extending the backward matrix.
const NEAR_BEGIN: usize = 3;

#[derive(Debug, Clone)]
pub struct MutationScorer<M: Matrix, C: Combiner> {
    recursor: Recursor<M, C>,
    alpha: M,
    beta: M,
    ext: M,
    flip_flops: usize,
    // Constant added to every score of this read.
    match_scaling: f64,
}

impl<M: Matrix, C: Combiner> MutationScorer<M, C> {
    /// Allocate the matrices and fill them.
    pub fn new(recursor: Recursor<M, C>) -> Result<Self> {
        let mut scorer = Self {
            recursor,
            alpha: M::null(),
            beta: M::null(),
            ext: M::null(),
            flip_flops: 0,
            match_scaling: 0f64,
        };
        scorer.fill()?;
        Ok(scorer)
    }
    fn fill(&mut self) -> Result<()> {
        let rlen = self.recursor.read().len();
        let tlen = self.recursor.template().len();
        self.alpha = M::new(rlen + 1, tlen + 1);
        self.beta = M::new(rlen + 1, tlen + 1);
        self.ext = M::new(rlen + 1, EXTEND_BUFFER_COLUMNS);
        self.match_scaling = match self.recursor.params().match_scaling {
            true => {
                let factor = self.template().context_parameters().match_scaling_factor();
                -factor.ln() * rlen as f64
            }
            false => 0f64,
        };
        let flip_flops = self
            .recursor
            .fill_alpha_beta(&mut self.alpha, &mut self.beta)?;
        trace!("FLIPFLOP\t{}\t{}", self.recursor.read().name, flip_flops);
        self.flip_flops = flip_flops;
        Ok(())
    }
    pub fn template(&self) -> &Template {
        self.recursor.template()
    }
    /// Mutable access to the template, to install and clear virtual edits.
    pub fn template_mut(&mut self) -> &mut Template {
        self.recursor.template_mut()
    }
    /// Replace the template and re-fill the matrices.
    pub fn set_template(&mut self, tpl: Template) -> Result<()> {
        self.recursor.set_template(tpl);
        self.fill()
    }
    pub fn recursor(&self) -> &Recursor<M, C> {
        &self.recursor
    }
    pub fn alpha(&self) -> &M {
        &self.alpha
    }
    pub fn beta(&self) -> &M {
        &self.beta
    }
    pub fn num_flip_flops(&self) -> usize {
        self.flip_flops
    }
    pub fn allocated_entries(&self) -> usize {
        self.alpha.allocated_entries() + self.beta.allocated_entries()
    }
    pub fn used_entries(&self) -> usize {
        self.alpha.used_entries() + self.beta.used_entries()
    }
    /// Log-likelihood of the read given the template.
    pub fn score(&self) -> f64 {
        self.beta.get(0, 0).ln() + self.beta.total_log_scale() + self.match_scaling
    }
    /// Log-likelihood of the read given the template with `m` applied.
    /// `m` should be installed as the virtual edit of the template beforehand.
    pub fn score_mutation(&mut self, m: &Mutation) -> Result<f64> {
        if !m.is_single_base() || 1 < m.length_diff().abs() {
            return Err(ScoringError::UnsupportedEdit(format!("{}", m)));
        }
        if !self.template().virtual_active() {
            return Err(ScoringError::Precondition("no virtual edit is installed"));
        }
        let Self {
            recursor,
            alpha,
            beta,
            ext,
            match_scaling,
            ..
        } = self;
        let rlen = recursor.read().len();
        let tlen = recursor.template().len();
        let vlen = recursor.template().virtual_len();
        let start = m.start();
        let end = match m.kind() {
            MutationType::Insertion => start,
            _ => start + 1,
        };
        let diff = m.length_diff();
        let at_begin = start < NEAR_BEGIN;
        let at_end = tlen < end + 2;
        let score = match (at_begin, at_end) {
            (true, true) => return Err(ScoringError::TemplateTooSmall { length: tlen }),
            (false, false) => {
                let last = (end as isize + diff) as usize;
                let num_columns = last + 1 - start;
                recursor.extend_alpha(alpha, start, ext, num_columns);
                let absolute = last + 1;
                let link = recursor.link_alpha_beta(ext, num_columns - 1, beta, end + 1, absolute);
                link.ln()
                    + alpha.log_prod_scales(0, start)
                    + ext.log_prod_scales(0, num_columns)
                    + beta.log_prod_scales(end + 1, tlen + 1)
            }
            (false, true) => {
                let num_columns = vlen + 1 - start;
                recursor.extend_alpha(alpha, start, ext, num_columns);
                ext.get(rlen, num_columns - 1).ln()
                    + alpha.log_prod_scales(0, start)
                    + ext.log_prod_scales(0, num_columns)
            }
            (true, false) => {
                let last = (end as isize + diff) as usize;
                recursor.extend_beta(beta, last, ext, diff);
                ext.get(0, 0).ln()
                    + ext.log_prod_scales(0, last + 1)
                    + beta.log_prod_scales(end + 1, tlen + 1)
            }
        };
        Ok(score + *match_scaling)
    }
    /// Install `m` as a virtual edit, score it, and clear the edit.
    pub fn score_virtual_mutation(&mut self, m: &Mutation) -> Result<f64> {
        self.template_mut().virtual_apply(m)?;
        let score = self.score_mutation(m);
        self.template_mut().virtual_clear();
        score
    }
}
