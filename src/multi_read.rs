//! Scoring mutations against many reads at once.
//!
//! Each read is aligned to a window of the forward template. A read on the reverse strand is
//! scored against the reverse complement of its window, so mutations are translated into the
//! coordinate and the orientation of each read before scored.
use crate::config::ScorerConfig;
use crate::context::ContextParameters;
use crate::error::{Result, ScoringError};
use crate::matrix::{BandedMatrix, Matrix};
use crate::mutation::{lift_position, Mutation};
use crate::read::{MappedRead, Strand};
use crate::recursor::{Combiner, Recursor, SumProduct};
use crate::scorer::MutationScorer;
use crate::template::Template;
use rayon::prelude::*;

/// The scorer used in the refinement: banded matrices with the forward algorithm.
pub type BandedMultiReadScorer = MultiReadMutationScorer<BandedMatrix, SumProduct>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddReadOutcome {
    Success,
    /// The matrices of the read could not be reconciled. The read is kept, but inactive.
    AlphaBetaMismatch,
    /// The read scored below the threshold. The read is kept, but inactive.
    BelowThreshold,
}

#[derive(Debug, Clone)]
struct ReadState<M: Matrix, C: Combiner> {
    read: MappedRead,
    scorer: Option<MutationScorer<M, C>>,
    is_active: bool,
}

impl<M: Matrix, C: Combiner> ReadState<M, C> {
    // Difference of the log-likelihood after `m` applied, if this read scores `m`.
    // Reads whose window is too small to score `m` incrementally contribute nothing.
    fn score(&mut self, m: &Mutation) -> Result<Option<f64>> {
        if !self.is_active || !read_scores_mutation(&self.read, m) {
            return Ok(None);
        }
        let scorer = match self.scorer.as_mut() {
            Some(scorer) => scorer,
            None => return Ok(None),
        };
        let oriented = oriented_mutation(&self.read, m);
        match scorer.score_virtual_mutation(&oriented) {
            Ok(score) => Ok(Some(score - scorer.score())),
            Err(why) if why.is_recoverable() => {
                trace!("SKIP\t{}\t{}\t{}", self.read.read.name, oriented, why);
                Ok(Some(0f64))
            }
            Err(why) => Err(why),
        }
    }
}

/// True if the window of `read` contains `m`.
pub fn read_scores_mutation(read: &MappedRead, m: &Mutation) -> bool {
    read.template_start <= m.start() && m.end() <= read.template_end
}

/// `m` in the coordinate of the window of `read`, on the strand of the read.
pub fn oriented_mutation(read: &MappedRead, m: &Mutation) -> Mutation {
    let local = m.shift_left(read.template_start);
    match read.strand {
        Strand::Forward => local,
        Strand::Reverse => local.reverse_complement(read.window_len()),
    }
}

/// Reads aligned to a shared template, each with its own [MutationScorer].
#[derive(Debug, Clone)]
pub struct MultiReadMutationScorer<M: Matrix, C: Combiner> {
    config: ScorerConfig,
    ctx: ContextParameters,
    fwd: Template,
    rev: Template,
    reads: Vec<ReadState<M, C>>,
}

impl<M: Matrix, C: Combiner> MultiReadMutationScorer<M, C> {
    pub fn new(config: ScorerConfig, template: &[u8]) -> Result<Self> {
        config.validate()?;
        let ctx = config.context_parameters()?;
        let fwd = Template::new(template, &ctx)?;
        let rev = fwd.reverse_complement()?;
        Ok(Self {
            config,
            ctx,
            fwd,
            rev,
            reads: vec![],
        })
    }
    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }
    pub fn context_parameters(&self) -> &ContextParameters {
        &self.ctx
    }
    pub fn template_length(&self) -> usize {
        self.fwd.len()
    }
    pub fn template(&self, strand: Strand) -> &Template {
        match strand {
            Strand::Forward => &self.fwd,
            Strand::Reverse => &self.rev,
        }
    }
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }
    pub fn read(&self, i: usize) -> &MappedRead {
        &self.reads[i].read
    }
    pub fn is_active(&self, i: usize) -> bool {
        self.reads[i].is_active
    }
    fn window_template(&self, read: &MappedRead) -> Template {
        let (start, end) = (read.template_start, read.template_end);
        match read.strand {
            Strand::Forward => self.fwd.sub_section(start, end - start),
            Strand::Reverse => self.rev.sub_section(self.fwd.len() - end, end - start),
        }
    }
    fn check_window(&self, read: &MappedRead) -> Result<()> {
        if read.template_end <= read.template_start || self.fwd.len() < read.template_end {
            let message = format!("{} is out of the template ({})", read, self.fwd.len());
            Err(ScoringError::InvalidInput(message))
        } else if !read.pin_start || !read.pin_end {
            let message = format!("{} is not pinned at both ends", read);
            Err(ScoringError::InvalidInput(message))
        } else {
            Ok(())
        }
    }
    /// Add a read. Reads failing to fill or scoring below `threshold` are kept inactive.
    /// The alignment is always pinned, so a read with an unpinned end is an error.
    pub fn add_read(&mut self, read: MappedRead, threshold: f64) -> Result<AddReadOutcome> {
        self.check_window(&read)?;
        let tpl = self.window_template(&read);
        let (params, banding) = (self.config.model, self.config.banding);
        let recursor = Recursor::new(read.read.clone(), tpl, params, banding);
        let (scorer, outcome) = match MutationScorer::new(recursor) {
            Ok(scorer) if scorer.score() < threshold => {
                debug!("BELOW\t{}\t{:.3}", read, scorer.score());
                (Some(scorer), AddReadOutcome::BelowThreshold)
            }
            Ok(scorer) => (Some(scorer), AddReadOutcome::Success),
            Err(why) if why.is_recoverable() => {
                debug!("FAILED\t{}\t{}", read, why);
                (None, AddReadOutcome::AlphaBetaMismatch)
            }
            Err(why) => return Err(why),
        };
        let is_active = outcome == AddReadOutcome::Success;
        self.reads.push(ReadState {
            read,
            scorer,
            is_active,
        });
        Ok(outcome)
    }
    /// [Self::add_read] with the threshold in the configuration.
    pub fn add_read_default(&mut self, read: MappedRead) -> Result<AddReadOutcome> {
        let threshold = self.config.add_threshold;
        self.add_read(read, threshold)
    }
    fn check_mutation(&self, m: &Mutation) -> Result<()> {
        if !m.is_single_base() {
            return Err(ScoringError::UnsupportedEdit(format!("{}", m)));
        }
        if self.fwd.len() < m.end() {
            let message = format!("{} is out of the template ({})", m, self.fwd.len());
            return Err(ScoringError::InvalidInput(message));
        }
        Ok(())
    }
    /// Sum of the differences of the log-likelihoods over the reads.
    pub fn score(&mut self, m: &Mutation) -> Result<f64> {
        self.check_mutation(m)?;
        let scores = self
            .reads
            .par_iter_mut()
            .map(|state| state.score(m))
            .collect::<Result<Vec<_>>>()?;
        Ok(scores.iter().filter_map(|&x| x).sum())
    }
    /// The difference of each read, or `unscored` if the read does not score `m`.
    pub fn scores(&mut self, m: &Mutation, unscored: f64) -> Result<Vec<f64>> {
        self.check_mutation(m)?;
        let scores = self
            .reads
            .par_iter_mut()
            .map(|state| state.score(m).map(|x| x.unwrap_or(unscored)))
            .collect::<Result<Vec<_>>>()?;
        Ok(scores)
    }
    /// Same as [Self::score], but stops as soon as the sum falls below the threshold.
    pub fn fast_score(&mut self, m: &Mutation) -> Result<f64> {
        self.check_mutation(m)?;
        let threshold = self.config.fast_score_threshold;
        let mut sum = 0f64;
        for state in self.reads.iter_mut() {
            if let Some(score) = state.score(m)? {
                sum += score;
                if sum < threshold {
                    break;
                }
            }
        }
        Ok(sum)
    }
    pub fn is_favorable(&mut self, m: &Mutation) -> Result<bool> {
        Ok(self.config.favorable_threshold < self.score(m)?)
    }
    pub fn fast_is_favorable(&mut self, m: &Mutation) -> Result<bool> {
        Ok(self.config.favorable_threshold < self.fast_score(m)?)
    }
    /// Commit the mutations to the template. The windows of the reads are lifted over,
    /// and active reads are re-filled. Reads failing to re-fill are deactivated.
    pub fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<()> {
        self.fwd.apply_mutations_in_place(mutations)?;
        self.rev = self.fwd.reverse_complement()?;
        for state in self.reads.iter_mut() {
            let read = &mut state.read;
            read.template_start = lift_position(mutations, read.template_start, false);
            read.template_end = lift_position(mutations, read.template_end, true);
            if state.is_active && read.template_end <= read.template_start {
                warn!("DEACTIVATE\t{}\tthe window vanished", read);
                state.is_active = false;
            }
        }
        let templates: Vec<_> = self
            .reads
            .iter()
            .map(|state| match state.is_active {
                true => Some(self.window_template(&state.read)),
                false => None,
            })
            .collect();
        self.reads
            .par_iter_mut()
            .zip(templates.into_par_iter())
            .for_each(|(state, tpl)| {
                if let (Some(tpl), Some(scorer)) = (tpl, state.scorer.as_mut()) {
                    if let Err(why) = scorer.set_template(tpl) {
                        warn!("DEACTIVATE\t{}\t{}", state.read, why);
                        state.is_active = false;
                    }
                }
            });
        Ok(())
    }
    /// Sum of the log-likelihoods of the active reads.
    pub fn baseline_score(&self) -> f64 {
        self.baseline_scores().iter().filter_map(|&x| x).sum()
    }
    /// The log-likelihood of each read, if active.
    pub fn baseline_scores(&self) -> Vec<Option<f64>> {
        self.reads
            .iter()
            .map(|state| match (state.is_active, state.scorer.as_ref()) {
                (true, Some(scorer)) => Some(scorer.score()),
                _ => None,
            })
            .collect()
    }
    fn scorer_stats<F: Fn(&MutationScorer<M, C>) -> usize>(&self, f: F) -> Vec<usize> {
        self.reads
            .iter()
            .map(|state| state.scorer.as_ref().map(&f).unwrap_or(0))
            .collect()
    }
    pub fn allocated_matrix_entries(&self) -> Vec<usize> {
        self.scorer_stats(|scorer| scorer.allocated_entries())
    }
    pub fn used_matrix_entries(&self) -> Vec<usize> {
        self.scorer_stats(|scorer| scorer.used_entries())
    }
    pub fn num_flip_flops(&self) -> Vec<usize> {
        self.scorer_stats(|scorer| scorer.num_flip_flops())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Snr;
    use crate::gen_seq;
    use crate::matrix::DenseMatrix;
    use crate::read::Read;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;
    fn config() -> ScorerConfig {
        ScorerConfig::new(Snr::new(10., 7., 5., 11.))
    }
    fn random_mutation<R: Rng>(rng: &mut R, template: &[u8]) -> Mutation {
        let pos = rng.gen_range(0..template.len());
        let base = b"ACGT"[rng.gen_range(0..4)];
        match rng.gen_range(0..3) {
            0 if template[pos] != base => Mutation::substitution(pos, &[base]),
            0 | 1 => Mutation::insertion(pos, &[base]),
            _ => Mutation::deletion(pos, 1),
        }
    }
    fn mutated_scorer(reads: &[MappedRead], tpl: &[u8], m: &Mutation) -> BandedMultiReadScorer {
        let mutated = crate::mutation::apply_mutations(&[m.clone()], tpl);
        let mut mms = BandedMultiReadScorer::new(config(), &mutated).unwrap();
        let ms = [m.clone()];
        for read in reads.iter().cloned() {
            let mut read = read;
            read.template_start = lift_position(&ms, read.template_start, false);
            read.template_end = lift_position(&ms, read.template_end, true);
            mms.add_read_default(read).unwrap();
        }
        mms
    }
    #[test]
    fn score_is_sum_of_reads() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4820);
        let template = gen_seq::generate_seq(&mut rng, 80);
        let reads = gen_seq::simulate_reads(&template, &mut rng, 10, &gen_seq::CCS_PROFILE);
        assert!(reads.iter().any(|r| r.strand == Strand::Reverse));
        let mut mms = BandedMultiReadScorer::new(config(), &template).unwrap();
        for read in reads.iter().cloned() {
            mms.add_read_default(read).unwrap();
        }
        let before = mms.baseline_scores();
        for _ in 0..20 {
            let m = random_mutation(&mut rng, &template);
            let scores = mms.scores(&m, 0f64).unwrap();
            let after = mutated_scorer(&reads, &template, &m).baseline_scores();
            for ((&score, x), y) in scores.iter().zip(before.iter()).zip(after.iter()) {
                if let (Some(x), Some(y)) = (x, y) {
                    assert!((score - (y - x)).abs() < 1e-3, "{},{},{},{}", m, score, x, y);
                }
            }
            let total = mms.score(&m).unwrap();
            let sum: f64 = scores.iter().sum();
            assert!((total - sum).abs() < 1e-6, "{},{}", total, sum);
        }
    }
    #[test]
    fn uncovered_mutation_scores_zero() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(11);
        let template = gen_seq::generate_seq(&mut rng, 60);
        let mut mms = BandedMultiReadScorer::new(config(), &template).unwrap();
        let window = &template[10..40];
        let read = Read::new("read", window).unwrap();
        let outcome = mms.add_read_default(MappedRead::new(read, Strand::Forward, 10, 40));
        assert_eq!(outcome.unwrap(), AddReadOutcome::Success);
        let m = Mutation::substitution(50, &[gen_seq::complement(template[50])]);
        assert_eq!(mms.score(&m).unwrap(), 0f64);
        assert_eq!(mms.scores(&m, -1f64).unwrap(), vec![-1f64]);
        let m = Mutation::substitution(20, &[gen_seq::complement(template[20])]);
        assert!(mms.score(&m).unwrap() < 0f64);
        assert!(!mms.is_favorable(&m).unwrap());
    }
    #[test]
    fn reverse_strand() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(392);
        let template = gen_seq::generate_seq(&mut rng, 50);
        let mut forward = BandedMultiReadScorer::new(config(), &template).unwrap();
        let mut reverse = BandedMultiReadScorer::new(config(), &template).unwrap();
        let read = template[5..45].to_vec();
        let fwd_read = Read::new("fwd", &read).unwrap();
        let fwd_read = MappedRead::new(fwd_read, Strand::Forward, 5, 45);
        forward.add_read_default(fwd_read).unwrap();
        let rev_read = Read::new("rev", &gen_seq::reverse_complement(&read)).unwrap();
        let rev_read = MappedRead::new(rev_read, Strand::Reverse, 5, 45);
        reverse.add_read_default(rev_read).unwrap();
        assert!(forward.is_active(0) && reverse.is_active(0));
        for pos in 5..45 {
            let base = gen_seq::complement(template[pos]);
            for m in vec![
                Mutation::substitution(pos, &[base]),
                Mutation::insertion(pos, &[base]),
                Mutation::deletion(pos, 1),
            ] {
                let x = forward.score(&m).unwrap();
                let y = reverse.score(&m).unwrap();
                assert!(x < 0f64 && y < 0f64, "{},{},{}", m, x, y);
            }
        }
        assert_eq!(reverse.template(Strand::Reverse).seq().len(), 50);
        let rc = gen_seq::reverse_complement(reverse.template(Strand::Forward).seq());
        assert_eq!(reverse.template(Strand::Reverse).seq(), rc.as_slice());
    }
    #[test]
    fn oriented() {
        let read = Read::new("read", b"ACGTACGT").unwrap();
        let read = MappedRead::new(read, Strand::Reverse, 10, 18);
        let m = Mutation::substitution(11, b"A");
        assert!(read_scores_mutation(&read, &m));
        assert_eq!(oriented_mutation(&read, &m), Mutation::substitution(6, b"T"));
        let m = Mutation::insertion(18, b"C");
        assert!(read_scores_mutation(&read, &m));
        assert_eq!(oriented_mutation(&read, &m), Mutation::insertion(0, b"G"));
        let m = Mutation::deletion(17, 2);
        assert!(!read_scores_mutation(&read, &m));
        assert!(!read_scores_mutation(&read, &Mutation::deletion(9, 1)));
    }
    #[test]
    fn apply_mutations() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(34);
        let template = gen_seq::generate_seq(&mut rng, 100);
        let reads = gen_seq::simulate_reads(&template, &mut rng, 8, &gen_seq::CCS_PROFILE);
        let mut mms = BandedMultiReadScorer::new(config(), &template).unwrap();
        for read in reads.iter().cloned() {
            mms.add_read_default(read).unwrap();
        }
        let mutations = vec![
            Mutation::insertion(20, b"A"),
            Mutation::deletion(50, 1),
            Mutation::substitution(70, &[gen_seq::complement(template[70])]),
        ];
        let expected = crate::mutation::apply_mutations(&mutations, &template);
        let mut reference = BandedMultiReadScorer::new(config(), &expected).unwrap();
        for read in reads.iter().cloned() {
            let mut read = read;
            read.template_start = lift_position(&mutations, read.template_start, false);
            read.template_end = lift_position(&mutations, read.template_end, true);
            reference.add_read_default(read).unwrap();
        }
        mms.apply_mutations(&mutations).unwrap();
        assert_eq!(mms.template(Strand::Forward).seq(), expected.as_slice());
        assert_eq!(mms.template_length(), 100);
        for i in 0..mms.num_reads() {
            assert_eq!(mms.read(i), reference.read(i));
        }
        let xs = mms.baseline_scores();
        let ys = reference.baseline_scores();
        for (x, y) in xs.iter().zip(ys.iter()) {
            if let (Some(x), Some(y)) = (x, y) {
                assert!((x - y).abs() < 1e-6, "{},{}", x, y);
            }
        }
        assert!(mms.apply_mutations(&[Mutation::deletion(100, 1)]).is_err());
    }
    #[test]
    fn add_read_outcomes() {
        let template = b"ACGTACGTTTGACAGT";
        let mut mms = BandedMultiReadScorer::new(config(), template).unwrap();
        let read = Read::new("read", template).unwrap();
        let outcome = mms.add_read(MappedRead::new(read.clone(), Strand::Forward, 0, 16), 0f64);
        assert_eq!(outcome.unwrap(), AddReadOutcome::BelowThreshold);
        assert!(!mms.is_active(0));
        let hopeless = Read::new("hopeless", b"A").unwrap();
        let outcome = mms.add_read_default(MappedRead::new(hopeless, Strand::Forward, 0, 8));
        assert_eq!(outcome.unwrap(), AddReadOutcome::AlphaBetaMismatch);
        assert!(!mms.is_active(1));
        let outcome = mms.add_read_default(MappedRead::new(read.clone(), Strand::Forward, 0, 17));
        assert!(matches!(outcome, Err(ScoringError::InvalidInput(_))));
        let mut unpinned = MappedRead::new(read.clone(), Strand::Forward, 0, 16);
        unpinned.pin_end = false;
        let outcome = mms.add_read_default(unpinned);
        assert!(matches!(outcome, Err(ScoringError::InvalidInput(_))));
        let outcome = mms.add_read_default(MappedRead::new(read.clone(), Strand::Forward, 0, 16));
        assert_eq!(outcome.unwrap(), AddReadOutcome::Success);
        assert_eq!(mms.num_reads(), 3);
        assert_eq!(mms.allocated_matrix_entries()[1], 0);
        assert!(mms.allocated_matrix_entries()[2] >= mms.used_matrix_entries()[2]);
        assert_eq!(mms.num_flip_flops().len(), 3);
        assert_eq!(mms.baseline_scores()[0], None);
        assert!(mms.baseline_score() < 0f64);
        let m = Mutation::insertion(3, b"AA");
        assert!(matches!(mms.score(&m), Err(ScoringError::UnsupportedEdit(_))));
    }
    #[test]
    fn single_base_window() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(41);
        let template = gen_seq::generate_seq(&mut rng, 30);
        let mut mms = BandedMultiReadScorer::new(config(), &template).unwrap();
        let mut reference = BandedMultiReadScorer::new(config(), &template).unwrap();
        let full = Read::new("full", &template).unwrap();
        let full = MappedRead::new(full, Strand::Forward, 0, 30);
        mms.add_read_default(full.clone()).unwrap();
        reference.add_read_default(full).unwrap();
        let tiny = Read::new("tiny", &template[14..15]).unwrap();
        mms.add_read_default(MappedRead::new(tiny, Strand::Forward, 14, 15)).unwrap();
        let base = gen_seq::complement(template[14]);
        for m in vec![
            Mutation::deletion(14, 1),
            Mutation::substitution(14, &[base]),
            Mutation::insertion(14, &[base]),
            Mutation::insertion(15, &[base]),
        ] {
            let x = mms.score(&m).unwrap();
            let y = reference.score(&m).unwrap();
            assert!((x - y).abs() < 1e-9, "{},{},{}", m, x, y);
        }
    }
    #[test]
    fn fast_score() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(2);
        let template = gen_seq::generate_seq(&mut rng, 60);
        let reads = gen_seq::simulate_reads(&template, &mut rng, 6, &gen_seq::CCS_PROFILE);
        let mut unbounded = config();
        unbounded.fast_score_threshold = f64::NEG_INFINITY;
        let mut mms = BandedMultiReadScorer::new(config(), &template).unwrap();
        let mut reference: MultiReadMutationScorer<DenseMatrix, SumProduct> =
            MultiReadMutationScorer::new(unbounded, &template).unwrap();
        for read in reads {
            mms.add_read_default(read.clone()).unwrap();
            reference.add_read_default(read).unwrap();
        }
        let threshold = mms.config().fast_score_threshold;
        for _ in 0..20 {
            let m = random_mutation(&mut rng, &template);
            let full = mms.score(&m).unwrap();
            let fast = mms.fast_score(&m).unwrap();
            if full < threshold {
                assert!(fast < threshold, "{},{},{}", m, full, fast);
            }
            if threshold <= fast {
                assert!((full - fast).abs() < 1e-6, "{},{},{}", m, full, fast);
            }
            let fast = reference.fast_score(&m).unwrap();
            assert!((full - fast).abs() < 1e-3, "{},{},{}", m, full, fast);
            let favorable = mms.fast_is_favorable(&m).unwrap();
            assert!(!favorable || mms.config().favorable_threshold < full);
        }
    }
}
