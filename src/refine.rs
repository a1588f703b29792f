//! Greedy refinement of a consensus by single-base mutations.
use crate::error::Result;
use crate::matrix::Matrix;
use crate::multi_read::MultiReadMutationScorer;
use crate::mutation::{apply_mutations, lift_position, Mutation, ScoredMutation};
use crate::read::Strand;
use crate::recursor::Combiner;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

const MAX_QV: u8 = 93;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineOptions {
    pub maximum_iterations: usize,
    /// Mutations applied in the same round are at least this far apart.
    pub mutation_separation: usize,
    /// After the first round, only mutations this close to the last favorable ones are tried.
    pub mutation_neighborhood: usize,
}

impl std::default::Default for RefineOptions {
    fn default() -> Self {
        Self {
            maximum_iterations: 40,
            mutation_separation: 10,
            mutation_neighborhood: 20,
        }
    }
}

/// Every single-base substitution, insertion, and deletion of `tpl`.
pub fn all_single_base_mutations(tpl: &[u8]) -> Vec<Mutation> {
    let mut mutations = vec![];
    for (pos, &base) in tpl.iter().enumerate() {
        for &new_base in b"ACGT" {
            mutations.push(Mutation::insertion(pos, &[new_base]));
            if new_base != base {
                mutations.push(Mutation::substitution(pos, &[new_base]));
            }
        }
        mutations.push(Mutation::deletion(pos, 1));
    }
    for &new_base in b"ACGT" {
        mutations.push(Mutation::insertion(tpl.len(), &[new_base]));
    }
    mutations
}

/// Single-base mutations starting in `[start, end)`, skipping the ones giving the same
/// template as another. In a homopolymer, only the deletion of its first base is kept,
/// and insertions extending a homopolymer are only tried at its beginning.
/// Insertions at the end of the template are included if `end` is the length of `tpl`.
pub fn mutations_in_range(tpl: &[u8], start: usize, end: usize) -> Vec<Mutation> {
    let end = end.min(tpl.len());
    let mut mutations = vec![];
    let is_new_insertion = |pos: usize, base: u8| pos == 0 || tpl[pos - 1] != base;
    for pos in start..end {
        let base = tpl[pos];
        for &new_base in b"ACGT" {
            if is_new_insertion(pos, new_base) {
                mutations.push(Mutation::insertion(pos, &[new_base]));
            }
            if new_base != base {
                mutations.push(Mutation::substitution(pos, &[new_base]));
            }
        }
        if pos == 0 || tpl[pos - 1] != base {
            mutations.push(Mutation::deletion(pos, 1));
        }
    }
    if end == tpl.len() && start <= end {
        for &new_base in b"ACGT" {
            if is_new_insertion(end, new_base) {
                mutations.push(Mutation::insertion(end, &[new_base]));
            }
        }
    }
    mutations
}

pub fn unique_single_base_mutations(tpl: &[u8]) -> Vec<Mutation> {
    mutations_in_range(tpl, 0, tpl.len())
}

/// Unique mutations within `neighborhood` of any of the `centers`.
pub fn unique_nearby_mutations(
    tpl: &[u8],
    centers: &[usize],
    neighborhood: usize,
) -> Vec<Mutation> {
    let mutations: BTreeSet<_> = centers
        .iter()
        .flat_map(|&center| {
            let start = center.saturating_sub(neighborhood);
            let end = (center + neighborhood + 1).min(tpl.len());
            mutations_in_range(tpl, start, end)
        })
        .collect();
    mutations.into_iter().collect()
}

/// Take the best mutation, discard the mutations starting within `separation` of it, and repeat.
pub fn best_subset(mut scored: Vec<ScoredMutation>, separation: usize) -> Vec<Mutation> {
    if separation == 0 {
        return scored.into_iter().map(|s| s.mutation).collect();
    }
    let mut subset = vec![];
    while let Some(best) = scored
        .iter()
        .max_by(|x, y| x.score.partial_cmp(&y.score).unwrap_or(std::cmp::Ordering::Equal))
        .map(|s| s.mutation.clone())
    {
        let (lower, upper) = (
            best.start().saturating_sub(separation),
            best.start() + separation,
        );
        scored.retain(|s| !(lower <= s.mutation.start() && s.mutation.start() <= upper));
        subset.push(best);
    }
    subset
}

fn hash_of(seq: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    seq.hash(&mut hasher);
    hasher.finish()
}

/// Polish the template of `mms` until no favorable mutation remains.
/// Returns true if converged within the maximum number of iterations.
pub fn refine_consensus<M: Matrix, C: Combiner>(
    mms: &mut MultiReadMutationScorer<M, C>,
    opts: &RefineOptions,
) -> Result<bool> {
    let threshold = mms.config().favorable_threshold;
    let mut history = HashSet::new();
    history.insert(hash_of(mms.template(Strand::Forward).seq()));
    let mut centers: Vec<usize> = vec![];
    for round in 0..opts.maximum_iterations {
        let tpl = mms.template(Strand::Forward).seq().to_vec();
        let candidates = match round {
            0 => unique_single_base_mutations(&tpl),
            _ => unique_nearby_mutations(&tpl, &centers, opts.mutation_neighborhood),
        };
        let baseline = mms.baseline_score();
        let mut favorable = vec![];
        for m in candidates.iter() {
            if mms.fast_is_favorable(m)? {
                let score = mms.score(m)?;
                if threshold < score {
                    favorable.push(m.clone().with_score(score));
                }
            }
        }
        debug!(
            "ROUND\t{}\t{:.3}\t{}\t{}",
            round,
            baseline,
            candidates.len(),
            favorable.len()
        );
        if favorable.is_empty() {
            return Ok(true);
        }
        let mut subset = best_subset(favorable.clone(), opts.mutation_separation);
        let next = apply_mutations(&subset, &tpl);
        if !history.insert(hash_of(&next)) {
            debug!("CYCLE\t{}\tapply only the best mutation", round);
            subset.truncate(1);
            history.insert(hash_of(&apply_mutations(&subset, &tpl)));
        }
        for m in subset.iter() {
            trace!("APPLY\t{}\t{}", round, m);
        }
        mms.apply_mutations(&subset)?;
        let score = mms.baseline_score();
        if score < baseline {
            debug!("DECREASE\t{}\t{:.3}\t{:.3}", round, baseline, score);
        }
        centers = favorable
            .iter()
            .map(|s| lift_position(&subset, s.mutation.start(), false))
            .collect();
    }
    Ok(false)
}

/// Phred-scaled quality of each base of the template: the probability of an error is
/// the posterior of any single-base mutation at the position.
pub fn consensus_qvs<M: Matrix, C: Combiner>(
    mms: &mut MultiReadMutationScorer<M, C>,
) -> Result<Vec<u8>> {
    let tpl = mms.template(Strand::Forward).seq().to_vec();
    let mut qvs = Vec::with_capacity(tpl.len());
    for pos in 0..tpl.len() {
        let mut sum = 0f64;
        for m in mutations_in_range(&tpl, pos, pos + 1) {
            sum += mms.fast_score(&m)?.exp();
        }
        let error = 1f64 - (1f64 + sum).recip();
        let qv = match error <= 0f64 {
            true => MAX_QV,
            false => (-10f64 * error.log10()).round().min(MAX_QV as f64) as u8,
        };
        qvs.push(qv);
    }
    Ok(qvs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScorerConfig;
    use crate::context::Snr;
    use crate::gen_seq;
    use crate::multi_read::BandedMultiReadScorer;
    use crate::read::{MappedRead, Read};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    #[test]
    fn enumerate() {
        assert_eq!(all_single_base_mutations(b"AAC").len(), 28);
        let unique = unique_single_base_mutations(b"AAC");
        assert_eq!(unique.len(), 24);
        assert!(!unique.contains(&Mutation::deletion(1, 1)));
        assert!(!unique.contains(&Mutation::insertion(1, b"A")));
        assert!(unique.contains(&Mutation::insertion(3, b"A")));
        assert!(!unique.contains(&Mutation::insertion(3, b"C")));
        // The unique mutations give distinct templates.
        let templates: BTreeSet<_> = unique
            .iter()
            .map(|m| apply_mutations(&[m.clone()], b"AAC"))
            .collect();
        assert_eq!(templates.len(), unique.len());
        let inner = mutations_in_range(b"ACGTACGT", 2, 4);
        assert!(inner.iter().all(|m| 2 <= m.start() && m.start() < 4));
        assert_eq!(inner.len(), 2 * 7);
    }
    #[test]
    fn nearby() {
        let tpl = b"ACGTTACGGT";
        let nearby = unique_nearby_mutations(tpl, &[2, 3], 1);
        let expected: BTreeSet<_> = mutations_in_range(tpl, 1, 5).into_iter().collect();
        assert_eq!(nearby, expected.into_iter().collect::<Vec<_>>());
        let nearby = unique_nearby_mutations(tpl, &[9], 3);
        assert!(nearby.contains(&Mutation::insertion(10, b"A")));
    }
    #[test]
    fn subset() {
        let scored = vec![
            Mutation::deletion(0, 1).with_score(1f64),
            Mutation::deletion(5, 1).with_score(3f64),
            Mutation::deletion(12, 1).with_score(2f64),
            Mutation::deletion(13, 1).with_score(0.5),
        ];
        let subset = best_subset(scored.clone(), 5);
        assert_eq!(subset, vec![Mutation::deletion(5, 1), Mutation::deletion(12, 1)]);
        assert_eq!(best_subset(scored, 0).len(), 4);
        assert!(best_subset(vec![], 3).is_empty());
    }
    fn setup(
        seed: u64,
        len: usize,
        draft_mutations: &[Mutation],
    ) -> (Vec<u8>, BandedMultiReadScorer) {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
        let template = gen_seq::generate_seq(&mut rng, len);
        let reads = gen_seq::simulate_reads(&template, &mut rng, 20, &gen_seq::CCS_PROFILE);
        let draft = apply_mutations(draft_mutations, &template);
        let config = ScorerConfig::new(Snr::new(10., 7., 5., 11.));
        let mut mms = BandedMultiReadScorer::new(config, &draft).unwrap();
        for mut read in reads {
            read.template_start = lift_position(draft_mutations, read.template_start, false);
            read.template_end = lift_position(draft_mutations, read.template_end, true);
            mms.add_read_default(read).unwrap();
        }
        (template, mms)
    }
    #[test]
    fn polish_draft() {
        let draft_mutations = vec![
            Mutation::substitution(25, b"A"),
            Mutation::deletion(50, 1),
            Mutation::insertion(75, b"C"),
        ];
        let (template, mut mms) = setup(239, 100, &draft_mutations);
        assert_ne!(mms.template(Strand::Forward).seq(), template.as_slice());
        let converged = refine_consensus(&mut mms, &RefineOptions::default()).unwrap();
        assert!(converged);
        assert_eq!(mms.template(Strand::Forward).seq(), template.as_slice());
        let qvs = consensus_qvs(&mut mms).unwrap();
        assert_eq!(qvs.len(), template.len());
        let mean = qvs.iter().map(|&q| q as usize).sum::<usize>() / qvs.len();
        assert!(20 < mean, "{:?}", qvs);
    }
    #[test]
    fn nothing_to_polish() {
        let template = b"ACGTTGCAAGTCCATGACGTAGCTAGGATC".to_vec();
        let config = ScorerConfig::new(Snr::new(10., 7., 5., 11.));
        let mut mms = BandedMultiReadScorer::new(config, &template).unwrap();
        for i in 0..5 {
            let read = Read::new(format!("{}", i), &template).unwrap();
            mms.add_read_default(MappedRead::new(read, Strand::Forward, 0, template.len()))
                .unwrap();
        }
        let before = mms.baseline_score();
        assert!(refine_consensus(&mut mms, &RefineOptions::default()).unwrap());
        assert_eq!(mms.template(Strand::Forward).seq(), template.as_slice());
        assert_eq!(mms.baseline_score(), before);
        let threshold = mms.config().favorable_threshold;
        for m in unique_single_base_mutations(&template) {
            assert!(mms.score(&m).unwrap() <= threshold, "{}", m);
        }
    }
    #[test]
    fn iteration_limit() {
        let draft_mutations = vec![Mutation::deletion(30, 1)];
        let (_, mut mms) = setup(10, 60, &draft_mutations);
        let opts = RefineOptions {
            maximum_iterations: 0,
            ..RefineOptions::default()
        };
        assert!(!refine_consensus(&mut mms, &opts).unwrap());
    }
}
