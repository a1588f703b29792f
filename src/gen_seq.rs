//! Random templates and simulated reads, to test and to demonstrate the polishing.
//! Usually, it would not be used in the real-applications.
use crate::mutation::Mutation;
use crate::read::{MappedRead, Read, Strand};
use rand::seq::SliceRandom;
use rand::Rng;

/// Per-base error rates of a simulated read.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub sub: f64,
    pub del: f64,
    pub ins: f64,
}

pub const PROFILE: Profile = Profile {
    sub: 0.04,
    del: 0.04,
    ins: 0.07,
};

pub const CCS_PROFILE: Profile = Profile {
    sub: 0.002,
    del: 0.004,
    ins: 0.004,
};

/// Reads shorter than this are not simulated by [simulate_reads].
const MIN_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy)]
enum Op {
    Match,
    MisMatch,
    Del,
    In,
}

impl Op {
    fn weight(self, p: &Profile) -> f64 {
        match self {
            Op::Match => 1. - p.sub - p.del - p.ins,
            Op::MisMatch => p.sub,
            Op::Del => p.del,
            Op::In => p.ins,
        }
    }
}

const OPERATIONS: [Op; 4] = [Op::Match, Op::MisMatch, Op::Del, Op::In];

pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        x => x,
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Copy `seq` with random errors. The first and the last bases are kept as they are,
/// so that the read can be pinned to both ends of the template.
pub fn introduce_randomness<T: Rng>(seq: &[u8], rng: &mut T, p: &Profile) -> Vec<u8> {
    if seq.len() < 2 {
        return seq.to_vec();
    }
    let mut res = vec![seq[0]];
    for &base in seq[1..seq.len() - 1].iter() {
        let op = OPERATIONS
            .choose_weighted(rng, |e| e.weight(p))
            .map(|op| *op)
            .unwrap_or(Op::Match);
        match op {
            Op::Match => res.push(base),
            Op::MisMatch => res.push(choose_base(rng, base)),
            Op::In => {
                res.push(random_base(rng));
                res.push(base);
            }
            Op::Del => {}
        }
    }
    res.push(seq[seq.len() - 1]);
    res
}

pub fn generate_seq<T: Rng>(rng: &mut T, len: usize) -> Vec<u8> {
    let bases = b"ACTG";
    (0..len)
        .filter_map(|_| bases.choose(rng))
        .copied()
        .collect()
}

/// Simulate `num` reads on random windows of `template`, on both strands.
/// Half of them span the whole template.
pub fn simulate_reads<T: Rng>(
    template: &[u8],
    rng: &mut T,
    num: usize,
    p: &Profile,
) -> Vec<MappedRead> {
    let len = template.len();
    (0..num)
        .filter_map(|i| {
            let (start, end) = match i % 2 == 0 || len <= MIN_WINDOW {
                true => (0, len),
                false => {
                    let start = rng.gen_range(0..=len - MIN_WINDOW);
                    let end = rng.gen_range(start + MIN_WINDOW..=len);
                    (start, end)
                }
            };
            let strand = match rng.gen_bool(0.5) {
                true => Strand::Forward,
                false => Strand::Reverse,
            };
            let seq = introduce_randomness(&template[start..end], rng, p);
            let seq = match strand {
                Strand::Forward => seq,
                Strand::Reverse => reverse_complement(&seq),
            };
            let read = Read::new(format!("read{}", i), &seq).ok()?;
            Some(MappedRead::new(read, strand, start, end))
        })
        .collect()
}

/// Up to `num` non-overlapping single-base mutations, away from both ends of `template`.
pub fn random_mutations<T: Rng>(template: &[u8], rng: &mut T, num: usize) -> Vec<Mutation> {
    if template.len() < 4 {
        return vec![];
    }
    let mut positions: Vec<usize> = (2..template.len() - 1).step_by(2).collect();
    positions.shuffle(rng);
    positions.truncate(num);
    positions.sort_unstable();
    positions
        .into_iter()
        .map(|pos| match rng.gen_range(0..3) {
            0 => Mutation::substitution(pos, &[choose_base(rng, template[pos])]),
            1 => Mutation::insertion(pos, &[random_base(rng)]),
            _ => Mutation::deletion(pos, 1),
        })
        .collect()
}

/// Levenshtein distance.
pub fn edit_dist(xs: &[u8], ys: &[u8]) -> u32 {
    let mut prev: Vec<u32> = (0..=ys.len() as u32).collect();
    let mut current = vec![0; ys.len() + 1];
    for (i, &x) in xs.iter().enumerate() {
        current[0] = i as u32 + 1;
        for (j, &y) in ys.iter().enumerate() {
            current[j + 1] = (prev[j + 1] + 1)
                .min(current[j] + 1)
                .min(prev[j] + (x != y) as u32);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[ys.len()]
}

fn choose_base<T: Rng>(rng: &mut T, base: u8) -> u8 {
    let bases: Vec<u8> = b"ATCG".iter().filter(|&&e| e != base).copied().collect();
    bases.choose(rng).copied().unwrap_or(base)
}

fn random_base<T: Rng>(rng: &mut T) -> u8 {
    b"ATGC".choose(rng).copied().unwrap_or(b'A')
}
