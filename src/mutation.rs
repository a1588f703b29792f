//! Edit operations on a template.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MutationType {
    Substitution,
    /// Insertion before the specified position.
    Insertion,
    Deletion,
}

/// An edit of the template spanning `[start, end)`. Insertions have `start == end`.
/// Mutations are ordered by their start position first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mutation {
    start: usize,
    end: usize,
    kind: MutationType,
    new_bases: Vec<u8>,
}

impl Mutation {
    pub fn substitution(position: usize, bases: &[u8]) -> Self {
        Self {
            start: position,
            end: position + bases.len(),
            kind: MutationType::Substitution,
            new_bases: bases.to_vec(),
        }
    }
    pub fn insertion(position: usize, bases: &[u8]) -> Self {
        Self {
            start: position,
            end: position,
            kind: MutationType::Insertion,
            new_bases: bases.to_vec(),
        }
    }
    pub fn deletion(position: usize, length: usize) -> Self {
        Self {
            start: position,
            end: position + length,
            kind: MutationType::Deletion,
            new_bases: vec![],
        }
    }
    pub fn kind(&self) -> MutationType {
        self.kind
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    pub fn new_bases(&self) -> &[u8] {
        &self.new_bases
    }
    /// Change of the template length after this edit.
    pub fn length_diff(&self) -> isize {
        match self.kind {
            MutationType::Substitution => 0,
            MutationType::Insertion => self.new_bases.len() as isize,
            MutationType::Deletion => -((self.end - self.start) as isize),
        }
    }
    /// True if the edit changes exactly one base.
    pub fn is_single_base(&self) -> bool {
        match self.kind {
            MutationType::Substitution | MutationType::Insertion => self.new_bases.len() == 1,
            MutationType::Deletion => self.end == self.start + 1,
        }
    }
    pub fn with_score(self, score: f64) -> ScoredMutation {
        ScoredMutation {
            mutation: self,
            score,
        }
    }
    /// The same edit, with coordinates relative to `offset`.
    pub fn shift_left(&self, offset: usize) -> Self {
        Self {
            start: self.start - offset,
            end: self.end - offset,
            kind: self.kind,
            new_bases: self.new_bases.clone(),
        }
    }
    /// The same edit seen from the reverse strand of a template of length `len`.
    pub fn reverse_complement(&self, len: usize) -> Self {
        let new_bases = crate::gen_seq::reverse_complement(&self.new_bases);
        let (start, end) = (len - self.end, len - self.start);
        Self {
            start,
            end,
            kind: self.kind,
            new_bases,
        }
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bases = String::from_utf8_lossy(&self.new_bases);
        match self.kind {
            MutationType::Substitution => write!(f, "Sub@{}-{}:{}", self.start, self.end, bases),
            MutationType::Insertion => write!(f, "Ins@{}:{}", self.start, bases),
            MutationType::Deletion => write!(f, "Del@{}-{}", self.start, self.end),
        }
    }
}

/// A mutation with its (summed) score difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMutation {
    pub mutation: Mutation,
    pub score: f64,
}

impl std::fmt::Display for ScoredMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{:.3}", self.mutation, self.score)
    }
}

/// Apply all the mutations to `seq`. The coordinates of the mutations are that of `seq`,
/// and they should not overlap.
pub fn apply_mutations(mutations: &[Mutation], seq: &[u8]) -> Vec<u8> {
    let mut sorted: Vec<_> = mutations.iter().collect();
    sorted.sort();
    let mut result = seq.to_vec();
    let mut offset = 0isize;
    for m in sorted {
        let start = (m.start as isize + offset) as usize;
        let end = (m.end as isize + offset) as usize;
        match m.kind {
            MutationType::Substitution => {
                result[start..end].copy_from_slice(&m.new_bases);
            }
            MutationType::Insertion => {
                result.splice(start..start, m.new_bases.iter().copied());
            }
            MutationType::Deletion => {
                result.drain(start..end);
            }
        }
        offset += m.length_diff();
    }
    result
}

/// Lift over `position` so that it points to the same base after all the `mutations` applied.
/// If `inclusive` is true, insertions exactly at the position push it right.
/// Positions inside a deleted region move to the start of the deletion.
pub fn lift_position(mutations: &[Mutation], position: usize, inclusive: bool) -> usize {
    let mut shift = 0isize;
    for m in mutations {
        match m.kind {
            MutationType::Substitution => {}
            MutationType::Insertion => {
                if m.start < position || (inclusive && m.start == position) {
                    shift += m.new_bases.len() as isize;
                }
            }
            MutationType::Deletion if m.end <= position => shift -= (m.end - m.start) as isize,
            MutationType::Deletion if m.start < position => shift -= (position - m.start) as isize,
            MutationType::Deletion => {}
        }
    }
    (position as isize + shift) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn apply() {
        let seq = b"ACGTCGT";
        let muts = vec![Mutation::insertion(4, b"A")];
        assert_eq!(apply_mutations(&muts, seq), b"ACGTACGT".to_vec());
        let muts = vec![Mutation::substitution(2, b"C")];
        assert_eq!(apply_mutations(&muts, seq), b"ACCTCGT".to_vec());
        let muts = vec![Mutation::deletion(4, 1)];
        assert_eq!(apply_mutations(&muts, seq), b"ACGTGT".to_vec());
        let muts = vec![
            Mutation::deletion(6, 1),
            Mutation::insertion(0, b"TT"),
            Mutation::substitution(3, b"A"),
        ];
        assert_eq!(apply_mutations(&muts, seq), b"TTACGACG".to_vec());
    }
    #[test]
    fn order_independent() {
        let seq = b"AACCGGTTACGT";
        let muts = vec![
            Mutation::deletion(1, 2),
            Mutation::insertion(5, b"T"),
            Mutation::substitution(8, b"G"),
            Mutation::insertion(12, b"C"),
        ];
        let answer = apply_mutations(&muts, seq);
        let mut rev = muts.clone();
        rev.reverse();
        assert_eq!(apply_mutations(&rev, seq), answer);
        assert_eq!(answer, b"ACGTGTTGCGTC".to_vec());
    }
    #[test]
    fn ordering() {
        let mut muts = vec![
            Mutation::deletion(5, 1),
            Mutation::insertion(5, b"A"),
            Mutation::substitution(2, b"C"),
        ];
        muts.sort();
        assert_eq!(muts[0].start(), 2);
        assert_eq!(muts[1].kind(), MutationType::Insertion);
        assert_eq!(muts[2].kind(), MutationType::Deletion);
        assert_eq!(muts[1].length_diff(), 1);
        assert_eq!(muts[2].length_diff(), -1);
    }
    #[test]
    fn lift() {
        let muts = vec![Mutation::insertion(3, b"AA"), Mutation::deletion(6, 2)];
        assert_eq!(lift_position(&muts, 2, false), 2);
        assert_eq!(lift_position(&muts, 3, false), 3);
        assert_eq!(lift_position(&muts, 3, true), 5);
        assert_eq!(lift_position(&muts, 5, false), 7);
        assert_eq!(lift_position(&muts, 7, false), 8);
        assert_eq!(lift_position(&muts, 8, false), 8);
        assert_eq!(lift_position(&muts, 10, true), 10);
    }
    #[test]
    fn reverse_strand() {
        let seq = b"AACGTTGCA".to_vec();
        let rev = crate::gen_seq::reverse_complement(&seq);
        let muts = vec![
            Mutation::substitution(2, b"T"),
            Mutation::insertion(4, b"G"),
            Mutation::insertion(0, b"CA"),
            Mutation::insertion(9, b"T"),
            Mutation::deletion(7, 2),
            Mutation::deletion(0, 1),
        ];
        for m in muts {
            let fwd = apply_mutations(&[m.clone()], &seq);
            let rm = m.reverse_complement(seq.len());
            let bwd = apply_mutations(&[rm], &rev);
            assert_eq!(crate::gen_seq::reverse_complement(&fwd), bwd, "{}", m);
        }
    }
}
