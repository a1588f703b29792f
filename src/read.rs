//! Reads and their placement on the template.
use crate::context::is_read_base;
use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    pub name: String,
    pub seq: Vec<u8>,
}

impl Read {
    pub fn new<S: Into<String>>(name: S, seq: &[u8]) -> Result<Self> {
        let name = name.into();
        if seq.is_empty() {
            return Err(ScoringError::InvalidInput(format!("{} is empty", name)));
        }
        if let Some(&base) = seq.iter().find(|&&b| !is_read_base(b)) {
            let message = format!("{} has an invalid base {}", name, base as char);
            return Err(ScoringError::InvalidInput(message));
        }
        Ok(Self {
            name,
            seq: seq.to_vec(),
        })
    }
    pub fn len(&self) -> usize {
        self.seq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

/// A read aligned to `[template_start, template_end)` of the forward template.
/// The sequence of a reverse strand read is the one as sequenced, i.e., it aligns
/// to the reverse complement of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRead {
    pub read: Read,
    pub strand: Strand,
    pub template_start: usize,
    pub template_end: usize,
    /// The alignment starts at the first base of the window.
    /// Only pinned reads are accepted by the scorers.
    pub pin_start: bool,
    /// The alignment ends at the last base of the window.
    pub pin_end: bool,
}

impl MappedRead {
    pub fn new(read: Read, strand: Strand, template_start: usize, template_end: usize) -> Self {
        Self {
            read,
            strand,
            template_start,
            template_end,
            pin_start: true,
            pin_end: true,
        }
    }
    pub fn window_len(&self) -> usize {
        self.template_end.saturating_sub(self.template_start)
    }
}

impl std::fmt::Display for MappedRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strand = match self.strand {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        };
        let pin = |x: bool| if x { 'P' } else { '_' };
        write!(
            f,
            "{}\t{}\t{}-{}\t{}{}\t{}",
            self.read.name,
            strand,
            self.template_start,
            self.template_end,
            pin(self.pin_start),
            pin(self.pin_end),
            self.read.len()
        )
    }
}
