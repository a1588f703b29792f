//! Template sequence with the transition parameters of each position.
use crate::context::{is_template_base, ContextParameters, TransitionParameters};
use crate::error::{Result, ScoringError};
use crate::mutation::{Mutation, MutationType};

/// A hypothetical single-base edit. Positions `position-1` and `position` of the virtual
/// template are served from `replaced`, and others are redirected to the original template.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VirtualEdit {
    kind: MutationType,
    position: usize,
    replaced: [(u8, TransitionParameters); 2],
}

/// Template. `trans[i]` is the parameter to move out of `seq[i]`,
/// determined by `seq[i]` and `seq[i+1]`. Thus, `trans.len() + 1 == seq.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    seq: Vec<u8>,
    trans: Vec<TransitionParameters>,
    ctx: ContextParameters,
    overlay: Option<VirtualEdit>,
}

impl Template {
    pub fn new(seq: &[u8], ctx: &ContextParameters) -> Result<Self> {
        if seq.is_empty() {
            return Err(ScoringError::InvalidInput("empty template".to_string()));
        }
        if let Some(&base) = seq.iter().find(|&&b| !is_template_base(b)) {
            let message = format!("{} is not a template base", base as char);
            return Err(ScoringError::InvalidInput(message));
        }
        let trans = seq
            .windows(2)
            .map(|w| ctx.get(w[0], w[1]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            seq: seq.to_vec(),
            trans,
            ctx: *ctx,
            overlay: None,
        })
    }
    pub fn len(&self) -> usize {
        self.seq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }
    pub fn transitions(&self) -> &[TransitionParameters] {
        &self.trans
    }
    pub fn context_parameters(&self) -> &ContextParameters {
        &self.ctx
    }
    /// The base at `i` and the parameters to move out of it.
    /// The last position has zero parameters.
    pub fn get(&self, i: usize) -> (u8, TransitionParameters) {
        let trans = match self.trans.get(i) {
            Some(&t) => t,
            None => TransitionParameters::zero(),
        };
        (self.seq[i], trans)
    }
    /// The copy of `[start, start + len)`.
    pub fn sub_section(&self, start: usize, len: usize) -> Self {
        assert!(0 < len && start + len <= self.len());
        Self {
            seq: self.seq[start..start + len].to_vec(),
            trans: self.trans[start..start + len - 1].to_vec(),
            ctx: self.ctx,
            overlay: None,
        }
    }
    pub fn reverse_complement(&self) -> Result<Self> {
        let seq = crate::gen_seq::reverse_complement(&self.seq);
        Self::new(&seq, &self.ctx)
    }
    /// Copy of this template with all the mutations applied.
    pub fn apply_mutations(&self, mutations: &[Mutation]) -> Result<Self> {
        let mut template = self.clone();
        template.overlay = None;
        template.apply_mutations_in_place(mutations)?;
        Ok(template)
    }
    /// Apply all the mutations. The positions should be the ones before any of them applied,
    /// and the mutations should not overlap.
    /// Only the transitions adjacent to edited bases are re-computed.
    pub fn apply_mutations_in_place(&mut self, mutations: &[Mutation]) -> Result<()> {
        if self.overlay.is_some() {
            return Err(ScoringError::Precondition(
                "mutations applied while a virtual edit is active",
            ));
        }
        let mut sorted: Vec<_> = mutations.iter().collect();
        sorted.sort();
        let total: isize = sorted.iter().map(|m| m.length_diff()).sum();
        if self.len() as isize + total < 1 {
            return Err(ScoringError::InvalidInput("template became empty".to_string()));
        }
        let mut last_end = 0;
        for m in sorted.iter() {
            if self.len() < m.end() || m.start() < last_end {
                let message = format!("{} overlaps or is out of the template", m);
                return Err(ScoringError::InvalidInput(message));
            }
            if let Some(&base) = m.new_bases().iter().find(|&&b| !is_template_base(b)) {
                let message = format!("{} is not a template base", base as char);
                return Err(ScoringError::InvalidInput(message));
            }
            last_end = m.end();
        }
        let mut offset = 0isize;
        for m in sorted {
            let start = (m.start() as isize + offset) as usize;
            let end = (m.end() as isize + offset) as usize;
            self.splice(m.kind(), start, end, m.new_bases())?;
            offset += m.length_diff();
        }
        debug_assert_eq!(self.trans.len() + 1, self.seq.len());
        Ok(())
    }
    // Replace seq[start..end] by bases and fix the transitions touching the edited region.
    fn splice(&mut self, kind: MutationType, start: usize, end: usize, bases: &[u8]) -> Result<()> {
        let old_len = self.seq.len();
        let (old_end, new_end) = match kind {
            MutationType::Substitution => {
                self.seq[start..end].copy_from_slice(bases);
                (end, end)
            }
            MutationType::Insertion => {
                self.seq.splice(start..start, bases.iter().copied());
                (start, start + bases.len())
            }
            MutationType::Deletion => {
                self.seq.drain(start..end);
                (end, start)
            }
        };
        let new_len = self.seq.len();
        let lower = start.saturating_sub(1);
        let old_upper = old_end.min(old_len - 1).max(lower);
        let new_upper = new_end.min(new_len - 1).max(lower);
        let seq = &self.seq;
        let ctx = &self.ctx;
        let trans = (lower..new_upper)
            .map(|t| ctx.get(seq[t], seq[t + 1]))
            .collect::<Result<Vec<_>>>()?;
        self.trans.splice(lower..old_upper, trans);
        Ok(())
    }
    /// Install a virtual single-base edit.
    pub fn virtual_apply(&mut self, m: &Mutation) -> Result<()> {
        if self.overlay.is_some() {
            return Err(ScoringError::Precondition("a virtual edit is already active"));
        }
        if !m.is_single_base() {
            return Err(ScoringError::UnsupportedEdit(format!("{} is not single-base", m)));
        }
        let (len, pos) = (self.len(), m.start());
        let in_range = match m.kind() {
            MutationType::Insertion => pos <= len,
            MutationType::Substitution | MutationType::Deletion => pos < len,
        };
        if !in_range {
            let message = format!("{} can not be applied to length {}", m, len);
            return Err(ScoringError::InvalidInput(message));
        }
        if m.kind() == MutationType::Deletion && len == 1 {
            return Err(ScoringError::TemplateTooSmall { length: len });
        }
        if let Some(&base) = m.new_bases().iter().find(|&&b| !is_template_base(b)) {
            let message = format!("{} is not a template base", base as char);
            return Err(ScoringError::InvalidInput(message));
        }
        let zero = TransitionParameters::zero();
        // The new base at `pos` (if any), and the base right after it.
        let (new_base, next) = match m.kind() {
            MutationType::Substitution => (m.new_bases()[0], self.seq.get(pos + 1)),
            MutationType::Insertion => (m.new_bases()[0], self.seq.get(pos)),
            MutationType::Deletion => (0, self.seq.get(pos + 1)),
        };
        let mut replaced = [(0, zero); 2];
        let following = match m.kind() {
            MutationType::Deletion => next.copied(),
            _ => Some(new_base),
        };
        if 0 < pos {
            let prev = self.seq[pos - 1];
            let trans = match following {
                Some(base) => self.ctx.get(prev, base)?,
                None => zero,
            };
            replaced[0] = (prev, trans);
        }
        if m.kind() != MutationType::Deletion {
            let trans = match next {
                Some(&base) => self.ctx.get(new_base, base)?,
                None => zero,
            };
            replaced[1] = (new_base, trans);
        }
        self.overlay = Some(VirtualEdit {
            kind: m.kind(),
            position: pos,
            replaced,
        });
        Ok(())
    }
    pub fn virtual_clear(&mut self) {
        self.overlay = None;
    }
    pub fn virtual_active(&self) -> bool {
        self.overlay.is_some()
    }
    /// Length of the template with the virtual edit applied.
    pub fn virtual_len(&self) -> usize {
        match self.overlay.as_ref().map(|v| v.kind) {
            Some(MutationType::Insertion) => self.len() + 1,
            Some(MutationType::Deletion) => self.len() - 1,
            _ => self.len(),
        }
    }
    /// The same as [Template::get], but seen through the virtual edit.
    pub fn get_virtual(&self, i: usize) -> (u8, TransitionParameters) {
        let edit = match self.overlay.as_ref() {
            Some(edit) => edit,
            None => return self.get(i),
        };
        let pos = edit.position;
        if i + 1 < pos {
            self.get(i)
        } else if i + 1 == pos {
            edit.replaced[0]
        } else {
            match edit.kind {
                MutationType::Substitution if i == pos => edit.replaced[1],
                MutationType::Substitution => self.get(i),
                MutationType::Insertion if i == pos => edit.replaced[1],
                MutationType::Insertion => self.get(i - 1),
                MutationType::Deletion => self.get(i + 1),
            }
        }
    }
}
