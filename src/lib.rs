//! Context-aware scoring of reads against a template, and consensus polishing.
//!
//! A read is aligned to a template by a pair-HMM whose transition probabilities depend on the
//! dinucleotide context of the template and on the signal-to-noise ratio of the sequencer.
//! The forward and backward matrices are banded and scaled column by column. Once filled,
//! the likelihood of a template with a single-base edit is computed by re-filling a handful
//! of columns, which makes the greedy polishing in [refine] cheap.
//!
//! ```ignore
//! use quill::*;
//! let mut mms = BandedMultiReadScorer::new(ScorerConfig::default(), draft)?;
//! for read in reads {
//!     mms.add_read_default(read)?;
//! }
//! refine::refine_consensus(&mut mms, &RefineOptions::default())?;
//! let qvs = refine::consensus_qvs(&mut mms)?;
//! ```
#[macro_use]
extern crate log;
pub mod config;
pub mod context;
pub mod error;
pub mod gen_seq;
pub mod matrix;
pub mod multi_read;
pub mod mutation;
pub mod read;
pub mod recursor;
pub mod refine;
pub mod scorer;
pub mod template;

pub use config::{BandingOptions, ModelParams, ScorerConfig};
pub use context::{ContextCoefficients, ContextParameters, Snr, TransitionParameters};
pub use error::{Result, ScoringError};
pub use matrix::{BandedMatrix, DenseMatrix, Matrix};
pub use multi_read::{AddReadOutcome, BandedMultiReadScorer, MultiReadMutationScorer};
pub use mutation::{Mutation, MutationType, ScoredMutation};
pub use read::{MappedRead, Read, Strand};
pub use recursor::{Combiner, Recursor, SumProduct, Viterbi};
pub use refine::RefineOptions;
pub use scorer::MutationScorer;
pub use template::Template;
