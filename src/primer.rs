//! Trim primer sequences from the 5' end of reads.
//!
//! Each read is searched within the leading leeway window for any configured
//! primer; on a hit the primer and everything before it are removed from the
//! sequence and the aligned quality values. A read without a primer passes
//! through untouched, and mates are trimmed independently of each other.

use crate::error::ProcessError;
use crate::matcher::{first_tag, MatchPolicy};
use crate::read::{ReadSet, SeqRead};
use crate::utils;
use std::path::Path;

/// A primer sequence to locate near the 5' end of a read.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
pub struct PrimerDefinition {
    pub name: String,
    pub seq: Vec<u8>,
}

/// Load primer definitions from a FASTA file.
pub fn load_primers(path: &Path) -> Result<Vec<PrimerDefinition>, ProcessError> {
    let entries = utils::read_fasta(path)?;
    if entries.is_empty() {
        return Err(ProcessError::Config(format!(
            "primer file {} contains no sequences",
            path.display()
        )));
    }
    Ok(entries
        .into_iter()
        .map(|(name, seq)| PrimerDefinition { name, seq })
        .collect())
}

pub struct PrimerTrimmer {
    primers: Vec<PrimerDefinition>,
    /// Maximum start offset of a primer within the read (inclusive).
    leeway: usize,
    policy: MatchPolicy,
    trimmed: u64,
}

impl PrimerTrimmer {
    pub fn new(
        primers: Vec<PrimerDefinition>,
        leeway: usize,
        policy: MatchPolicy,
    ) -> Result<PrimerTrimmer, ProcessError> {
        if primers.is_empty() {
            return Err(ProcessError::config("primer trimming requires at least one primer"));
        }
        Ok(PrimerTrimmer {
            primers,
            leeway,
            policy,
            trimmed: 0,
        })
    }

    /// Trim one read in place, returning true if a primer was removed.
    /// The lowest-offset accepted hit wins, even when a later placement
    /// would match with fewer mismatches; primer declaration order breaks
    /// ties at the same offset.
    fn trim_read(&self, read: &mut SeqRead) -> bool {
        // (start, cut-point) of the best hit; earliest start wins and the
        // strict comparison keeps the earliest-declared primer on ties
        let mut best: Option<(usize, usize)> = None;
        for primer in &self.primers {
            if let Some(hit) = first_tag(read.seq(), &primer.seq, self.leeway, self.policy) {
                if best.map_or(true, |(start, _)| hit.offset < start) {
                    best = Some((hit.offset, hit.offset + primer.seq.len()));
                }
            }
        }
        match best {
            Some((_, end)) => {
                read.trim_leading(end);
                true
            }
            None => false,
        }
    }

    /// Trim every read in the set independently. Never drops a read.
    pub fn trim(&mut self, set: &mut ReadSet) {
        for read in set.reads_mut() {
            if self.trim_read(read) {
                self.trimmed += 1;
            }
        }
    }

    /// Number of reads (not sets) that had a primer removed.
    pub fn trimmed(&self) -> u64 {
        self.trimmed
    }
}
