//! Multiplex identifier (MID) definitions.
//!
//! A MID set is selected with a comma-separated list that accepts ranges
//! ("1-5,8" expands to MIDs 1 through 5 plus 8), resolved against either the
//! built-in Roche GS FLX tag table or a caller-supplied FASTA of custom tag
//! sequences.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ProcessError;
use crate::utils;

/// The standard Roche GS FLX MID tags.
pub const GS_FLX_MIDS: [(&str, &str); 14] = [
    ("MID1", "ACGAGTGCGT"),
    ("MID2", "ACGCTCGACA"),
    ("MID3", "AGACGCACTC"),
    ("MID4", "AGCACTGTAG"),
    ("MID5", "ATCAGACACG"),
    ("MID6", "ATATCGCGAG"),
    ("MID7", "CGTGTCTCTA"),
    ("MID8", "CTCGCGTGTC"),
    ("MID9", "TAGTATCAGC"),
    ("MID10", "TCTCTATGCG"),
    ("MID11", "TGATACGTCT"),
    ("MID12", "TACTGAGCTA"),
    ("MID13", "CATAGTAGTG"),
    ("MID14", "CGAGAGATAC"),
];

/// One multiplex identifier: a routing name plus its tag sequence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MidDefinition {
    pub name: String,
    pub tag: Vec<u8>,
}

impl MidDefinition {
    pub fn new(name: impl Into<String>, tag: &[u8]) -> MidDefinition {
        MidDefinition {
            name: name.into(),
            tag: tag.to_ascii_uppercase(),
        }
    }
}

/// Expand a "1-5,8"-style MID list into 1-based indices, preserving the
/// order in which values appear.
fn expand_ranges(list: &str) -> Result<Vec<usize>, ProcessError> {
    let mut out = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(ProcessError::Config(format!("empty entry in MID list '{list}'")));
        }
        let parse = |s: &str| {
            s.trim().parse::<usize>().map_err(|_| {
                ProcessError::Config(format!("invalid MID number '{s}' in list '{list}'"))
            })
        };
        match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse(lo)?, parse(hi)?);
                if lo == 0 || hi < lo {
                    return Err(ProcessError::Config(format!(
                        "invalid MID range '{part}' in list '{list}'"
                    )));
                }
                out.extend(lo..=hi);
            }
            None => {
                let n = parse(part)?;
                if n == 0 {
                    return Err(ProcessError::config("MID numbers are 1-based"));
                }
                out.push(n);
            }
        }
    }
    Ok(out)
}

/// Check that every MID name in the set is unique.
fn ensure_unique(mids: &[MidDefinition]) -> Result<(), ProcessError> {
    for (i, mid) in mids.iter().enumerate() {
        if mids[..i].iter().any(|m| m.name == mid.name) {
            return Err(ProcessError::Config(format!(
                "duplicate MID identifier '{}'",
                mid.name
            )));
        }
    }
    Ok(())
}

/// Resolve a MID list against the built-in GS FLX table.
pub fn standard_mids(list: &str) -> Result<Vec<MidDefinition>, ProcessError> {
    let indices = expand_ranges(list)?;
    let mut mids = Vec::with_capacity(indices.len());
    for idx in indices {
        let (name, tag) = GS_FLX_MIDS.get(idx - 1).ok_or_else(|| {
            ProcessError::Config(format!(
                "MID{idx} is not in the standard set (1-{})",
                GS_FLX_MIDS.len()
            ))
        })?;
        mids.push(MidDefinition::new(*name, tag.as_bytes()));
    }
    ensure_unique(&mids)?;
    Ok(mids)
}

/// Resolve a MID list against a custom FASTA of tag sequences. Records are
/// numbered by file order, so "1-3" selects the first three entries.
pub fn custom_mids(path: &Path, list: &str) -> Result<Vec<MidDefinition>, ProcessError> {
    let entries = utils::read_fasta(path)?;
    if entries.is_empty() {
        return Err(ProcessError::Config(format!(
            "custom MID file {} contains no sequences",
            path.display()
        )));
    }
    let indices = expand_ranges(list)?;
    let mut mids = Vec::with_capacity(indices.len());
    for idx in indices {
        let (name, tag) = entries.get(idx - 1).ok_or_else(|| {
            ProcessError::Config(format!(
                "MID number {idx} exceeds the {} entries in {}",
                entries.len(),
                path.display()
            ))
        })?;
        mids.push(MidDefinition::new(name.clone(), tag));
    }
    ensure_unique(&mids)?;
    Ok(mids)
}
