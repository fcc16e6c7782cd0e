//! Owned containers for a single sequencing read and for the SE/PE unit
//! that flows through the pipeline.

use std::fmt;
use std::io::Write;

use fastq::Record;
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// One sequencing read: header, nucleotide sequence and per-base quality
/// string of identical length. The length invariant is checked on every
/// construction path, so downstream stages can index `seq` and `qual`
/// in lockstep without re-validating.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeqRead {
    head: Vec<u8>,
    seq: Vec<u8>,
    qual: Vec<u8>,
}

impl SeqRead {
    pub fn new(head: Vec<u8>, seq: Vec<u8>, qual: Vec<u8>) -> Result<SeqRead, ProcessError> {
        if seq.len() != qual.len() {
            return Err(ProcessError::Format(format!(
                "read '{}' has {} bases but {} quality values",
                String::from_utf8_lossy(&head),
                seq.len(),
                qual.len()
            )));
        }
        Ok(SeqRead { head, seq, qual })
    }

    /// Build a `SeqRead` from a record produced by the FASTQ parser.
    pub fn from_record<R: Record>(rec: &R) -> Result<SeqRead, ProcessError> {
        SeqRead::new(rec.head().to_vec(), rec.seq().to_vec(), rec.qual().to_vec())
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn qual(&self) -> &[u8] {
        &self.qual
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// The identifier used to recognize mates of one fragment: the header up
    /// to the first whitespace, minus a trailing `/1` or `/2` mate suffix.
    pub fn pair_id(&self) -> &[u8] {
        let end = self
            .head
            .iter()
            .position(|&c| c == b' ' || c == b'\t')
            .unwrap_or(self.head.len());
        let head = &self.head[..end];
        match head {
            [rest @ .., b'/', b'1' | b'2'] => rest,
            _ => head,
        }
    }

    /// Remove the first `n` bases (and their quality values).
    /// Trimming more than the read length empties the read.
    pub fn trim_leading(&mut self, n: usize) {
        let n = n.min(self.seq.len());
        self.seq.drain(..n);
        self.qual.drain(..n);
    }

    /// Decode the quality string with the given ASCII offset.
    /// Characters below the offset decode to zero rather than wrapping.
    pub fn decoded_quals(&self, offset: u8) -> impl DoubleEndedIterator<Item = u8> + '_ {
        self.qual.iter().map(move |&q| q.saturating_sub(offset))
    }

    /// Median of the decoded per-base quality scores. The median of an
    /// even-length read is the mean of the two central values.
    pub fn median_quality(&self, offset: u8) -> f32 {
        if self.qual.is_empty() {
            return 0.0;
        }
        let mut scores: Vec<u8> = self.decoded_quals(offset).collect();
        scores.sort_unstable();
        let mid = scores.len() / 2;
        if scores.len() % 2 == 1 {
            f32::from(scores[mid])
        } else {
            (f32::from(scores[mid - 1]) + f32::from(scores[mid])) / 2.0
        }
    }

    /// Write the read as one four-line FASTQ record.
    pub fn write_fastq<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(b"@")?;
        w.write_all(&self.head)?;
        w.write_all(b"\n")?;
        w.write_all(&self.seq)?;
        w.write_all(b"\n+\n")?;
        w.write_all(&self.qual)?;
        w.write_all(b"\n")
    }
}

impl fmt::Debug for SeqRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SeqRead {{ head: {}, seq: {}, qual: {} }}",
            String::from_utf8_lossy(&self.head),
            String::from_utf8_lossy(&self.seq),
            String::from_utf8_lossy(&self.qual)
        )
    }
}

/// The unit that flows through the pipeline: a single read in SE mode, or a
/// forward/reverse mate pair in PE mode. Mates are created, transformed and
/// dropped together, which is what keeps the two PE output streams the same
/// length in the same order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadSet {
    fwd: SeqRead,
    rev: Option<SeqRead>,
}

impl ReadSet {
    pub fn single(fwd: SeqRead) -> ReadSet {
        ReadSet { fwd, rev: None }
    }

    pub fn paired(fwd: SeqRead, rev: SeqRead) -> ReadSet {
        ReadSet {
            fwd,
            rev: Some(rev),
        }
    }

    pub fn is_paired(&self) -> bool {
        self.rev.is_some()
    }

    pub fn fwd(&self) -> &SeqRead {
        &self.fwd
    }

    pub fn rev(&self) -> Option<&SeqRead> {
        self.rev.as_ref()
    }

    /// Iterate over the reads in the set (one or two).
    pub fn reads(&self) -> impl Iterator<Item = &SeqRead> {
        std::iter::once(&self.fwd).chain(self.rev.iter())
    }

    pub fn reads_mut(&mut self) -> impl Iterator<Item = &mut SeqRead> {
        std::iter::once(&mut self.fwd).chain(self.rev.iter_mut())
    }
}
