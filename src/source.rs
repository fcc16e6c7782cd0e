//! Read batches of `ReadSet`s from one or two input streams.
//!
//! Inputs may be FASTQ or SFF, optionally gzipped; the format is detected
//! from the file extension and is invisible to downstream stages. In PE mode
//! the source keeps the two streams in lockstep and treats unequal record
//! counts as a hard format error rather than a silent truncation.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use fastq::{Parser, RecordRefIter};

use crate::error::ProcessError;
use crate::read::{ReadSet, SeqRead};
use crate::sff::SffReader;
use crate::utils;

/// One input stream yielding `SeqRead`s, format- and compression-agnostic.
enum FormatReader {
    Fastq(RecordRefIter<Box<dyn BufRead>>),
    Sff(SffReader<Box<dyn BufRead>>),
}

impl FormatReader {
    fn open(path: &Path, qual_offset: u8) -> Result<FormatReader, ProcessError> {
        let rdr = utils::open_with_gz(path)?;
        if utils::has_extension(utils::strip_gz(path), "sff") {
            Ok(FormatReader::Sff(SffReader::new(rdr, qual_offset)?))
        } else {
            Ok(FormatReader::Fastq(Parser::new(rdr).ref_iter()))
        }
    }

    fn next_read(&mut self) -> Result<Option<SeqRead>, ProcessError> {
        match self {
            FormatReader::Fastq(iter) => {
                iter.advance()?;
                match iter.get() {
                    Some(rec) => Ok(Some(SeqRead::from_record(&rec)?)),
                    None => Ok(None),
                }
            }
            FormatReader::Sff(rdr) => rdr.next_read(),
        }
    }
}

/// Produces a lazy, finite, non-restartable sequence of batches of read sets.
pub struct RecordSource {
    fwd: FormatReader,
    rev: Option<FormatReader>,
    /// Single physical stream holding interleaved forward/reverse mates.
    interleaved: bool,
    fwd_path: PathBuf,
    records: u64,
}

impl RecordSource {
    /// Open a single-end source.
    pub fn open_se(path: &Path, qual_offset: u8) -> Result<RecordSource, ProcessError> {
        Ok(RecordSource {
            fwd: FormatReader::open(path, qual_offset)?,
            rev: None,
            interleaved: false,
            fwd_path: path.to_owned(),
            records: 0,
        })
    }

    /// Open a paired-end source from two parallel files, or from one
    /// interleaved file when `rev` is absent.
    pub fn open_pe(
        fwd: &Path,
        rev: Option<&Path>,
        qual_offset: u8,
    ) -> Result<RecordSource, ProcessError> {
        Ok(RecordSource {
            fwd: FormatReader::open(fwd, qual_offset)?,
            rev: rev.map(|p| FormatReader::open(p, qual_offset)).transpose()?,
            interleaved: rev.is_none(),
            fwd_path: fwd.to_owned(),
            records: 0,
        })
    }

    fn next_set(&mut self) -> Result<Option<ReadSet>, ProcessError> {
        let fwd = self.fwd.next_read()?;
        let set = if self.interleaved {
            match fwd {
                None => None,
                Some(fwd) => match self.fwd.next_read()? {
                    Some(rev) => Some(ReadSet::paired(fwd, rev)),
                    None => {
                        return Err(ProcessError::Format(format!(
                            "interleaved input {} ends with an unmated forward read",
                            self.fwd_path.display()
                        )))
                    }
                },
            }
        } else if let Some(rev_rdr) = self.rev.as_mut() {
            match (fwd, rev_rdr.next_read()?) {
                (Some(fwd), Some(rev)) => Some(ReadSet::paired(fwd, rev)),
                (None, None) => None,
                (fwd, _) => {
                    let (short, long) = if fwd.is_some() {
                        ("reverse", "forward")
                    } else {
                        ("forward", "reverse")
                    };
                    return Err(ProcessError::Format(format!(
                        "{short} stream ended after {} records while the {long} stream has more",
                        self.records
                    )));
                }
            }
        } else {
            fwd.map(ReadSet::single)
        };
        if set.is_some() {
            self.records += 1;
        }
        Ok(set)
    }

    /// Pull the next batch of at most `max` read sets. Returns `None` once
    /// the stream is exhausted.
    pub fn next_batch(&mut self, max: usize) -> Result<Option<Vec<ReadSet>>, ProcessError> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.next_set()? {
                Some(set) => batch.push(set),
                None => break,
            }
        }
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    /// Total records yielded so far (pairs count once).
    pub fn records(&self) -> u64 {
        self.records
    }
}
