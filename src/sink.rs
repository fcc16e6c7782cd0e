//! Write surviving read sets to per-bucket FASTQ output streams.
//!
//! One bucket exists per demultiplex identifier (plus `unmatched`), or a
//! single unnamed bucket when demultiplexing is inactive. PE buckets hold a
//! synchronized pair of files that always receive the same records in the
//! same order.

use std::io::Write;
use std::path::PathBuf;

use fxhash::FxHashMap;
use itertools::Itertools;

use crate::error::ProcessError;
use crate::read::ReadSet;
use crate::utils;

struct BucketWriter {
    fwd: Box<dyn Write>,
    rev: Option<Box<dyn Write>>,
    written: u64,
}

/// Routes read sets to named output streams derived from a caller-supplied
/// prefix, optionally gzip-compressed. Buckets are created lazily on the
/// first record routed to them.
pub struct RecordSink {
    prefix: String,
    paired: bool,
    gzip: bool,
    buckets: FxHashMap<String, BucketWriter>,
}

impl RecordSink {
    pub fn new(prefix: impl Into<String>, paired: bool, gzip: bool) -> RecordSink {
        RecordSink {
            prefix: prefix.into(),
            paired,
            gzip,
            buckets: FxHashMap::default(),
        }
    }

    fn path(&self, bucket: &str, mate: Option<u8>) -> PathBuf {
        let mut name = self.prefix.clone();
        if !bucket.is_empty() {
            name.push('.');
            name.push_str(bucket);
        }
        if let Some(mate) = mate {
            name.push_str(&format!("_{mate}"));
        }
        name.push_str(".fastq");
        if self.gzip {
            name.push_str(".gz");
        }
        PathBuf::from(name)
    }

    fn open_bucket(&self, bucket: &str) -> Result<BucketWriter, ProcessError> {
        if self.paired {
            Ok(BucketWriter {
                fwd: utils::create_with_gz(self.path(bucket, Some(1)))?,
                rev: Some(utils::create_with_gz(self.path(bucket, Some(2)))?),
                written: 0,
            })
        } else {
            Ok(BucketWriter {
                fwd: utils::create_with_gz(self.path(bucket, None))?,
                rev: None,
                written: 0,
            })
        }
    }

    /// Append a read set to the named bucket (empty name = the sole default
    /// bucket). A paired set written to a paired sink always lands in both
    /// mate files before this returns.
    pub fn write(&mut self, bucket: &str, set: &ReadSet) -> Result<(), ProcessError> {
        if !self.buckets.contains_key(bucket) {
            let w = self.open_bucket(bucket)?;
            self.buckets.insert(bucket.to_string(), w);
        }
        let w = self.buckets.get_mut(bucket).unwrap();
        set.fwd().write_fastq(&mut w.fwd)?;
        if let (Some(rev_w), Some(rev)) = (w.rev.as_mut(), set.rev()) {
            rev.write_fastq(rev_w)?;
        }
        w.written += 1;
        Ok(())
    }

    /// Flush and close every bucket, returning `(bucket, records)` counts
    /// sorted by bucket name. Dropping the writers here is what finalizes
    /// gzip trailers.
    pub fn finish(&mut self) -> Result<Vec<(String, u64)>, ProcessError> {
        let mut counts = Vec::with_capacity(self.buckets.len());
        for (name, mut w) in self.buckets.drain() {
            w.fwd.flush()?;
            if let Some(rev) = w.rev.as_mut() {
                rev.flush()?;
            }
            counts.push((name, w.written));
        }
        Ok(counts.into_iter().sorted().collect())
    }
}
