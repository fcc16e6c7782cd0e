//! Process sequencing readsets.
//!
//! A readset is a collection of single-end or paired-end reads in FASTQ or
//! SFF format, optionally gzipped. This crate streams a readset through a
//! configurable chain of optional stages -- demultiplexing, duplicate
//! removal, primer trimming, quality filtering and QA statistics -- in a
//! fixed canonical order, keeping PE mates in lockstep throughout.
//!
//! ```no_run
//! use readset::pipeline::Pipeline;
//! use readset::qc::QualityConfig;
//! use readset::sink::RecordSink;
//! use readset::source::RecordSource;
//! use readset::SANGER_OFFSET;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut source = RecordSource::open_se(Path::new("in.fastq.gz"), SANGER_OFFSET)?;
//! let mut sink = RecordSink::new("out", false, false);
//! let mut pipeline = Pipeline::new(100, SANGER_OFFSET);
//! pipeline.remove_duplicates()?;
//! pipeline.filter_quality(QualityConfig::default())?;
//! let summary = pipeline.run(&mut source, &mut sink)?;
//! println!("{} of {} read sets written", summary.written, summary.total);
//! # Ok(())
//! # }
//! ```

pub mod dedup;
pub mod demux;
pub mod error;
pub mod matcher;
pub mod mid;
pub mod pipeline;
pub mod primer;
pub mod qa;
pub mod qc;
pub mod read;
pub mod sff;
pub mod sink;
pub mod source;
pub mod utils;

pub use crate::error::ProcessError;
pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineState, RunSummary};
pub use crate::read::{ReadSet, SeqRead};

/// Sanger/phred+33 quality encoding offset, the default.
pub const SANGER_OFFSET: u8 = 33;

/// Legacy Illumina phred+64 quality encoding offset.
pub const ILLUMINA_OFFSET: u8 = 64;

/// Default number of read sets pulled from the source per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default maximum start offset of a MID tag within a read.
pub const DEFAULT_MID_OFFSET: usize = 10;

/// Default maximum start offset of a primer within a read.
pub const DEFAULT_PRIMER_LEEWAY: usize = 40;

/// Default 3'-window length for QA statistics.
pub const DEFAULT_QA_WINDOW: usize = 50;

/// Default header pattern for header demultiplexing; the captured group is
/// the bucket identifier.
pub const DEFAULT_HEADER_PATTERN: &str = r"#(\d+)/\d$";
