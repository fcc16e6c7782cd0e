//! Command-line front end for the readset processing pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use readset::demux::DemultiplexMode;
use readset::error::ProcessError;
use readset::matcher::MatchPolicy;
use readset::pipeline::{Pipeline, PipelineConfig, PrimerStageConfig, QaStageConfig};
use readset::qa::RScriptRenderer;
use readset::qc::QualityConfig;
use readset::sink::RecordSink;
use readset::source::RecordSource;
use readset::{
    mid, primer, DEFAULT_BATCH_SIZE, DEFAULT_HEADER_PATTERN, DEFAULT_MID_OFFSET,
    DEFAULT_PRIMER_LEEWAY, DEFAULT_QA_WINDOW, ILLUMINA_OFFSET, SANGER_OFFSET,
};

#[derive(Parser, Debug)]
#[command(name = "readset", version, about = "Process a SE or PE sequencing readset")]
struct Cli {
    /// SE or single-PE FASTQ (or gzipped FASTQ) or SFF input
    #[arg(short = 'i', long)]
    infile: PathBuf,

    /// FASTQ (or gzipped FASTQ) or SFF containing reverse mates
    #[arg(short = 'r', long)]
    reverse: Option<PathBuf>,

    /// Input file is paired-end (interleaved). Only necessary if one file parsed
    #[arg(short = '2', long)]
    paired: bool,

    /// Output directory and file prefix
    #[arg(short = 'o', long)]
    outprefix: String,

    /// Compress output files to gzipped FASTQ
    #[arg(short = 'z', long)]
    gzip: bool,

    /// Number of records to parse at a time
    #[arg(short = 'n', long = "num", default_value_t = DEFAULT_BATCH_SIZE)]
    num: usize,

    /// Quality scores encoded with the Illumina offset (+64) instead of Sanger (+33)
    #[arg(short = 'I', long)]
    illumina: bool,

    /// Comma-separated MIDs to be parsed; accepts ranges (e.g. "1-5,8")
    #[arg(short = 'M', long)]
    mids: Option<String>,

    /// Demultiplex by parsing sequence; mutually exclusive with --header
    #[arg(short = 's', long)]
    sequence: bool,

    /// File containing custom MID sequences; only allowed with --sequence
    #[arg(short = 'c', long)]
    custom: Option<PathBuf>,

    /// Maximum offset a MID can be within a read; only allowed with --sequence
    #[arg(short = 'O', long, default_value_t = DEFAULT_MID_OFFSET)]
    offset: usize,

    /// Demultiplex by parsing header; mutually exclusive with --sequence
    #[arg(short = 'H', long)]
    header: bool,

    /// Regex to match in the header when using --header
    #[arg(short = 'P', long, default_value = DEFAULT_HEADER_PATTERN)]
    pattern: String,

    /// Allowed mismatches when matching MID tags and primers
    #[arg(short = 'x', long, default_value_t = 0)]
    mismatches: u32,

    /// Perform duplicate removal
    #[arg(short = 'd', long)]
    duplicate: bool,

    /// File containing primer sequences
    #[arg(short = 'p', long)]
    primer: Option<PathBuf>,

    /// Maximum distance a primer can be within a read
    #[arg(short = 'L', long, default_value_t = DEFAULT_PRIMER_LEEWAY)]
    leeway: usize,

    /// Perform quality filtering
    #[arg(short = 'q', long)]
    quality: bool,

    /// Minimum read length cutoff
    #[arg(short = 'l', long, default_value_t = 50)]
    length: usize,

    /// Minimum median read quality cutoff
    #[arg(short = 'm', long, default_value_t = 20.0)]
    median: f32,

    /// Perform quality-assurance graphing
    #[arg(short = 'g', long)]
    graph: bool,

    /// Path to the R binary used for QA graphing
    #[arg(short = 'R', long, default_value = "R")]
    rpath: PathBuf,

    /// Window length for the 3' cross-sectional dropoff
    #[arg(short = 'w', long, default_value_t = DEFAULT_QA_WINDOW)]
    window: usize,
}

fn demultiplex_mode(cli: &Cli, policy: MatchPolicy) -> Result<DemultiplexMode, ProcessError> {
    if cli.sequence && cli.header {
        return Err(ProcessError::config(
            "choose either --sequence or --header for demultiplexing",
        ));
    }
    if !cli.sequence && !cli.header {
        if cli.mids.is_some() {
            return Err(ProcessError::config(
                "--mids requires --sequence or --header",
            ));
        }
        return Ok(DemultiplexMode::None);
    }
    let mids_list = cli
        .mids
        .as_deref()
        .ok_or_else(|| ProcessError::config("demultiplexing requires --mids"))?;
    if cli.sequence {
        let mids = match &cli.custom {
            Some(path) => mid::custom_mids(path, mids_list)?,
            None => mid::standard_mids(mids_list)?,
        };
        Ok(DemultiplexMode::BySequence {
            mids,
            offset: cli.offset,
            policy,
        })
    } else {
        if cli.custom.is_some() {
            return Err(ProcessError::config("--custom is only allowed with --sequence"));
        }
        Ok(DemultiplexMode::ByHeader {
            pattern: cli.pattern.clone(),
        })
    }
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, ProcessError> {
    let policy = if cli.mismatches == 0 {
        MatchPolicy::Exact
    } else {
        MatchPolicy::Mismatch(cli.mismatches)
    };

    Ok(PipelineConfig {
        batch_size: cli.num,
        qual_offset: if cli.illumina { ILLUMINA_OFFSET } else { SANGER_OFFSET },
        demultiplex: demultiplex_mode(cli, policy)?,
        remove_duplicates: cli.duplicate,
        primer: cli
            .primer
            .as_deref()
            .map(|path| {
                Ok::<_, ProcessError>(PrimerStageConfig {
                    primers: primer::load_primers(path)?,
                    leeway: cli.leeway,
                    policy,
                })
            })
            .transpose()?,
        quality: cli.quality.then(|| QualityConfig {
            min_length: cli.length,
            min_median: cli.median,
        }),
        qa: cli.graph.then(|| QaStageConfig {
            window_len: cli.window,
            target: PathBuf::from(format!("{}.qa.pdf", cli.outprefix)),
        }),
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    let paired = cli.paired || cli.reverse.is_some();
    let renderer = Box::new(RScriptRenderer::new(&cli.rpath));
    let mut pipeline = Pipeline::from_config(config, renderer)?;

    let mut source = if paired {
        RecordSource::open_pe(
            &cli.infile,
            cli.reverse.as_deref(),
            if cli.illumina { ILLUMINA_OFFSET } else { SANGER_OFFSET },
        )?
    } else {
        RecordSource::open_se(
            &cli.infile,
            if cli.illumina { ILLUMINA_OFFSET } else { SANGER_OFFSET },
        )?
    };
    let mut sink = RecordSink::new(&cli.outprefix, paired, cli.gzip);

    let summary = pipeline.run(&mut source, &mut sink)?;
    println!(
        "{} read sets in, {} written ({} duplicates, {} below quality)",
        summary.total, summary.written, summary.duplicates_dropped, summary.quality_dropped
    );
    if summary.renderer_error.is_some() {
        std::process::exit(2);
    }
    Ok(())
}
