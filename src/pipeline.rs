//! The batch-synchronous processing pipeline.
//!
//! A pipeline is assembled in the `Configuring` state from zero or more
//! optional stages, then driven once. Whatever order the caller registers
//! stages in, execution order is always Demultiplex -> DuplicateRemoval ->
//! PrimerTrim -> QualityFilter -> QAStats: configuration decides which
//! stages exist and their parameters, never their relative order. One batch
//! flows through every active stage before the next is pulled, so peak
//! memory is one batch plus the run-scoped duplicate index.

use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::dedup::DuplicateRemover;
use crate::demux::{Demultiplexer, DemultiplexMode};
use crate::error::ProcessError;
use crate::matcher::MatchPolicy;
use crate::primer::{PrimerDefinition, PrimerTrimmer};
use crate::qa::{QaCollector, Renderer};
use crate::qc::{QualityConfig, QualityFilter};
use crate::sink::RecordSink;
use crate::source::RecordSource;
use crate::{DEFAULT_BATCH_SIZE, SANGER_OFFSET};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Configuring,
    Running,
    Finished,
    Failed,
}

/// Primer-trimming stage parameters.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PrimerStageConfig {
    pub primers: Vec<PrimerDefinition>,
    pub leeway: usize,
    pub policy: MatchPolicy,
}

/// QA-graphing stage parameters. The renderer itself is passed separately,
/// since it is an external collaborator rather than configuration data.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QaStageConfig {
    pub window_len: usize,
    pub target: PathBuf,
}

/// Validated description of a whole run: which stages are active and their
/// parameters. Built once before any record is read; immutable afterwards.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub qual_offset: u8,
    pub demultiplex: DemultiplexMode,
    pub remove_duplicates: bool,
    pub primer: Option<PrimerStageConfig>,
    pub quality: Option<QualityConfig>,
    pub qa: Option<QaStageConfig>,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            qual_offset: SANGER_OFFSET,
            demultiplex: DemultiplexMode::None,
            remove_duplicates: false,
            primer: None,
            quality: None,
            qa: None,
        }
    }
}

/// What one run did, per stage and per output bucket.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RunSummary {
    pub total: u64,
    pub duplicates_dropped: u64,
    pub primers_trimmed: u64,
    pub quality_dropped: u64,
    pub written: u64,
    pub buckets: Vec<(String, u64)>,
    /// Advisory: present when the QA renderer was configured but failed.
    pub renderer_error: Option<String>,
}

struct QaStage {
    collector: QaCollector,
    renderer: Box<dyn Renderer>,
    target: PathBuf,
}

/// Owns the fixed-order stage slots and drives the batch loop from a
/// `RecordSource` to a `RecordSink`.
pub struct Pipeline {
    state: PipelineState,
    batch_size: usize,
    qual_offset: u8,
    demux: Option<Demultiplexer>,
    dedup: Option<DuplicateRemover>,
    trimmer: Option<PrimerTrimmer>,
    filter: Option<QualityFilter>,
    qa: Option<QaStage>,
}

impl Pipeline {
    pub fn new(batch_size: usize, qual_offset: u8) -> Pipeline {
        Pipeline {
            state: PipelineState::Configuring,
            batch_size: batch_size.max(1),
            qual_offset,
            demux: None,
            dedup: None,
            trimmer: None,
            filter: None,
            qa: None,
        }
    }

    /// Assemble a pipeline from a validated configuration. `renderer` is
    /// only consulted when the configuration enables QA graphing.
    pub fn from_config(
        config: PipelineConfig,
        renderer: Box<dyn Renderer>,
    ) -> Result<Pipeline, ProcessError> {
        let mut pipeline = Pipeline::new(config.batch_size, config.qual_offset);
        match config.demultiplex {
            DemultiplexMode::None => {}
            mode => {
                pipeline.demultiplex(mode)?;
            }
        }
        if config.remove_duplicates {
            pipeline.remove_duplicates()?;
        }
        if let Some(primer) = config.primer {
            pipeline.trim_primers(primer.primers, primer.leeway, primer.policy)?;
        }
        if let Some(quality) = config.quality {
            pipeline.filter_quality(quality)?;
        }
        if let Some(qa) = config.qa {
            pipeline.collect_qa(qa.window_len, renderer, qa.target)?;
        }
        Ok(pipeline)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn ensure_configuring(&self) -> Result<(), ProcessError> {
        if self.state != PipelineState::Configuring {
            return Err(ProcessError::config(
                "stages cannot be added after the pipeline has started running",
            ));
        }
        Ok(())
    }

    pub fn demultiplex(&mut self, mode: DemultiplexMode) -> Result<&mut Pipeline, ProcessError> {
        self.ensure_configuring()?;
        if self.demux.is_some() {
            return Err(ProcessError::config("demultiplexing is already configured"));
        }
        self.demux = Demultiplexer::new(mode)?;
        Ok(self)
    }

    pub fn remove_duplicates(&mut self) -> Result<&mut Pipeline, ProcessError> {
        self.ensure_configuring()?;
        self.dedup = Some(DuplicateRemover::new());
        Ok(self)
    }

    pub fn trim_primers(
        &mut self,
        primers: Vec<PrimerDefinition>,
        leeway: usize,
        policy: MatchPolicy,
    ) -> Result<&mut Pipeline, ProcessError> {
        self.ensure_configuring()?;
        self.trimmer = Some(PrimerTrimmer::new(primers, leeway, policy)?);
        Ok(self)
    }

    pub fn filter_quality(&mut self, config: QualityConfig) -> Result<&mut Pipeline, ProcessError> {
        self.ensure_configuring()?;
        self.filter = Some(QualityFilter::new(config, self.qual_offset));
        Ok(self)
    }

    pub fn collect_qa(
        &mut self,
        window_len: usize,
        renderer: Box<dyn Renderer>,
        target: PathBuf,
    ) -> Result<&mut Pipeline, ProcessError> {
        self.ensure_configuring()?;
        self.qa = Some(QaStage {
            collector: QaCollector::new(window_len, self.qual_offset),
            renderer,
            target,
        });
        Ok(self)
    }

    /// Drive the whole stream through the configured stages. The transition
    /// to `Running` is irreversible; a second call is a configuration error.
    /// Output already flushed is not rolled back on failure.
    pub fn run(
        &mut self,
        source: &mut RecordSource,
        sink: &mut RecordSink,
    ) -> Result<RunSummary, ProcessError> {
        self.ensure_configuring()?;
        self.state = PipelineState::Running;
        match self.run_inner(source, sink) {
            Ok(summary) => {
                self.state = PipelineState::Finished;
                Ok(summary)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn run_inner(
        &mut self,
        source: &mut RecordSource,
        sink: &mut RecordSink,
    ) -> Result<RunSummary, ProcessError> {
        let mut summary = RunSummary::default();

        while let Some(batch) = source.next_batch(self.batch_size)? {
            for mut set in batch {
                summary.total += 1;

                let bucket = match &self.demux {
                    Some(demux) => demux.route(&set),
                    None => String::new(),
                };
                if let Some(dedup) = self.dedup.as_mut() {
                    if !dedup.keep(&set) {
                        continue;
                    }
                }
                if let Some(trimmer) = self.trimmer.as_mut() {
                    trimmer.trim(&mut set);
                }
                if let Some(filter) = self.filter.as_mut() {
                    if !filter.keep(&set) {
                        continue;
                    }
                }
                if let Some(qa) = self.qa.as_mut() {
                    qa.collector.record(&set);
                }
                sink.write(&bucket, &set)?;
                summary.written += 1;
            }
        }

        summary.buckets = sink.finish()?;
        summary.duplicates_dropped = self.dedup.as_ref().map_or(0, DuplicateRemover::dropped);
        summary.primers_trimmed = self.trimmer.as_ref().map_or(0, PrimerTrimmer::trimmed);
        summary.quality_dropped = self.filter.as_ref().map_or(0, QualityFilter::dropped);

        if let Some(qa) = &self.qa {
            let means: Vec<f64> = qa.collector.means().collect();
            if let Err(e) = qa.renderer.render(&means, &qa.target) {
                warn!("QA graphing failed (output files are unaffected): {e:#}");
                summary.renderer_error = Some(format!("{e:#}"));
            }
        }

        info!(
            "processed {} read sets: {} written, {} duplicates, {} below quality, {} primer-trimmed",
            summary.total,
            summary.written,
            summary.duplicates_dropped,
            summary.quality_dropped,
            summary.primers_trimmed
        );
        for (bucket, n) in &summary.buckets {
            let name = if bucket.is_empty() { "(default)" } else { bucket };
            info!("  bucket {name}: {n} read sets");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::demux::UNMATCHED;
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::path::Path;

    struct NullRenderer;

    impl Renderer for NullRenderer {
        fn render(&self, _means: &[f64], _target: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&self, _means: &[f64], _target: &Path) -> Result<()> {
            anyhow::bail!("R binary not found")
        }
    }

    fn write_fastq(path: &Path, reads: &[(String, String, String)]) {
        let mut w = std::fs::File::create(path).unwrap();
        for (head, seq, qual) in reads {
            write!(w, "@{head}\n{seq}\n+\n{qual}\n").unwrap();
        }
    }

    fn read_headers(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .step_by(4)
            .map(|l| l.trim_start_matches('@').to_string())
            .collect()
    }

    /// 100 SE reads: 10 exact duplicates of earlier reads and 5 short ones.
    /// With dedup and quality filtering active, exactly 85 survive in input
    /// order.
    #[test]
    fn test_end_to_end_se_dedup_and_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut reads = Vec::new();
        let mut expect = Vec::new();
        for i in 0..100 {
            let head = format!("r{i}");
            let (seq, keep) = if (10..20).contains(&i) {
                // duplicate the content of reads r0..r9
                (unique_seq(i - 10, 60), false)
            } else if (30..35).contains(&i) {
                (unique_seq(i, 49), false)
            } else {
                (unique_seq(i, 60), true)
            };
            let qual = "I".repeat(seq.len());
            if keep {
                expect.push(head.clone());
            }
            reads.push((head, seq, qual));
        }
        let input = dir.path().join("in.fastq");
        write_fastq(&input, &reads);

        let prefix = dir.path().join("out").to_string_lossy().into_owned();
        let mut source = RecordSource::open_se(&input, SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, false, false);
        let mut pipeline = Pipeline::new(7, SANGER_OFFSET);
        pipeline.remove_duplicates().unwrap();
        pipeline.filter_quality(QualityConfig::default()).unwrap();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!(summary.total, 100);
        assert_eq!(summary.duplicates_dropped, 10);
        assert_eq!(summary.quality_dropped, 5);
        assert_eq!(summary.written, 85);
        assert_eq!(pipeline.state(), PipelineState::Finished);
        // survivors keep their original relative order
        assert_eq!(read_headers(&dir.path().join("out.fastq")), expect);
    }

    fn unique_seq(i: usize, len: usize) -> String {
        // a distinct prefix per index, padded to the requested length
        let bases = [b'A', b'C', b'G', b'T'];
        let mut seq: Vec<u8> = (0..4).map(|k| bases[(i >> (2 * k)) & 3]).collect();
        seq.resize(len, b'A');
        String::from_utf8(seq).unwrap()
    }

    #[test]
    fn test_pe_streams_stay_in_lockstep() {
        let dir = tempfile::tempdir().unwrap();
        let mut fwd = Vec::new();
        let mut rev = Vec::new();
        for i in 0..20 {
            // every third pair has a low-quality reverse mate
            let rev_qual = if i % 3 == 0 { "#" } else { "I" }.repeat(60);
            fwd.push((format!("p{i}/1"), unique_seq(i, 60), "I".repeat(60)));
            rev.push((format!("p{i}/2"), unique_seq(i + 100, 60), rev_qual));
        }
        let f = dir.path().join("f.fastq");
        let r = dir.path().join("r.fastq");
        write_fastq(&f, &fwd);
        write_fastq(&r, &rev);

        let prefix = dir.path().join("pe").to_string_lossy().into_owned();
        let mut source = RecordSource::open_pe(&f, Some(&r), SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, true, false);
        let mut pipeline = Pipeline::new(4, SANGER_OFFSET);
        pipeline.filter_quality(QualityConfig::default()).unwrap();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!(summary.total, 20);
        assert_eq!(summary.quality_dropped, 7);
        let out_f = read_headers(&dir.path().join("pe_1.fastq"));
        let out_r = read_headers(&dir.path().join("pe_2.fastq"));
        assert_eq!(out_f.len(), 13);
        assert_eq!(out_f.len(), out_r.len());
        for (a, b) in out_f.iter().zip(&out_r) {
            assert_eq!(a.trim_end_matches("/1"), b.trim_end_matches("/2"));
        }
    }

    #[test]
    fn test_demux_splits_buckets_and_routes_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        let mid1 = "ACGAGTGCGT"; // MID1 tag
        let reads = vec![
            ("a".to_string(), format!("{mid1}{}", "A".repeat(50)), "I".repeat(60)),
            ("b".to_string(), "G".repeat(60), "I".repeat(60)),
            ("c".to_string(), format!("TT{mid1}{}", "C".repeat(48)), "I".repeat(60)),
        ];
        let input = dir.path().join("in.fastq");
        write_fastq(&input, &reads);

        let prefix = dir.path().join("dm").to_string_lossy().into_owned();
        let mut source = RecordSource::open_se(&input, SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, false, false);
        let mut pipeline = Pipeline::new(10, SANGER_OFFSET);
        pipeline
            .demultiplex(DemultiplexMode::BySequence {
                mids: crate::mid::standard_mids("1-2").unwrap(),
                offset: 10,
                policy: MatchPolicy::Exact,
            })
            .unwrap();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!(summary.written, 3);
        assert_eq!(
            summary.buckets,
            vec![("MID1".to_string(), 2), (UNMATCHED.to_string(), 1)]
        );
        assert_eq!(read_headers(&dir.path().join("dm.MID1.fastq")), vec!["a", "c"]);
        assert_eq!(
            read_headers(&dir.path().join(format!("dm.{UNMATCHED}.fastq"))),
            vec!["b"]
        );
    }

    #[test]
    fn test_stage_order_is_canonical_not_registration_order() {
        // register quality filtering before primer trimming; trimming must
        // still run first, so a read whose trimmed length falls below the
        // cutoff is dropped
        let dir = tempfile::tempdir().unwrap();
        let primer = "ACGTACGT";
        let reads = vec![(
            "t".to_string(),
            format!("{primer}{}", "A".repeat(45)),
            "I".repeat(53),
        )];
        let input = dir.path().join("in.fastq");
        write_fastq(&input, &reads);

        let prefix = dir.path().join("ord").to_string_lossy().into_owned();
        let mut source = RecordSource::open_se(&input, SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, false, false);
        let mut pipeline = Pipeline::new(10, SANGER_OFFSET);
        pipeline.filter_quality(QualityConfig::default()).unwrap();
        pipeline
            .trim_primers(
                vec![PrimerDefinition {
                    name: "p".to_string(),
                    seq: primer.as_bytes().to_vec(),
                }],
                40,
                MatchPolicy::Exact,
            )
            .unwrap();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();
        assert_eq!(summary.primers_trimmed, 1);
        assert_eq!(summary.quality_dropped, 1);
        assert_eq!(summary.written, 0);
    }

    #[test]
    fn test_no_stage_registration_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.fastq");
        write_fastq(&input, &[("a".to_string(), "ACGT".to_string(), "IIII".to_string())]);

        let prefix = dir.path().join("x").to_string_lossy().into_owned();
        let mut source = RecordSource::open_se(&input, SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, false, false);
        let mut pipeline = Pipeline::new(10, SANGER_OFFSET);
        pipeline.run(&mut source, &mut sink).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Finished);

        assert!(pipeline.remove_duplicates().is_err());
        let mut source2 = RecordSource::open_se(&input, SANGER_OFFSET).unwrap();
        let mut sink2 = RecordSink::new(&prefix, false, false);
        assert!(pipeline.run(&mut source2, &mut sink2).is_err());
    }

    #[test]
    fn test_renderer_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.fastq");
        write_fastq(
            &input,
            &[("a".to_string(), "ACGT".to_string(), "IIII".to_string())],
        );

        let prefix = dir.path().join("qa").to_string_lossy().into_owned();
        let mut source = RecordSource::open_se(&input, SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, false, false);
        let mut pipeline = Pipeline::new(10, SANGER_OFFSET);
        pipeline
            .collect_qa(50, Box::new(FailingRenderer), dir.path().join("qa.pdf"))
            .unwrap();
        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!(pipeline.state(), PipelineState::Finished);
        assert!(summary.renderer_error.unwrap().contains("R binary"));
        // the FASTQ output is intact
        assert_eq!(read_headers(&dir.path().join("qa.fastq")), vec!["a"]);
    }

    #[test]
    fn test_failed_source_moves_pipeline_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("f.fastq");
        let r = dir.path().join("r.fastq");
        write_fastq(
            &f,
            &[
                ("a/1".to_string(), "ACGT".to_string(), "IIII".to_string()),
                ("b/1".to_string(), "CCCC".to_string(), "IIII".to_string()),
            ],
        );
        write_fastq(&r, &[("a/2".to_string(), "TTTT".to_string(), "IIII".to_string())]);

        let prefix = dir.path().join("bad").to_string_lossy().into_owned();
        let mut source = RecordSource::open_pe(&f, Some(&r), SANGER_OFFSET).unwrap();
        let mut sink = RecordSink::new(&prefix, true, false);
        let mut pipeline = Pipeline::new(10, SANGER_OFFSET);
        let err = pipeline.run(&mut source, &mut sink).unwrap_err();
        assert!(matches!(err, ProcessError::Format(_)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_from_config_assembles_all_stages() {
        let config = PipelineConfig {
            remove_duplicates: true,
            quality: Some(QualityConfig::default()),
            qa: Some(QaStageConfig {
                window_len: 10,
                target: PathBuf::from("qa.pdf"),
            }),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::from_config(config, Box::new(NullRenderer)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configuring);
        assert!(pipeline.dedup.is_some());
        assert!(pipeline.filter.is_some());
        assert!(pipeline.qa.is_some());
        assert!(pipeline.demux.is_none());
        assert!(pipeline.trimmer.is_none());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = PipelineConfig {
            demultiplex: DemultiplexMode::BySequence {
                mids: crate::mid::standard_mids("1-3").unwrap(),
                offset: 10,
                policy: MatchPolicy::Mismatch(1),
            },
            remove_duplicates: true,
            primer: Some(PrimerStageConfig {
                primers: vec![PrimerDefinition {
                    name: "p1".to_string(),
                    seq: b"ACGTACGT".to_vec(),
                }],
                leeway: 40,
                policy: MatchPolicy::Exact,
            }),
            quality: Some(QualityConfig::default()),
            qa: Some(QaStageConfig {
                window_len: 50,
                target: PathBuf::from("qa.pdf"),
            }),
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{config:?}"), format!("{back:?}"));
    }

    #[test]
    fn test_double_demux_rejected() {
        let mut pipeline = Pipeline::new(10, SANGER_OFFSET);
        pipeline
            .demultiplex(DemultiplexMode::ByHeader {
                pattern: r"#(\d+)/\d$".to_string(),
            })
            .unwrap();
        let err = pipeline
            .demultiplex(DemultiplexMode::ByHeader {
                pattern: r"#(\d+)/\d$".to_string(),
            })
            .err()
            .unwrap();
        assert!(matches!(err, ProcessError::Config(_)));
    }
}
