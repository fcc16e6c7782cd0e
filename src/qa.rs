//! Positional quality statistics over the 3' end of surviving reads, and
//! the external renderer that turns them into a QA graph.
//!
//! The collector tracks (count, quality sum) for each of the last
//! `window_len` positions of every read, counted from the 3' end; position 0
//! is the final base. Rendering happens once, after end of stream, through
//! the `Renderer` seam so tests can verify the hand-off without a working R
//! installation. A renderer failure is advisory: it is logged and reported
//! but never invalidates the FASTQ output already written.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::read::ReadSet;

pub struct QaCollector {
    window_len: usize,
    offset: u8,
    counts: Vec<u64>,
    sums: Vec<u64>,
}

impl QaCollector {
    pub fn new(window_len: usize, offset: u8) -> QaCollector {
        QaCollector {
            window_len,
            offset,
            counts: vec![0; window_len],
            sums: vec![0; window_len],
        }
    }

    /// Accumulate every read of a surviving set.
    pub fn record(&mut self, set: &ReadSet) {
        for read in set.reads() {
            let len = read.len();
            let span = self.window_len.min(len);
            for (i, q) in read.decoded_quals(self.offset).rev().take(span).enumerate() {
                self.counts[i] += 1;
                self.sums[i] += u64::from(q);
            }
        }
    }

    /// Mean quality per position from the 3' end, one value per window
    /// position. Positions never covered by any read report 0.
    pub fn means(&self) -> impl Iterator<Item = f64> + '_ {
        self.counts.iter().zip(&self.sums).map(|(&n, &sum)| {
            if n == 0 {
                0.0
            } else {
                sum as f64 / n as f64
            }
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }
}

/// Renders accumulated positional quality means to a target path.
pub trait Renderer {
    fn render(&self, means: &[f64], target: &Path) -> Result<()>;
}

/// Production renderer: writes the means as a TSV next to the target,
/// generates a small R script and invokes the configured R binary out of
/// process.
pub struct RScriptRenderer {
    rpath: PathBuf,
}

impl RScriptRenderer {
    pub fn new(rpath: impl Into<PathBuf>) -> RScriptRenderer {
        RScriptRenderer {
            rpath: rpath.into(),
        }
    }
}

impl Renderer for RScriptRenderer {
    fn render(&self, means: &[f64], target: &Path) -> Result<()> {
        let data_path = target.with_extension("tsv");
        let script_path = target.with_extension("R");

        let mut data = File::create(&data_path)
            .with_context(|| format!("creating QA data file {}", data_path.display()))?;
        writeln!(data, "position\tmean_quality")?;
        for (pos, mean) in means.iter().enumerate() {
            writeln!(data, "{pos}\t{mean:.4}")?;
        }
        data.flush()?;

        let mut script = File::create(&script_path)
            .with_context(|| format!("creating QA R script {}", script_path.display()))?;
        writeln!(
            script,
            "d <- read.delim(\"{data}\")\n\
             pdf(\"{target}\")\n\
             plot(d$position, d$mean_quality, type=\"l\", xlab=\"Position from 3' end\",\n\
                  ylab=\"Mean quality\", main=\"3' cross-sectional quality dropoff\")\n\
             invisible(dev.off())",
            data = data_path.display(),
            target = target.display(),
        )?;
        script.flush()?;

        let status = Command::new(&self.rpath)
            .arg("--vanilla")
            .arg("--slave")
            .arg("-f")
            .arg(&script_path)
            .status()
            .with_context(|| format!("invoking R at {}", self.rpath.display()))?;
        if !status.success() {
            bail!("R exited with {status} while rendering {}", target.display());
        }
        Ok(())
    }
}
