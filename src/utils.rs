//! Utility methods.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::ProcessError;

const GZ_BUF_SIZE: usize = 1 << 22;

/// Open a (possibly gzipped) file into a BufReader.
pub fn open_with_gz<P: AsRef<Path>>(p: P) -> Result<Box<dyn BufRead>, ProcessError> {
    let r = File::open(p.as_ref())?;

    if has_extension(p.as_ref(), "gz") {
        let gz = MultiGzDecoder::new(r);
        let buf_reader = BufReader::with_capacity(GZ_BUF_SIZE, gz);
        Ok(Box::new(buf_reader))
    } else {
        let buf_reader = BufReader::with_capacity(32 * 1024, r);
        Ok(Box::new(buf_reader))
    }
}

/// Create an output file, gzip-compressing when the path ends in `.gz`.
pub fn create_with_gz<P: AsRef<Path>>(p: P) -> Result<Box<dyn Write>, ProcessError> {
    let w = File::create(p.as_ref())?;

    if has_extension(p.as_ref(), "gz") {
        let gz = GzEncoder::new(BufWriter::new(w), Compression::default());
        Ok(Box::new(gz))
    } else {
        Ok(Box::new(BufWriter::new(w)))
    }
}

/// True if the final extension of `p` equals `ext` (case-insensitive).
pub fn has_extension(p: &Path, ext: &str) -> bool {
    p.extension()
        .map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

/// The path with a trailing `.gz` removed, for format detection of
/// compressed inputs.
pub fn strip_gz(p: &Path) -> &Path {
    if has_extension(p, "gz") {
        Path::new(p.file_stem().map_or(p.as_os_str(), |s| s))
    } else {
        p
    }
}

/// Read a (possibly gzipped) FASTA file into `(name, sequence)` pairs.
/// The name is the header token before the first whitespace; sequences are
/// uppercased and may span multiple lines.
pub fn read_fasta<P: AsRef<Path>>(p: P) -> Result<Vec<(String, Vec<u8>)>, ProcessError> {
    let rdr = open_with_gz(p.as_ref())?;
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for line in rdr.lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(head) = line.strip_prefix('>') {
            let name = head.split_whitespace().next().unwrap_or("").to_string();
            if name.is_empty() {
                return Err(ProcessError::Format(format!(
                    "unnamed FASTA record in {}",
                    p.as_ref().display()
                )));
            }
            entries.push((name, Vec::new()));
        } else {
            match entries.last_mut() {
                Some((_, seq)) => seq.extend(line.bytes().map(|b| b.to_ascii_uppercase())),
                None => {
                    return Err(ProcessError::Format(format!(
                        "{}: sequence data before the first FASTA header",
                        p.as_ref().display()
                    )))
                }
            }
        }
    }
    Ok(entries)
}
