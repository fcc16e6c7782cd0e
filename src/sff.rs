//! Minimal reader for 454/Ion Torrent SFF files.
//!
//! Only the fields needed to recover trimmed reads are decoded: the common
//! header is parsed for its layout, flowgram data is skipped, and each read
//! is emitted with its quality/adapter clip points already applied. Phred
//! scores are re-encoded as ASCII with the run's quality offset so an SFF
//! source is indistinguishable from a FASTQ source downstream.

use std::io::Read;

use crate::error::ProcessError;
use crate::read::SeqRead;

pub const SFF_MAGIC: u32 = 0x2E73_6666; // ".sff"
const SFF_VERSION: [u8; 4] = [0, 0, 0, 1];

fn read_u16<R: Read>(r: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_bytes<R: Read>(r: &mut R, n: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Skip the padding that aligns SFF sections to 8-byte boundaries.
fn skip_pad<R: Read>(r: &mut R, consumed: usize) -> std::io::Result<()> {
    let rem = consumed % 8;
    if rem != 0 {
        let mut pad = [0u8; 8];
        r.read_exact(&mut pad[..8 - rem])?;
    }
    Ok(())
}

/// Resolve the clip points of one read into a 0-based half-open range.
/// Clip values are 1-based and inclusive; zero means "no clipping here".
/// Clips pointing past the end of the read are clamped to its length.
pub(crate) fn clip_range(
    n_bases: usize,
    clip_qual_left: u16,
    clip_qual_right: u16,
    clip_adapter_left: u16,
    clip_adapter_right: u16,
) -> (usize, usize) {
    let first = (clip_qual_left.max(clip_adapter_left).max(1) - 1) as usize;
    let right = |clip: u16| {
        if clip == 0 {
            n_bases
        } else {
            (clip as usize).min(n_bases)
        }
    };
    let last = right(clip_qual_right).min(right(clip_adapter_right));
    (first.min(last), last)
}

/// Streaming SFF record reader over any byte source.
pub struct SffReader<R: Read> {
    inner: R,
    n_flows: usize,
    remaining: u32,
    index_offset: u64,
    index_length: u32,
    bytes_read: u64,
    qual_offset: u8,
}

impl<R: Read> SffReader<R> {
    /// Parse the common header and position the reader at the first record.
    pub fn new(mut inner: R, qual_offset: u8) -> Result<SffReader<R>, ProcessError> {
        let magic = read_u32(&mut inner)?;
        if magic != SFF_MAGIC {
            return Err(ProcessError::format("not an SFF file (bad magic number)"));
        }
        let mut version = [0u8; 4];
        inner.read_exact(&mut version)?;
        if version != SFF_VERSION {
            return Err(ProcessError::Format(format!(
                "unsupported SFF version {version:?}"
            )));
        }
        let index_offset = read_u64(&mut inner)?;
        let index_length = read_u32(&mut inner)?;
        let remaining = read_u32(&mut inner)?;
        let header_length = read_u16(&mut inner)? as usize;
        let key_length = read_u16(&mut inner)? as usize;
        let n_flows = read_u16(&mut inner)? as usize;
        let flowgram_format = read_bytes(&mut inner, 1)?[0];
        if flowgram_format != 1 {
            return Err(ProcessError::Format(format!(
                "unsupported SFF flowgram format code {flowgram_format}"
            )));
        }
        let _flow_chars = read_bytes(&mut inner, n_flows)?;
        let _key = read_bytes(&mut inner, key_length)?;
        // 31 fixed bytes precede the flow chars
        skip_pad(&mut inner, 31 + n_flows + key_length)?;

        Ok(SffReader {
            inner,
            n_flows,
            remaining,
            index_offset,
            index_length,
            bytes_read: header_length as u64,
            qual_offset,
        })
    }

    /// Number of records the common header promises.
    pub fn len(&self) -> u32 {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// The index block may be stored between read blocks; skip it if the
    /// read cursor has landed on it.
    fn maybe_skip_index(&mut self) -> std::io::Result<()> {
        if self.index_length > 0 && self.bytes_read == self.index_offset {
            let mut len = self.index_length as usize;
            // index block is itself 8-byte padded
            len += (8 - len % 8) % 8;
            std::io::copy(
                &mut self.inner.by_ref().take(len as u64),
                &mut std::io::sink(),
            )?;
            self.bytes_read += len as u64;
        }
        Ok(())
    }

    /// Read the next record, with clip points applied.
    pub fn next_read(&mut self) -> Result<Option<SeqRead>, ProcessError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.maybe_skip_index()?;
        self.remaining -= 1;

        let header_length = read_u16(&mut self.inner)? as usize;
        let name_length = read_u16(&mut self.inner)? as usize;
        let n_bases = read_u32(&mut self.inner)? as usize;
        let clip_qual_left = read_u16(&mut self.inner)?;
        let clip_qual_right = read_u16(&mut self.inner)?;
        let clip_adapter_left = read_u16(&mut self.inner)?;
        let clip_adapter_right = read_u16(&mut self.inner)?;
        let name = read_bytes(&mut self.inner, name_length)?;
        skip_pad(&mut self.inner, 16 + name_length)?;

        let _flowgram = read_bytes(&mut self.inner, 2 * self.n_flows)?;
        let _flow_index = read_bytes(&mut self.inner, n_bases)?;
        let bases = read_bytes(&mut self.inner, n_bases)?;
        let scores = read_bytes(&mut self.inner, n_bases)?;
        let data_len = 2 * self.n_flows + 3 * n_bases;
        skip_pad(&mut self.inner, data_len)?;

        self.bytes_read += header_length as u64 + data_len as u64;
        self.bytes_read += (8 - data_len as u64 % 8) % 8;

        let (first, last) = clip_range(
            n_bases,
            clip_qual_left,
            clip_qual_right,
            clip_adapter_left,
            clip_adapter_right,
        );
        let seq = bases[first..last].to_ascii_uppercase();
        let qual: Vec<u8> = scores[first..last]
            .iter()
            .map(|&q| q.saturating_add(self.qual_offset))
            .collect();
        Ok(Some(SeqRead::new(name, seq, qual)?))
    }
}
