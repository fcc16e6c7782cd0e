//! Pure matching primitives: positional tag search within an offset window,
//! and header-pattern extraction.

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// How closely a tag must match the read sequence to count as found.
/// The comparison policy is deliberately swappable; the default is an
/// exact (zero-mismatch) comparison.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPolicy {
    Exact,
    /// Allow up to this many mismatched bases (Hamming distance).
    Mismatch(u32),
}

impl Default for MatchPolicy {
    fn default() -> MatchPolicy {
        MatchPolicy::Exact
    }
}

impl MatchPolicy {
    fn budget(self) -> u32 {
        match self {
            MatchPolicy::Exact => 0,
            MatchPolicy::Mismatch(n) => n,
        }
    }

    /// Hamming distance between `pattern` and the same-length slice of
    /// `text` at `offset`, or `None` if it exceeds the policy budget or the
    /// pattern does not fit.
    pub fn mismatches(self, pattern: &[u8], text: &[u8], offset: usize) -> Option<u32> {
        if offset + pattern.len() > text.len() {
            return None;
        }
        let budget = self.budget();
        let mut mm = 0u32;
        for (p, t) in pattern.iter().zip(&text[offset..]) {
            if !p.eq_ignore_ascii_case(t) {
                mm += 1;
                if mm > budget {
                    return None;
                }
            }
        }
        Some(mm)
    }
}

/// A tag located within a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagHit {
    /// 0-based start position of the tag in the read.
    pub offset: usize,
    pub mismatches: u32,
}

/// Find the best placement of `tag` with a start position within the first
/// `window` bases (inclusive). Best means fewest mismatches, then lowest
/// offset; scanning offsets in ascending order makes the first zero-mismatch
/// hit optimal.
pub fn find_tag(seq: &[u8], tag: &[u8], window: usize, policy: MatchPolicy) -> Option<TagHit> {
    if tag.is_empty() {
        return None;
    }
    let mut best: Option<TagHit> = None;
    for offset in 0..=window {
        if let Some(mm) = policy.mismatches(tag, seq, offset) {
            if mm == 0 {
                return Some(TagHit { offset, mismatches: 0 });
            }
            if best.map_or(true, |b| mm < b.mismatches) {
                best = Some(TagHit { offset, mismatches: mm });
            }
        }
    }
    best
}

/// Find the first placement of `tag` the policy accepts, scanning start
/// positions in ascending order through the window (inclusive). Unlike
/// [`find_tag`], a later placement with fewer mismatches never outranks an
/// earlier accepted one.
pub fn first_tag(seq: &[u8], tag: &[u8], window: usize, policy: MatchPolicy) -> Option<TagHit> {
    if tag.is_empty() {
        return None;
    }
    (0..=window).find_map(|offset| {
        policy
            .mismatches(tag, seq, offset)
            .map(|mismatches| TagHit { offset, mismatches })
    })
}

/// Extract a bucket identifier from a read header using a regular
/// expression; the first capturing group's value is the identifier.
pub struct HeaderMatcher {
    re: Regex,
}

impl HeaderMatcher {
    pub fn new(pattern: &str) -> Result<HeaderMatcher, ProcessError> {
        let re = Regex::new(pattern)
            .map_err(|e| ProcessError::Config(format!("invalid header pattern: {e}")))?;
        if re.captures_len() < 2 {
            return Err(ProcessError::Config(format!(
                "header pattern '{pattern}' has no capturing group"
            )));
        }
        Ok(HeaderMatcher { re })
    }

    /// The bucket identifier for this header, or `None` when the pattern
    /// does not match or the group did not participate.
    pub fn bucket(&self, head: &[u8]) -> Option<String> {
        self.re
            .captures(head)
            .and_then(|caps| caps.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
    }
}
