//! Route read sets to sample buckets by embedded MID tag or header pattern.
//!
//! The two demultiplexing variants are mutually exclusive by construction:
//! a run carries exactly one `DemultiplexMode`. Routing never modifies the
//! read, and in PE mode the forward read decides for both mates.

use serde::{Deserialize, Serialize};

use crate::error::ProcessError;
use crate::matcher::{find_tag, HeaderMatcher, MatchPolicy, TagHit};
use crate::mid::MidDefinition;
use crate::read::ReadSet;

/// Bucket name for reads no MID or pattern could claim. Such reads are
/// routed, not dropped.
pub const UNMATCHED: &str = "unmatched";

/// Which demultiplexing variant (if any) a run performs, decided once at
/// configuration time.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub enum DemultiplexMode {
    #[default]
    None,
    BySequence {
        mids: Vec<MidDefinition>,
        /// Maximum start offset of the tag within the read (inclusive).
        offset: usize,
        policy: MatchPolicy,
    },
    ByHeader {
        pattern: String,
    },
}

enum Matcher {
    BySequence {
        mids: Vec<MidDefinition>,
        offset: usize,
        policy: MatchPolicy,
    },
    ByHeader(HeaderMatcher),
}

/// Assigns each read set a bucket identifier.
pub struct Demultiplexer {
    matcher: Matcher,
}

impl Demultiplexer {
    pub fn new(mode: DemultiplexMode) -> Result<Option<Demultiplexer>, ProcessError> {
        let matcher = match mode {
            DemultiplexMode::None => return Ok(None),
            DemultiplexMode::BySequence { mids, offset, policy } => {
                if mids.is_empty() {
                    return Err(ProcessError::config(
                        "sequence demultiplexing requires at least one MID definition",
                    ));
                }
                Matcher::BySequence { mids, offset, policy }
            }
            DemultiplexMode::ByHeader { pattern } => {
                Matcher::ByHeader(HeaderMatcher::new(&pattern)?)
            }
        };
        Ok(Some(Demultiplexer { matcher }))
    }

    /// The bucket this read set belongs to. The forward read is the
    /// reference in PE mode; the mate inherits the decision.
    pub fn route(&self, set: &ReadSet) -> String {
        match &self.matcher {
            Matcher::BySequence { mids, offset, policy } => {
                let mut best: Option<(TagHit, &str)> = None;
                for mid in mids {
                    if let Some(hit) = find_tag(set.fwd().seq(), &mid.tag, *offset, *policy) {
                        // strict comparison keeps the earliest-declared MID on ties
                        if best.map_or(true, |(b, _)| {
                            (hit.mismatches, hit.offset) < (b.mismatches, b.offset)
                        }) {
                            best = Some((hit, mid.name.as_str()));
                        }
                    }
                }
                best.map_or_else(|| UNMATCHED.to_string(), |(_, name)| name.to_string())
            }
            Matcher::ByHeader(matcher) => matcher
                .bucket(set.fwd().head())
                .unwrap_or_else(|| UNMATCHED.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::read::SeqRead;
    use pretty_assertions::assert_eq;

    fn set(head: &[u8], seq: &[u8]) -> ReadSet {
        let qual = vec![b'I'; seq.len()];
        ReadSet::single(SeqRead::new(head.to_vec(), seq.to_vec(), qual).unwrap())
    }

    fn by_seq(mids: &[(&str, &[u8])], offset: usize, policy: MatchPolicy) -> Demultiplexer {
        let mids = mids
            .iter()
            .map(|(n, t)| MidDefinition::new(*n, t))
            .collect();
        Demultiplexer::new(DemultiplexMode::BySequence { mids, offset, policy })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_no_demux_mode() {
        assert!(Demultiplexer::new(DemultiplexMode::None).unwrap().is_none());
    }

    #[test]
    fn test_by_sequence_window() {
        let demux = by_seq(&[("tag", b"ACGT")], 10, MatchPolicy::Exact);
        // present at position 3: matched
        assert_eq!(demux.route(&set(b"r", b"AAAACGTCCCCCCCCCCCCC")), "tag");
        // present at position 15: outside the window
        assert_eq!(demux.route(&set(b"r", b"CCCCCCCCCCCCCCCACGTC")), UNMATCHED);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        // both tags match exactly at offset 0
        let demux = by_seq(&[("first", b"ACGT"), ("second", b"ACGT")], 5, MatchPolicy::Exact);
        assert_eq!(demux.route(&set(b"r", b"ACGTCCCC")), "first");
    }

    #[test]
    fn test_lower_mismatch_wins_over_declaration() {
        let demux = by_seq(
            &[("near", b"AGGT"), ("exact", b"ACGT")],
            5,
            MatchPolicy::Mismatch(1),
        );
        assert_eq!(demux.route(&set(b"r", b"ACGTCCCC")), "exact");
    }

    #[test]
    fn test_empty_mids_rejected() {
        let err = Demultiplexer::new(DemultiplexMode::BySequence {
            mids: vec![],
            offset: 10,
            policy: MatchPolicy::Exact,
        })
        .err()
        .unwrap();
        assert!(matches!(err, ProcessError::Config(_)));
    }

    #[test]
    fn test_by_header() {
        let demux = Demultiplexer::new(DemultiplexMode::ByHeader {
            pattern: r"#(\d+)/\d$".to_string(),
        })
        .unwrap()
        .unwrap();
        assert_eq!(demux.route(&set(b"read1#7/1", b"ACGT")), "7");
        assert_eq!(demux.route(&set(b"read1", b"ACGT")), UNMATCHED);
    }

    #[test]
    fn test_pe_mate_inherits_forward_routing() {
        let demux = by_seq(&[("tag", b"ACGT")], 5, MatchPolicy::Exact);
        // tag only in the forward read; pair still routes to "tag"
        let rs = ReadSet::paired(
            SeqRead::new(b"a/1".to_vec(), b"ACGTAAAA".to_vec(), vec![b'I'; 8]).unwrap(),
            SeqRead::new(b"a/2".to_vec(), b"GGGGGGGG".to_vec(), vec![b'I'; 8]).unwrap(),
        );
        assert_eq!(demux.route(&rs), "tag");
    }
}
