//! Global duplicate removal over the whole run.
//!
//! Each read set is reduced to a fixed-size SHA-256 digest of its sequence
//! content (both mates concatenated in PE mode). The index keeps every
//! digest seen since the pipeline started, so memory grows linearly with the
//! number of unique read sets; that is the explicit cost of exact,
//! first-occurrence-wins deduplication. Determinism depends only on stream
//! order, never on batch boundaries.

use fxhash::FxHashSet;
use sha2::{Digest, Sha256};

use crate::read::ReadSet;

type Fingerprint = [u8; 32];

/// Run-scoped set of content fingerprints. Created empty at pipeline start
/// and discarded with the pipeline.
#[derive(Default)]
pub struct DuplicateIndex {
    seen: FxHashSet<Fingerprint>,
}

impl DuplicateIndex {
    pub fn new() -> DuplicateIndex {
        DuplicateIndex::default()
    }

    /// Number of distinct fingerprints retained.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Insert a fingerprint, returning true if it was not already present.
    fn insert(&mut self, fp: Fingerprint) -> bool {
        self.seen.insert(fp)
    }
}

/// Content fingerprint of a read set. Mate sequences are separated by a
/// byte that cannot occur in a sequence, so ("AC","GT") and ("ACG","T")
/// fingerprint differently.
pub fn fingerprint(set: &ReadSet) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(set.fwd().seq());
    if let Some(rev) = set.rev() {
        hasher.update([0u8]);
        hasher.update(rev.seq());
    }
    hasher.finalize().into()
}

/// The duplicate-removal stage: first occurrence of a fingerprint is kept,
/// every later one is dropped (with its mate, atomically).
pub struct DuplicateRemover {
    index: DuplicateIndex,
    dropped: u64,
}

impl DuplicateRemover {
    pub fn new() -> DuplicateRemover {
        DuplicateRemover {
            index: DuplicateIndex::new(),
            dropped: 0,
        }
    }

    /// True if the read set is the first with its content and should be kept.
    pub fn keep(&mut self, set: &ReadSet) -> bool {
        let fresh = self.index.insert(fingerprint(set));
        if !fresh {
            self.dropped += 1;
        }
        fresh
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn unique(&self) -> usize {
        self.index.len()
    }
}

impl Default for DuplicateRemover {
    fn default() -> Self {
        Self::new()
    }
}
