use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::script::Segment;

/// Identity of a segment's content at the moment its media was generated.
///
/// A stored result is only valid for a segment whose current key is equal,
/// so edited segments never pick up media made from older text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SegmentKey {
    pub index: usize,
    pub revision: u64,
    pub content_hash: String,
}

impl SegmentKey {
    pub fn for_segment(segment: &Segment) -> Self {
        Self {
            index: segment.index,
            revision: segment.revision,
            content_hash: content_hash(&segment.text, &segment.language),
        }
    }
}

/// SHA-256 over the trimmed text and the language code, hex encoded.
pub fn content_hash(text: &str, language: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(language.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generated media for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMedia {
    pub index: usize,
    pub character: String,
    pub text: String,
    pub language: String,
    pub job_id: String,
    pub audio: Vec<u8>,
    pub video: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Entry {
    key: SegmentKey,
    media: SegmentMedia,
}

/// Per-segment results of a run, one slot per segment index.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    entries: BTreeMap<usize, Entry>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record media for `key`, replacing anything stored for that index.
    pub fn insert(&mut self, key: SegmentKey, media: SegmentMedia) {
        self.entries.insert(key.index, Entry { key, media });
    }

    /// Media for `segment` as it currently reads, if any was generated for it.
    pub fn get(&self, segment: &Segment) -> Option<&SegmentMedia> {
        let entry = self.entries.get(&segment.index)?;
        if entry.key == SegmentKey::for_segment(segment) {
            Some(&entry.media)
        } else {
            None
        }
    }

    pub fn is_current(&self, segment: &Segment) -> bool {
        self.get(segment).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
