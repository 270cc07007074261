//! Content fingerprints and the bounded set of already-forwarded records.

use std::{
    collections::{HashSet, VecDeque},
    fmt::Write,
};

use sha2::{Digest, Sha256};

/// Evict once the set grows past this many fingerprints...
pub const SEEN_CAP: usize = 5000;
/// ...keeping only this many of the most recently inserted.
pub const SEEN_RETAIN: usize = 2000;

/// Lowercase hex SHA-256 of `"{timestamp}|{sender}|{message}"`.
///
/// The layout matches the digests already present in deployed state files, so
/// changing it would re-forward everything still inside the upstream window.
pub fn fingerprint(timestamp: &str, sender: &str, message: &str) -> String {
    let mut h = Sha256::new();
    h.update(timestamp.as_bytes());
    h.update(b"|");
    h.update(sender.as_bytes());
    h.update(b"|");
    h.update(message.as_bytes());
    to_hex(&h.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Insertion-ordered set of fingerprints with "keep the newest" eviction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeenSet {
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted list (oldest first). Duplicates keep their
    /// first position; an oversized list is trimmed to the newest entries.
    pub fn from_ordered(items: impl IntoIterator<Item = String>) -> Self {
        let mut set = Self::new();
        for item in items {
            set.push(item);
        }
        if set.len() > SEEN_CAP {
            set.retain_newest(SEEN_RETAIN);
        }
        set
    }

    pub fn contains(&self, fp: &str) -> bool {
        self.index.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Record a fingerprint and evict if the cap is exceeded.
    ///
    /// Returns `false` if it was already present (its position is not refreshed).
    pub fn insert(&mut self, fp: String) -> bool {
        if !self.push(fp) {
            return false;
        }
        if self.len() > SEEN_CAP {
            self.retain_newest(SEEN_RETAIN);
        }
        true
    }

    /// Oldest first; this is the persisted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    fn push(&mut self, fp: String) -> bool {
        if self.index.contains(&fp) {
            return false;
        }
        self.index.insert(fp.clone());
        self.order.push_back(fp);
        true
    }

    fn retain_newest(&mut self, keep: usize) {
        while self.order.len() > keep {
            if let Some(old) = self.order.pop_front() {
                self.index.remove(&old);
            }
        }
    }
}
