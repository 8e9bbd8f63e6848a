use crate::error::{Result, SnapshotError};
use crate::hasher::{ContentHasher, Digest};
use crate::schema::DigestOptions;
use crate::snapshot::{BatchKey, Snapshot, SnapshotStore};
use indexmap::IndexMap;
use log::{debug, warn};
use std::fmt::Display;

/// Groups of keys whose snapshots share a digest. Only groups of two or more are kept.
pub type DuplicateGroups<K> = IndexMap<Digest, Vec<K>>;

pub struct DuplicateDetector {
    hasher: ContentHasher,
}

impl DuplicateDetector {
    pub fn new(options: DigestOptions) -> Self {
        Self {
            hasher: ContentHasher::new(options),
        }
    }

    /// Groups keys by content digest.
    ///
    /// Groups appear in the order their first member was seen, and keys within a
    /// group keep input order.
    pub fn find_duplicates<'a, K, I>(&self, entries: I) -> DuplicateGroups<K>
    where
        I: IntoIterator<Item = (K, &'a Snapshot)>,
    {
        let mut groups: DuplicateGroups<K> = IndexMap::new();

        for (key, snapshot) in entries {
            let digest = self.hasher.digest(snapshot);
            groups.entry(digest).or_default().push(key);
        }

        let total = groups.len();
        groups.retain(|_, keys| keys.len() > 1);
        debug!(
            "Hashed {} distinct digests, {} shared by more than one snapshot",
            total,
            groups.len()
        );

        groups
    }

    pub fn find_in_store(&self, store: &SnapshotStore) -> DuplicateGroups<BatchKey> {
        self.find_duplicates(store.iter().map(|(key, snapshot)| (key.clone(), snapshot)))
    }

    /// Strict mode: fails with every offending group when any duplicates exist.
    pub fn ensure_unique<'a, K, I>(&self, entries: I) -> Result<()>
    where
        K: Display,
        I: IntoIterator<Item = (K, &'a Snapshot)>,
    {
        let groups = self.find_duplicates(entries);
        if groups.is_empty() {
            return Ok(());
        }

        let groups: Vec<Vec<String>> = groups
            .into_iter()
            .map(|(digest, keys)| {
                let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                warn!("Snapshots share digest {}: {}", digest, names.join(", "));
                names
            })
            .collect();

        Err(SnapshotError::DuplicateData { groups })
    }
}

pub fn find_duplicates(store: &SnapshotStore, options: DigestOptions) -> DuplicateGroups<BatchKey> {
    DuplicateDetector::new(options).find_in_store(store)
}

pub fn ensure_no_duplicates(store: &SnapshotStore, options: DigestOptions) -> Result<()> {
    DuplicateDetector::new(options).ensure_unique(store.iter())
}
