use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::record::Record;

/// Outcome of merging a remote snapshot into the local one.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged<R> {
    /// Deduplicated records, ordered by key.
    pub records: Vec<R>,
    /// Remote records whose key was not present locally.
    pub added: usize,
    /// Local records replaced by a remote record with different contents.
    pub updated: usize,
    /// Ids that lost their key to a record with another id. Nothing in
    /// `records` carries them, so their remote copies are stale.
    pub superseded: Vec<Uuid>,
}

impl<R> Merged<R> {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

/// Overlay `remote` on `local` by key. Remote wins every collision, whatever
/// the field values; local-only records are kept. Among remote records that
/// share a key the last one wins.
pub fn merge<R: Record>(local: Vec<R>, remote: Vec<R>) -> Merged<R> {
    let local: BTreeMap<R::Key, R> = local.into_iter().map(|r| (r.key(), r)).collect();
    let mut merged = local.clone();
    let mut superseded = Vec::new();

    for record in remote {
        if let Some(previous) = merged.insert(record.key(), record) {
            superseded.push(previous.id());
        }
    }

    let mut added = 0;
    let mut updated = 0;
    for (key, record) in &merged {
        match local.get(key) {
            None => added += 1,
            Some(previous) if previous != record => updated += 1,
            Some(_) => {}
        }
    }

    let kept: HashSet<Uuid> = merged.values().map(Record::id).collect();
    superseded.retain(|id| !kept.contains(id));
    superseded.sort_unstable();
    superseded.dedup();

    Merged {
        records: merged.into_values().collect(),
        added,
        updated,
        superseded,
    }
}
