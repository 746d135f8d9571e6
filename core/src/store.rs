//! Observable record store: in-memory list, local cache, optional remote.
//!
//! All mutation goes through `&mut self`, so the owner of the store is the
//! single writer. Remote writes run as background tasks and report back
//! through [`SyncEvent`]s; they never touch the in-memory list. Writes for the
//! same record id are chained so they land in call order.

use std::collections::HashMap;
use std::future::Future;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::local::LocalCache;
use crate::models::RecordKind;
use crate::reconcile;
use crate::record::Record;
use crate::remote::{DEFAULT_FETCH_LIMIT, Fetched, RemoteStore};

const EVENT_CAPACITY: usize = 64;

/// Something that happened on the way to or from the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Upserted {
        kind: RecordKind,
        id: Uuid,
    },
    UpsertFailed {
        kind: RecordKind,
        id: Uuid,
        error: String,
    },
    Deleted {
        kind: RecordKind,
        id: Uuid,
        existed: bool,
    },
    DeleteFailed {
        kind: RecordKind,
        id: Uuid,
        error: String,
    },
    Fetched {
        kind: RecordKind,
        count: usize,
        dropped: usize,
    },
    FetchFailed {
        kind: RecordKind,
        error: String,
    },
    LocalSaveFailed {
        kind: RecordKind,
        error: String,
    },
}

fn report(events: &broadcast::Sender<SyncEvent>, event: SyncEvent) {
    match &event {
        SyncEvent::Upserted { kind, id } => {
            tracing::debug!(%kind, %id, "remote upsert succeeded");
        }
        SyncEvent::UpsertFailed { kind, id, error } => {
            tracing::warn!(%kind, %id, %error, "remote upsert failed");
        }
        SyncEvent::Deleted { kind, id, existed } => {
            tracing::debug!(%kind, %id, existed, "remote delete succeeded");
        }
        SyncEvent::DeleteFailed { kind, id, error } => {
            tracing::warn!(%kind, %id, %error, "remote delete failed");
        }
        SyncEvent::Fetched {
            kind,
            count,
            dropped,
        } => {
            if *dropped > 0 {
                tracing::warn!(%kind, count, dropped, "remote fetch dropped undecodable records");
            } else {
                tracing::debug!(%kind, count, "remote fetch succeeded");
            }
        }
        SyncEvent::FetchFailed { kind, error } => {
            tracing::warn!(%kind, %error, "remote fetch failed");
        }
        SyncEvent::LocalSaveFailed { kind, error } => {
            tracing::error!(%kind, %error, "local save failed");
        }
    }
    // No subscribers is fine.
    let _ = events.send(event);
}

/// Counts from one remote fetch applied to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub fetched: usize,
    pub dropped: usize,
    pub added: usize,
    pub updated: usize,
    /// Records that lost their key to another id, queued for remote deletion.
    pub superseded: usize,
}

pub struct Store<R: Record> {
    records: Vec<R>,
    cache: LocalCache<R>,
    remote: Option<RemoteStore<R>>,
    fetch_limit: usize,
    observers: watch::Sender<Vec<R>>,
    events: broadcast::Sender<SyncEvent>,
    in_flight: HashMap<Uuid, JoinHandle<()>>,
}

impl<R: Record> Store<R> {
    /// Loads the local cache synchronously. Call [`Store::sync`] afterwards to
    /// pull the remote snapshot.
    pub fn open(cache: LocalCache<R>, remote: Option<RemoteStore<R>>) -> Self {
        let records = cache.load();
        let (observers, _) = watch::channel(records.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records,
            cache,
            remote,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            observers,
            events,
            in_flight: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.records.iter().find(|r| r.key() == *key)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Receives the full list after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<R>> {
        self.observers.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Insert or replace by key, persist, and push to the remote in the
    /// background. A replaced record keeps the id it already had.
    pub fn save(&mut self, record: R) -> R {
        let key = record.key();
        let stored = if let Some(existing) = self.records.iter_mut().find(|r| r.key() == key) {
            let record = record.with_id(existing.id());
            *existing = record.clone();
            record
        } else {
            self.records.push(record.clone());
            record
        };

        self.persist();
        self.publish();
        self.spawn_upsert(stored.clone());
        stored
    }

    /// Remove by key. A missing key changes nothing.
    pub fn remove(&mut self, key: &R::Key) -> Option<R> {
        let idx = self.records.iter().position(|r| r.key() == *key)?;
        let removed = self.records.remove(idx);

        self.persist();
        self.publish();
        self.spawn_delete(removed.id());
        Some(removed)
    }

    /// Fetch the remote snapshot without borrowing the store, so writes can
    /// continue while it is in flight. Feed the result to
    /// [`Store::apply_remote`]. `None` when there is no remote or the fetch
    /// failed.
    pub fn fetch_remote(&self) -> impl Future<Output = Option<Fetched<R>>> + Send + 'static {
        let remote = self.remote.clone();
        let events = self.events.clone();
        let limit = self.fetch_limit;
        async move {
            let remote = remote?;
            match remote.fetch_all(limit).await {
                Ok(fetched) => {
                    report(
                        &events,
                        SyncEvent::Fetched {
                            kind: R::KIND,
                            count: fetched.records.len(),
                            dropped: fetched.dropped,
                        },
                    );
                    Some(fetched)
                }
                Err(err) => {
                    report(
                        &events,
                        SyncEvent::FetchFailed {
                            kind: R::KIND,
                            error: err.to_string(),
                        },
                    );
                    None
                }
            }
        }
    }

    /// Merge a fetched snapshot into the list (remote wins) and persist it.
    /// Remote records that lost their key to a record with another id are
    /// deleted from the remote, so a day converges on one record.
    pub fn apply_remote(&mut self, fetched: Fetched<R>) -> SyncOutcome {
        let fetched_count = fetched.records.len();
        let local = std::mem::take(&mut self.records);
        let merged = reconcile::merge(local, fetched.records);
        let outcome = SyncOutcome {
            fetched: fetched_count,
            dropped: fetched.dropped,
            added: merged.added,
            updated: merged.updated,
            superseded: merged.superseded.len(),
        };
        let changed = merged.changed();
        self.records = merged.records;

        self.persist();
        if changed {
            self.publish();
        }
        for id in merged.superseded {
            self.spawn_delete(id);
        }
        outcome
    }

    /// Fetch and merge in one step.
    pub async fn sync(&mut self) -> Option<SyncOutcome> {
        let fetched = self.fetch_remote().await?;
        Some(self.apply_remote(fetched))
    }

    /// Wait for every in-flight remote write.
    pub async fn flush(&mut self) {
        for (id, handle) in self.in_flight.drain() {
            if let Err(err) = handle.await {
                tracing::error!(%id, error = %err, "remote write task did not complete");
            }
        }
    }

    fn persist(&self) {
        if let Err(err) = self.cache.save(&self.records) {
            report(
                &self.events,
                SyncEvent::LocalSaveFailed {
                    kind: R::KIND,
                    error: format!("{err:#}"),
                },
            );
        }
    }

    fn publish(&self) {
        self.observers.send_replace(self.records.clone());
    }

    fn spawn_upsert(&mut self, record: R) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let events = self.events.clone();
        let id = record.id();
        self.track(id, async move {
            let event = match remote.upsert(&record).await {
                Ok(()) => SyncEvent::Upserted { kind: R::KIND, id },
                Err(err) => SyncEvent::UpsertFailed {
                    kind: R::KIND,
                    id,
                    error: err.to_string(),
                },
            };
            report(&events, event);
        });
    }

    fn spawn_delete(&mut self, id: Uuid) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let events = self.events.clone();
        self.track(id, async move {
            let event = match remote.delete(id).await {
                Ok(existed) => SyncEvent::Deleted {
                    kind: R::KIND,
                    id,
                    existed,
                },
                Err(err) => SyncEvent::DeleteFailed {
                    kind: R::KIND,
                    id,
                    error: err.to_string(),
                },
            };
            report(&events, event);
        });
    }

    /// Spawn `write` after any earlier write for the same id.
    fn track<F>(&mut self, id: Uuid, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(kind = %R::KIND, %id, "no async runtime, skipping remote write");
            return;
        };
        self.in_flight.retain(|_, h| !h.is_finished());
        let previous = self.in_flight.remove(&id);
        let task = runtime.spawn(async move {
            if let Some(previous) = previous
                && let Err(err) = previous.await
            {
                tracing::error!(%id, error = %err, "earlier remote write task did not complete");
            }
            write.await;
        });
        self.in_flight.insert(id, task);
    }
}
