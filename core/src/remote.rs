//! Remote document store seam.
//!
//! [`RemoteDatabase`] is the raw document API (save, delete, query by record
//! type) and [`RemoteStore`] is the typed adapter the [`crate::store::Store`]
//! drives. Adapter calls return their errors; turning failures into log
//! events is the store's job.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::record::{FieldValue, Fields, Record};

/// Most records a single fetch brings back.
pub const DEFAULT_FETCH_LIMIT: usize = 100;

pub const DEFAULT_CONTAINER: &str = "iCloud.com.luellasun.calorie-tracker";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Unavailable(String),
    #[error("remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid response from remote store: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_type: String,
    pub record_name: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub ascending: bool,
}

impl SortBy {
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub record_type: String,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortBy>,
}

impl Query {
    pub fn new(record_type: &str, limit: usize) -> Self {
        Self {
            record_type: record_type.to_string(),
            limit,
            sort: None,
        }
    }

    #[must_use]
    pub fn sorted(mut self, sort: SortBy) -> Self {
        self.sort = Some(sort);
        self
    }
}

fn rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Int(_) => 0,
        FieldValue::Date(_) => 1,
        FieldValue::String(_) => 2,
    }
}

fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (Some(FieldValue::Int(x)), Some(FieldValue::Int(y))) => x.cmp(y),
        (Some(FieldValue::Date(x)), Some(FieldValue::Date(y))) => x.cmp(y),
        (Some(FieldValue::String(x)), Some(FieldValue::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => rank(x).cmp(&rank(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort by a field. Records missing the field go last either way.
pub fn sort_records(records: &mut [RemoteRecord], sort: Option<&SortBy>) {
    let Some(sort) = sort else {
        return;
    };
    records.sort_by(|a, b| {
        let (va, vb) = (a.fields.get(&sort.field), b.fields.get(&sort.field));
        match (va, vb) {
            (Some(_), Some(_)) if !sort.ascending => compare_values(vb, va),
            _ => compare_values(va, vb),
        }
    });
}

/// A remote document database scoped by container name.
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    /// Create or replace the record with the same type and name.
    async fn save(&self, container: &str, record: RemoteRecord) -> Result<(), RemoteError>;

    /// Returns whether a record was removed.
    async fn delete(
        &self,
        container: &str,
        record_type: &str,
        record_name: &str,
    ) -> Result<bool, RemoteError>;

    async fn query(&self, container: &str, query: Query) -> Result<Vec<RemoteRecord>, RemoteError>;
}

/// Result of a bulk fetch. `dropped` counts records that failed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<R> {
    pub records: Vec<R>,
    pub dropped: usize,
}

/// Typed adapter over a [`RemoteDatabase`] for one record kind.
pub struct RemoteStore<R> {
    db: Arc<dyn RemoteDatabase>,
    container: String,
    _kind: PhantomData<fn() -> R>,
}

impl<R> Clone for RemoteStore<R> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            container: self.container.clone(),
            _kind: PhantomData,
        }
    }
}

impl<R: Record> RemoteStore<R> {
    pub fn new(db: Arc<dyn RemoteDatabase>, container: &str) -> Self {
        Self {
            db,
            container: container.to_string(),
            _kind: PhantomData,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub async fn upsert(&self, record: &R) -> Result<(), RemoteError> {
        let remote = RemoteRecord {
            record_type: R::KIND.as_str().to_string(),
            record_name: record.id().to_string(),
            fields: record.to_fields(),
        };
        self.db.save(&self.container, remote).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, RemoteError> {
        self.db
            .delete(&self.container, R::KIND.as_str(), &id.to_string())
            .await
    }

    pub async fn fetch_all(&self, limit: usize) -> Result<Fetched<R>, RemoteError> {
        let mut query = Query::new(R::KIND.as_str(), limit);
        if let Some((field, ascending)) = R::SORT {
            query.sort = Some(SortBy {
                field: field.to_string(),
                ascending,
            });
        }

        let raw = self.db.query(&self.container, query).await?;
        let total = raw.len();
        let records: Vec<R> = raw
            .iter()
            .filter_map(|r| {
                let decoded = R::from_fields(&r.record_name, &r.fields);
                if decoded.is_none() {
                    tracing::debug!(
                        kind = %R::KIND,
                        record = %r.record_name,
                        "dropping remote record that failed to decode"
                    );
                }
                decoded
            })
            .collect();
        let dropped = total - records.len();
        Ok(Fetched { records, dropped })
    }
}

type Slot = (String, String, String);

/// In-process [`RemoteDatabase`]. Supports injected failures and per-call
/// latency for exercising sync behaviour. Queries return records in
/// modification order before sorting, like the served store.
#[derive(Default)]
pub struct MemoryDatabase {
    records: Mutex<BTreeMap<Slot, (u64, RemoteRecord)>>,
    modified: AtomicU64,
    failing: AtomicBool,
    delays: Mutex<VecDeque<Duration>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`RemoteError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    /// Queue a delay for the next `save`/`delete` call.
    pub fn push_delay(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(delay);
    }

    /// Insert a record directly, bypassing failure injection.
    pub fn insert(&self, container: &str, record: RemoteRecord) {
        let seq = self.modified.fetch_add(1, AtomicOrdering::SeqCst);
        self.lock().insert(
            (
                container.to_string(),
                record.record_type.clone(),
                record.record_name.clone(),
            ),
            (seq, record),
        );
    }

    /// Every record in `container`, oldest modification first.
    pub fn records(&self, container: &str) -> Vec<RemoteRecord> {
        self.select(|(c, _, _)| c == container)
    }

    fn select(&self, wanted: impl Fn(&Slot) -> bool) -> Vec<RemoteRecord> {
        let mut found: Vec<(u64, RemoteRecord)> = self
            .lock()
            .iter()
            .filter(|(slot, _)| wanted(slot))
            .map(|(_, entry)| entry.clone())
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, r)| r).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Slot, (u64, RemoteRecord)>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn simulate_network(&self) -> Result<(), RemoteError> {
        let delay = self
            .delays
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(RemoteError::Unavailable("network is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDatabase for MemoryDatabase {
    async fn save(&self, container: &str, record: RemoteRecord) -> Result<(), RemoteError> {
        self.simulate_network().await?;
        self.insert(container, record);
        Ok(())
    }

    async fn delete(
        &self,
        container: &str,
        record_type: &str,
        record_name: &str,
    ) -> Result<bool, RemoteError> {
        self.simulate_network().await?;
        let key = (
            container.to_string(),
            record_type.to_string(),
            record_name.to_string(),
        );
        Ok(self.lock().remove(&key).is_some())
    }

    async fn query(&self, container: &str, query: Query) -> Result<Vec<RemoteRecord>, RemoteError> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(RemoteError::Unavailable("network is down".to_string()));
        }
        let mut found = self.select(|(c, t, _)| c == container && *t == query.record_type);
        sort_records(&mut found, query.sort.as_ref());
        found.truncate(query.limit);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalorieEntry, Message};
    use chrono::NaiveDate;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entries_store(db: &Arc<MemoryDatabase>) -> RemoteStore<CalorieEntry> {
        RemoteStore::new(db.clone(), DEFAULT_CONTAINER)
    }

    #[tokio::test]
    async fn test_upsert_keyed_by_id() {
        let db = Arc::new(MemoryDatabase::new());
        let store = entries_store(&db);

        let mut entry = CalorieEntry::new(day("2024-05-01"), 1500);
        store.upsert(&entry).await.unwrap();
        entry.calories = 1600;
        store.upsert(&entry).await.unwrap();

        let records = db.records(DEFAULT_CONTAINER);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, "DayCalories");
        assert_eq!(records[0].record_name, entry.id.to_string());
        assert_eq!(records[0].fields.get("calories"), Some(&FieldValue::Int(1600)));
    }

    #[tokio::test]
    async fn test_fetch_all_sorted_by_date_descending() {
        let db = Arc::new(MemoryDatabase::new());
        let store = entries_store(&db);
        for d in ["2024-05-02", "2024-05-03", "2024-05-01"] {
            store.upsert(&CalorieEntry::new(day(d), 1000)).await.unwrap();
        }

        let fetched = store.fetch_all(DEFAULT_FETCH_LIMIT).await.unwrap();
        let days: Vec<NaiveDate> = fetched.records.iter().map(|e| e.day).collect();
        assert_eq!(days, [day("2024-05-03"), day("2024-05-02"), day("2024-05-01")]);
        assert_eq!(fetched.dropped, 0);
    }

    #[tokio::test]
    async fn test_fetch_all_respects_limit() {
        let db = Arc::new(MemoryDatabase::new());
        let store = entries_store(&db);
        let start = day("2024-01-01");
        for i in 0..120 {
            let entry = CalorieEntry::new(start + chrono::Days::new(i), 1000);
            store.upsert(&entry).await.unwrap();
        }

        let fetched = store.fetch_all(DEFAULT_FETCH_LIMIT).await.unwrap();
        assert_eq!(fetched.records.len(), 100);
        // Newest first
        assert_eq!(fetched.records[0].day, start + chrono::Days::new(119));
    }

    #[tokio::test]
    async fn test_fetch_all_drops_undecodable_records() {
        let db = Arc::new(MemoryDatabase::new());
        let store = entries_store(&db);
        store
            .upsert(&CalorieEntry::new(day("2024-05-01"), 900))
            .await
            .unwrap();

        let mut broken = Fields::new();
        broken.insert("calories".into(), FieldValue::Int(5));
        db.insert(
            DEFAULT_CONTAINER,
            RemoteRecord {
                record_type: "DayCalories".into(),
                record_name: Uuid::new_v4().to_string(),
                fields: broken,
            },
        );

        let fetched = store.fetch_all(DEFAULT_FETCH_LIMIT).await.unwrap();
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.dropped, 1);
    }

    #[tokio::test]
    async fn test_delete_and_kinds_are_separate() {
        let db = Arc::new(MemoryDatabase::new());
        let messages: RemoteStore<Message> = RemoteStore::new(db.clone(), DEFAULT_CONTAINER);
        let entries = entries_store(&db);

        let msg = Message::new("eat soup");
        messages.upsert(&msg).await.unwrap();
        entries
            .upsert(&CalorieEntry::new(day("2024-05-01"), 900))
            .await
            .unwrap();

        assert_eq!(messages.fetch_all(10).await.unwrap().records, vec![msg.clone()]);
        assert!(!entries.delete(msg.id).await.unwrap());
        assert!(messages.delete(msg.id).await.unwrap());
        assert!(messages.fetch_all(10).await.unwrap().records.is_empty());
        assert_eq!(entries.fetch_all(10).await.unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_same_day_ties_come_back_in_write_order() {
        let db = Arc::new(MemoryDatabase::new());
        let store = entries_store(&db);
        let older = CalorieEntry::new(day("2024-05-01"), 900);
        let newer = CalorieEntry::new(day("2024-05-01"), 200);
        store.upsert(&older).await.unwrap();
        store.upsert(&newer).await.unwrap();

        let fetched = store.fetch_all(10).await.unwrap();
        assert_eq!(fetched.records, vec![older.clone(), newer.clone()]);

        // Rewriting moves a record to the back
        store.upsert(&older).await.unwrap();
        let fetched = store.fetch_all(10).await.unwrap();
        assert_eq!(fetched.records, vec![newer, older]);
    }

    #[tokio::test]
    async fn test_failing_database_reports_error() {
        let db = Arc::new(MemoryDatabase::new());
        db.set_failing(true);
        let store = entries_store(&db);

        let err = store
            .upsert(&CalorieEntry::new(day("2024-05-01"), 900))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
        assert!(store.fetch_all(10).await.is_err());
    }

    #[test]
    fn test_sort_records_missing_field_last() {
        let mk = |name: &str, v: Option<i64>| {
            let mut fields = Fields::new();
            if let Some(v) = v {
                fields.insert("n".into(), FieldValue::Int(v));
            }
            RemoteRecord {
                record_type: "T".into(),
                record_name: name.into(),
                fields,
            }
        };
        let mut records = vec![mk("a", None), mk("b", Some(1)), mk("c", Some(2))];

        sort_records(&mut records, Some(&SortBy::descending("n")));
        let names: Vec<&str> = records.iter().map(|r| r.record_name.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);

        sort_records(&mut records, Some(&SortBy::ascending("n")));
        let names: Vec<&str> = records.iter().map(|r| r.record_name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);
    }
}
