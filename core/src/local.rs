use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use crate::db::Database;
use crate::models::DEFAULT_CALORIE_GOAL;
use crate::record::Record;

pub type SharedDatabase = Arc<Mutex<Database>>;

pub const GOAL_KEY: &str = "calorieGoal";
pub const FIRST_LAUNCH_KEY: &str = "hasLaunchedBefore";
/// User messages when the defaults are kept as a read-only overlay.
pub const CUSTOM_MESSAGES_KEY: &str = "customMessages";

pub fn shared(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}

fn lock(db: &SharedDatabase) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A record list persisted as one JSON blob under a fixed settings key.
pub struct LocalCache<R> {
    db: SharedDatabase,
    key: String,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Record> LocalCache<R> {
    pub fn new(db: SharedDatabase) -> Self {
        Self::with_key(db, R::STORAGE_KEY)
    }

    pub fn with_key(db: SharedDatabase, key: &str) -> Self {
        Self {
            db,
            key: key.to_string(),
            _kind: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Absent, unreadable, or malformed blobs all load as an empty list.
    pub fn load(&self) -> Vec<R> {
        let blob = match lock(&self.db).get_setting(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to read local cache");
                return Vec::new();
            }
        };
        match serde_json::from_str(&blob) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "discarding malformed local cache");
                Vec::new()
            }
        }
    }

    /// Overwrites the whole blob in one statement.
    pub fn save(&self, records: &[R]) -> Result<()> {
        let blob = serde_json::to_string(records)?;
        lock(&self.db)
            .set_setting(&self.key, &blob)
            .with_context(|| format!("Failed to persist {}", self.key))
    }
}

/// Local-only settings. Never synced.
#[derive(Clone)]
pub struct Settings {
    db: SharedDatabase,
}

impl Settings {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub fn goal(&self) -> Result<i64> {
        let Some(raw) = lock(&self.db).get_setting(GOAL_KEY)? else {
            return Ok(DEFAULT_CALORIE_GOAL);
        };
        Ok(raw.parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "ignoring malformed calorie goal");
            DEFAULT_CALORIE_GOAL
        }))
    }

    pub fn set_goal(&self, goal: i64) -> Result<()> {
        lock(&self.db).set_setting(GOAL_KEY, &goal.to_string())
    }

    pub fn has_launched_before(&self) -> Result<bool> {
        Ok(lock(&self.db).get_setting(FIRST_LAUNCH_KEY)?.as_deref() == Some("true"))
    }

    pub fn mark_launched(&self) -> Result<()> {
        lock(&self.db).set_setting(FIRST_LAUNCH_KEY, "true")
    }
}
