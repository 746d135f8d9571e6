use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::MonthView;
use crate::local::{CUSTOM_MESSAGES_KEY, LocalCache, Settings, SharedDatabase};
use crate::models::{
    CalorieEntry, ColorBucket, Message, color_for, validate_goal, validate_message_text,
};
use crate::remote::{DEFAULT_CONTAINER, DEFAULT_FETCH_LIMIT, RemoteDatabase, RemoteStore};
use crate::store::{Store, SyncOutcome};

/// Where the default motivational messages live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageMode {
    /// Written into the message list on first launch, then editable like any
    /// other message.
    #[default]
    Seeded,
    /// Kept as a read-only list in front of the user's own messages.
    Overlay,
}

impl FromStr for MessageMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "seeded" => Ok(Self::Seeded),
            "overlay" => Ok(Self::Overlay),
            _ => bail!("Invalid message mode '{s}'. Must be one of: seeded, overlay"),
        }
    }
}

impl fmt::Display for MessageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Seeded => "seeded",
            Self::Overlay => "overlay",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub container: String,
    pub message_mode: MessageMode,
    pub fetch_limit: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            message_mode: MessageMode::default(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

/// Per-kind results of [`CalgridService::sync`]. `None` means no remote or a
/// failed fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub entries: Option<SyncOutcome>,
    pub messages: Option<SyncOutcome>,
}

pub struct CalgridService {
    entries: Store<CalorieEntry>,
    messages: Store<Message>,
    settings: Settings,
    message_mode: MessageMode,
}

impl CalgridService {
    /// Load both stores from the local database. Seeds the default messages on
    /// first launch in [`MessageMode::Seeded`].
    pub fn open(
        db: SharedDatabase,
        remote: Option<Arc<dyn RemoteDatabase>>,
        options: &ServiceOptions,
    ) -> Result<Self> {
        let settings = Settings::new(db.clone());

        let message_cache: LocalCache<Message> = match options.message_mode {
            MessageMode::Seeded => LocalCache::new(db.clone()),
            MessageMode::Overlay => LocalCache::with_key(db.clone(), CUSTOM_MESSAGES_KEY),
        };

        if !settings.has_launched_before()? {
            if options.message_mode == MessageMode::Seeded && message_cache.load().is_empty() {
                message_cache.save(&Message::defaults())?;
                tracing::info!("seeded default messages");
            }
            settings.mark_launched()?;
        }

        let entries = Store::open(
            LocalCache::new(db),
            remote
                .clone()
                .map(|r| RemoteStore::new(r, &options.container)),
        )
        .with_fetch_limit(options.fetch_limit);
        let messages = Store::open(
            message_cache,
            remote.map(|r| RemoteStore::new(r, &options.container)),
        )
        .with_fetch_limit(options.fetch_limit);

        Ok(Self {
            entries,
            messages,
            settings,
            message_mode: options.message_mode,
        })
    }

    pub fn message_mode(&self) -> MessageMode {
        self.message_mode
    }

    pub fn entry_store(&self) -> &Store<CalorieEntry> {
        &self.entries
    }

    pub fn message_store(&self) -> &Store<Message> {
        &self.messages
    }

    // --- Calories ---

    /// Record the calories for a day, replacing whatever that day had.
    pub fn log_calories(&mut self, day: NaiveDate, calories: u32) -> CalorieEntry {
        self.entries.save(CalorieEntry::new(day, calories))
    }

    pub fn entry_for(&self, day: NaiveDate) -> Option<&CalorieEntry> {
        self.entries.get(&day)
    }

    /// All entries, oldest day first.
    pub fn entries(&self) -> Vec<CalorieEntry> {
        let mut entries = self.entries.records().to_vec();
        entries.sort_by_key(|e| e.day);
        entries
    }

    pub fn delete_day(&mut self, day: NaiveDate) -> Option<CalorieEntry> {
        self.entries.remove(&day)
    }

    pub fn color_for_day(&self, day: NaiveDate) -> Result<Option<ColorBucket>> {
        let goal = self.goal()?;
        Ok(self
            .entry_for(day)
            .map(|e| color_for(i64::from(e.calories), goal)))
    }

    pub fn month(&self, year: i32, month: u32) -> Result<MonthView> {
        let today = Local::now().date_naive();
        MonthView::build(year, month, self.goal()?, self.entries.records(), today)
    }

    // --- Goal ---

    pub fn goal(&self) -> Result<i64> {
        self.settings.goal()
    }

    pub fn set_goal(&self, goal: i64) -> Result<i64> {
        let goal = validate_goal(goal)?;
        self.settings.set_goal(goal)?;
        Ok(goal)
    }

    // --- Messages ---

    /// Defaults first in overlay mode, then the stored messages. A stored
    /// copy of a default (synced from a seeded install) takes its place.
    pub fn messages(&self) -> Vec<Message> {
        let stored = self.messages.records();
        match self.message_mode {
            MessageMode::Seeded => stored.to_vec(),
            MessageMode::Overlay => {
                let mut all: Vec<Message> = Message::defaults()
                    .into_iter()
                    .map(|d| self.messages.get(&d.id).cloned().unwrap_or(d))
                    .collect();
                all.extend(stored.iter().filter(|m| !m.is_default()).cloned());
                all
            }
        }
    }

    pub fn message_at(&self, index: usize) -> Option<Message> {
        self.messages().into_iter().nth(index)
    }

    pub fn add_message(&mut self, text: &str) -> Result<Message> {
        let text = validate_message_text(text)?;
        Ok(self.messages.save(Message::new(text)))
    }

    pub fn edit_message(&mut self, id: Uuid, text: &str) -> Result<Message> {
        let text = validate_message_text(text)?;
        self.ensure_editable(id)?;
        if self.messages.get(&id).is_none() {
            bail!("Message not found: {id}");
        }
        Ok(self.messages.save(Message { id, text }))
    }

    /// Returns false when there was no such message.
    pub fn delete_message(&mut self, id: Uuid) -> Result<bool> {
        self.ensure_editable(id)?;
        Ok(self.messages.remove(&id).is_some())
    }

    /// In overlay mode a default is read-only unless a stored copy shadows it.
    fn ensure_editable(&self, id: Uuid) -> Result<()> {
        if self.message_mode == MessageMode::Overlay
            && self.messages.get(&id).is_none()
            && Message::defaults().iter().any(|m| m.id == id)
        {
            bail!("Default messages are read-only in overlay mode");
        }
        Ok(())
    }

    // --- Sync ---

    /// Pull both record kinds from the remote and merge them in, remote wins.
    pub async fn sync(&mut self) -> SyncReport {
        let (entries, messages) =
            tokio::join!(self.entries.fetch_remote(), self.messages.fetch_remote());
        SyncReport {
            entries: entries.map(|f| self.entries.apply_remote(f)),
            messages: messages.map(|f| self.messages.apply_remote(f)),
        }
    }

    /// Wait for outstanding remote writes.
    pub async fn flush(&mut self) {
        self.entries.flush().await;
        self.messages.flush().await;
    }
}
