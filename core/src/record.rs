use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CalorieEntry, Message, RecordKind};

/// A typed field value on a remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Int(i64),
    Date(DateTime<Utc>),
}

pub type Fields = BTreeMap<String, FieldValue>;

/// Something the store can cache locally and mirror to the remote database.
pub trait Record:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Identity used when merging. Not necessarily the `id`.
    type Key: Clone + Ord + Hash + Debug + Send + Sync + 'static;

    const KIND: RecordKind;
    /// Name of the local blob holding the list.
    const STORAGE_KEY: &'static str;
    /// Field and direction (`true` = ascending) the remote fetch sorts by.
    const SORT: Option<(&'static str, bool)>;

    fn key(&self) -> Self::Key;
    fn id(&self) -> Uuid;
    #[must_use]
    fn with_id(self, id: Uuid) -> Self;

    fn to_fields(&self) -> Fields;
    /// `None` when a required field is missing or has the wrong type.
    fn from_fields(record_name: &str, fields: &Fields) -> Option<Self>;
}

/// Local midnight of `day`, as stored on remote records.
pub fn day_to_timestamp(day: NaiveDate) -> DateTime<Utc> {
    // Midnight can fall in a DST gap; take the first hour that exists.
    (0..3)
        .filter_map(|h| day.and_hms_opt(h, 0, 0))
        .find_map(|naive| Local.from_local_datetime(&naive).earliest())
        .map_or_else(
            || day.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc(),
            |local| local.with_timezone(&Utc),
        )
}

/// Truncate a timestamp to the local calendar day.
pub fn timestamp_to_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

impl Record for CalorieEntry {
    type Key = NaiveDate;

    const KIND: RecordKind = RecordKind::DayCalories;
    const STORAGE_KEY: &'static str = "savedEntries";
    const SORT: Option<(&'static str, bool)> = Some(("date", false));

    fn key(&self) -> NaiveDate {
        self.day
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id, ..self }
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), FieldValue::String(self.id.to_string()));
        fields.insert("date".into(), FieldValue::Date(day_to_timestamp(self.day)));
        fields.insert(
            "calories".into(),
            FieldValue::Int(i64::from(self.calories)),
        );
        fields
    }

    fn from_fields(record_name: &str, fields: &Fields) -> Option<Self> {
        let Some(FieldValue::Date(date)) = fields.get("date") else {
            return None;
        };
        let Some(FieldValue::Int(calories)) = fields.get("calories") else {
            return None;
        };
        let calories = u32::try_from(*calories).ok()?;
        // Older writers put the id in a field instead of the record name.
        let id = Uuid::parse_str(record_name)
            .ok()
            .or_else(|| match fields.get("id") {
                Some(FieldValue::String(s)) => Uuid::parse_str(s).ok(),
                _ => None,
            })
            .unwrap_or_else(Uuid::new_v4);
        Some(Self {
            id,
            day: timestamp_to_day(*date),
            calories,
        })
    }
}

impl Record for Message {
    type Key = Uuid;

    const KIND: RecordKind = RecordKind::Message;
    const STORAGE_KEY: &'static str = "savedMessages";
    const SORT: Option<(&'static str, bool)> = None;

    fn key(&self) -> Uuid {
        self.id
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn with_id(self, id: Uuid) -> Self {
        Self { id, ..self }
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("text".into(), FieldValue::String(self.text.clone()));
        fields
    }

    fn from_fields(record_name: &str, fields: &Fields) -> Option<Self> {
        let id = Uuid::parse_str(record_name).ok()?;
        let Some(FieldValue::String(text)) = fields.get("text") else {
            return None;
        };
        Some(Self {
            id,
            text: text.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_day_timestamp_roundtrip() {
        for d in ["2024-01-01", "2024-03-10", "2024-05-01", "2024-11-03", "2024-12-31"] {
            assert_eq!(timestamp_to_day(day_to_timestamp(day(d))), day(d));
        }
    }

    #[test]
    fn test_calorie_entry_fields() {
        let entry = CalorieEntry::new(day("2024-05-01"), 1800);
        let fields = entry.to_fields();
        assert_eq!(fields.get("calories"), Some(&FieldValue::Int(1800)));
        assert_eq!(
            fields.get("id"),
            Some(&FieldValue::String(entry.id.to_string()))
        );

        let decoded = CalorieEntry::from_fields(&entry.id.to_string(), &fields).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_calorie_entry_time_of_day_truncated() {
        let local = Local
            .from_local_datetime(&day("2024-05-01").and_hms_opt(18, 45, 0).unwrap())
            .earliest()
            .unwrap();
        let mut fields = Fields::new();
        fields.insert("date".into(), FieldValue::Date(local.with_timezone(&Utc)));
        fields.insert("calories".into(), FieldValue::Int(900));

        let id = Uuid::new_v4();
        let entry = CalorieEntry::from_fields(&id.to_string(), &fields).unwrap();
        assert_eq!(entry.day, day("2024-05-01"));
        assert_eq!(entry.id, id);
        assert_eq!(local.hour(), 18);
    }

    #[test]
    fn test_calorie_entry_missing_field_is_none() {
        let mut fields = Fields::new();
        fields.insert("calories".into(), FieldValue::Int(900));
        assert!(CalorieEntry::from_fields(&Uuid::new_v4().to_string(), &fields).is_none());

        let mut fields = Fields::new();
        fields.insert("date".into(), FieldValue::Date(Utc::now()));
        assert!(CalorieEntry::from_fields(&Uuid::new_v4().to_string(), &fields).is_none());
    }

    #[test]
    fn test_calorie_entry_rejects_negative_and_mistyped() {
        let mut fields = Fields::new();
        fields.insert("date".into(), FieldValue::Date(Utc::now()));
        fields.insert("calories".into(), FieldValue::Int(-5));
        assert!(CalorieEntry::from_fields("x", &fields).is_none());

        fields.insert("calories".into(), FieldValue::String("900".into()));
        assert!(CalorieEntry::from_fields("x", &fields).is_none());
    }

    #[test]
    fn test_calorie_entry_id_from_field_when_name_is_not_uuid() {
        let id = Uuid::new_v4();
        let mut fields = Fields::new();
        fields.insert("id".into(), FieldValue::String(id.to_string()));
        fields.insert("date".into(), FieldValue::Date(day_to_timestamp(day("2024-05-02"))));
        fields.insert("calories".into(), FieldValue::Int(1000));

        let entry = CalorieEntry::from_fields("legacy-record", &fields).unwrap();
        assert_eq!(entry.id, id);
    }

    #[test]
    fn test_message_fields() {
        let msg = Message::new("eat soup");
        let decoded = Message::from_fields(&msg.id.to_string(), &msg.to_fields()).unwrap();
        assert_eq!(decoded, msg);

        assert!(Message::from_fields("not-a-uuid", &msg.to_fields()).is_none());
        assert!(Message::from_fields(&msg.id.to_string(), &Fields::new()).is_none());
    }

    #[test]
    fn test_field_value_json_shape() {
        let json = serde_json::to_value(FieldValue::Int(5)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "int", "value": 5 }));
    }
}
