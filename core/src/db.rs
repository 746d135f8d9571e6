use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use rusqlite::{Connection, params};

use crate::record::Fields;
use crate::remote::{Query, RemoteRecord, sort_records};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Backing table for the hosted document store
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS remote_records (
                    container TEXT NOT NULL,
                    record_type TEXT NOT NULL,
                    record_name TEXT NOT NULL,
                    fields TEXT NOT NULL,
                    modified_at TEXT NOT NULL,
                    PRIMARY KEY (container, record_type, record_name)
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    // --- Hosted document store ---

    pub fn put_remote_record(&self, container: &str, record: &RemoteRecord) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let fields = serde_json::to_string(&record.fields)?;
        self.conn.execute(
            "INSERT INTO remote_records (container, record_type, record_name, fields, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(container, record_type, record_name) DO UPDATE SET
                fields = excluded.fields,
                modified_at = excluded.modified_at",
            params![container, record.record_type, record.record_name, fields, now],
        )?;
        Ok(())
    }

    pub fn delete_remote_record(
        &self,
        container: &str,
        record_type: &str,
        record_name: &str,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM remote_records
             WHERE container = ?1 AND record_type = ?2 AND record_name = ?3",
            params![container, record_type, record_name],
        )?;
        Ok(rows > 0)
    }

    pub fn query_remote_records(&self, container: &str, query: &Query) -> Result<Vec<RemoteRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_name, fields FROM remote_records
             WHERE container = ?1 AND record_type = ?2
             ORDER BY modified_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![container, query.record_type], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (record_name, fields) in rows {
            let fields: Fields = serde_json::from_str(&fields)
                .with_context(|| format!("Corrupt fields for record {record_name}"))?;
            records.push(RemoteRecord {
                record_type: query.record_type.clone(),
                record_name,
                fields,
            });
        }

        sort_records(&mut records, query.sort.as_ref());
        records.truncate(query.limit);
        Ok(records)
    }
}
