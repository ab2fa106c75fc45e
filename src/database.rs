use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

use crate::email::NormalizedMessage;
use crate::error::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// One stored summary of an important message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub uid: u32,
    pub subject: String,
    pub from_name: String,
    /// `Date` header text as received
    pub date: String,
    pub summary: String,
    /// `None` on rows written before the column existed
    pub ai_summary: Option<String>,
    /// Parsed date as a Unix timestamp, `None` on legacy rows or unparseable headers
    pub date_ts: Option<i64>,
}

impl SummaryRecord {
    pub fn from_message(message: &NormalizedMessage, summary: &str) -> Self {
        Self {
            uid: message.uid,
            subject: message.subject.clone(),
            from_name: message.from_name.clone(),
            date: message.date.clone(),
            summary: summary.to_string(),
            ai_summary: Some(summary.to_string()),
            date_ts: message.received_at.map(|dt| dt.timestamp()),
        }
    }
}

/// Handle on the summary store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the store at `path` and brings its schema
    /// up to date.
    pub async fn new(path: &Path) -> Result<Self> {
        info!("Opening summary store at {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // One writer at a time is all SQLite supports anyway
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.create_tables_if_not_exists().await?;

        info!("Summary store ready");
        Ok(db)
    }

    async fn create_tables_if_not_exists(&self) -> Result<()> {
        debug!("Checking/creating summaries table");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                uid INTEGER PRIMARY KEY,
                subject TEXT,
                from_name TEXT,
                date TEXT,
                summary TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let existing: Vec<String> = sqlx::query("PRAGMA table_info(summaries)")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<_, _>>()?;

        // Columns added after the first release, never dropped or rewritten
        for (column, definition) in [("ai_summary", "TEXT"), ("date_ts", "INTEGER")] {
            if !existing.iter().any(|name| name == column) {
                info!("🔧 Adding column {} to summaries", column);
                sqlx::query(&format!(
                    "ALTER TABLE summaries ADD COLUMN {} {}",
                    column, definition
                ))
                .execute(&self.pool)
                .await?;
            }
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_date_ts ON summaries (date_ts DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Inserts the record, fully replacing any earlier one with the same UID.
    pub async fn upsert(&self, record: &SummaryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO summaries (uid, subject, from_name, date, summary, ai_summary, date_ts)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(record.uid))
        .bind(&record.subject)
        .bind(&record.from_name)
        .bind(&record.date)
        .bind(&record.summary)
        .bind(&record.ai_summary)
        .bind(record.date_ts)
        .execute(&self.pool)
        .await?;

        debug!("Stored summary for UID {}", record.uid);
        Ok(())
    }

    /// Every record, newest first. Rows without a parsed date come last,
    /// ordered by their raw header text.
    pub async fn fetch_all(&self) -> Result<Vec<SummaryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT uid, subject, from_name, date, summary, ai_summary, date_ts
            FROM summaries
            ORDER BY date_ts IS NULL, date_ts DESC, date DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let uid: i64 = row.try_get("uid")?;
            let uid = u32::try_from(uid)
                .map_err(|_| StoreError::InvalidRecord(format!("uid {} out of range", uid)))?;
            records.push(SummaryRecord {
                uid,
                subject: row.try_get::<Option<String>, _>("subject")?.unwrap_or_default(),
                from_name: row.try_get::<Option<String>, _>("from_name")?.unwrap_or_default(),
                date: row.try_get::<Option<String>, _>("date")?.unwrap_or_default(),
                summary: row.try_get::<Option<String>, _>("summary")?.unwrap_or_default(),
                ai_summary: row.try_get("ai_summary")?,
                date_ts: row.try_get("date_ts")?,
            });
        }

        Ok(records)
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM summaries")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(uid: u32, summary: &str, date_ts: Option<i64>) -> SummaryRecord {
        SummaryRecord {
            uid,
            subject: format!("Subject {}", uid),
            from_name: "Alice".to_string(),
            date: "Tue, 14 Oct 2025 09:30:00 +0200".to_string(),
            summary: summary.to_string(),
            ai_summary: Some(summary.to_string()),
            date_ts,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_record() {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("summaries.db")).await.unwrap();

        db.upsert(&record(5, "first", None)).await.unwrap();
        db.upsert(&record(5, "second", Some(1_760_427_000))).await.unwrap();

        let records = db.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].summary, "second");
        assert_eq!(records[0].ai_summary.as_deref(), Some("second"));
        assert_eq!(records[0].date_ts, Some(1_760_427_000));
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_newest_first_legacy_last() {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("summaries.db")).await.unwrap();

        db.upsert(&record(1, "old", Some(100))).await.unwrap();
        db.upsert(&record(2, "legacy", None)).await.unwrap();
        db.upsert(&record(3, "new", Some(200))).await.unwrap();

        let uids: Vec<u32> = db.fetch_all().await.unwrap().iter().map(|r| r.uid).collect();
        assert_eq!(uids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_old_schema_is_migrated_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.db");

        {
            let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
            let pool = SqlitePool::connect_with(options).await.unwrap();
            sqlx::query(
                "CREATE TABLE summaries (uid INTEGER PRIMARY KEY, subject TEXT, from_name TEXT, date TEXT, summary TEXT)",
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query("INSERT INTO summaries VALUES (9, 'Old', 'Bob', '2024-01-02 10:00:00', 'Summary: pay rent')")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let db = Database::new(&path).await.unwrap();
        let records = db.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uid, 9);
        assert_eq!(records[0].summary, "Summary: pay rent");
        assert_eq!(records[0].ai_summary, None);
        assert_eq!(records[0].date_ts, None);

        // Opening again must not try to add the columns twice
        db.close().await;
        let db = Database::new(&path).await.unwrap();
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_uid_is_an_error() {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("summaries.db")).await.unwrap();
        sqlx::query("INSERT INTO summaries (uid, subject) VALUES (-1, 'Broken')")
            .execute(&db.pool)
            .await
            .unwrap();

        match db.fetch_all().await {
            Err(StoreError::InvalidRecord(msg)) => assert!(msg.contains("-1"), "{}", msg),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }
}
