use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::models::*;
use super::reconciler::FieldChange;

const PROSPECT_COLUMNS: &str = "id, name, company, email, phone, source, stage, temperature, commitment, \
     product_interest, estimated_amount, next_action, next_action_date, last_meeting_date, notes, \
     sensitivity, summary, objections, key_quotes, created_at, updated_at";

/// Async-safe handle to the CRM database.
///
/// Wraps `CrmDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<CrmDb>>,
}

impl DbHandle {
    pub fn new(db: CrmDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&CrmDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, CrmDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct CrmDb {
    conn: Connection,
}

impl CrmDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        // prospect_history.prospect_id is a weak reference: no FK, no cascade.
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS prospects (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                    company TEXT,
                    email TEXT,
                    phone TEXT,
                    source TEXT,
                    stage TEXT NOT NULL DEFAULT 'new',
                    temperature TEXT NOT NULL DEFAULT 'warm',
                    commitment TEXT,
                    product_interest TEXT,
                    estimated_amount TEXT,
                    next_action TEXT,
                    next_action_date TEXT,
                    last_meeting_date TEXT,
                    notes TEXT,
                    sensitivity INTEGER,
                    summary TEXT,
                    objections TEXT NOT NULL DEFAULT '[]',
                    key_quotes TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS prospect_history (
                    id TEXT PRIMARY KEY NOT NULL,
                    prospect_id TEXT NOT NULL,
                    field_changed TEXT NOT NULL,
                    previous_value TEXT NOT NULL DEFAULT '',
                    new_value TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_prospects_stage ON prospects(stage);
                CREATE INDEX IF NOT EXISTS idx_prospects_created ON prospects(created_at);
                CREATE INDEX IF NOT EXISTS idx_history_prospect ON prospect_history(prospect_id, created_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Prospects ─────────────────────────────────────────────────────

    pub fn insert_prospect(&self, fields: &ProspectFields) -> Result<Prospect> {
        let id = Uuid::new_v4();
        let now = timestamp(Utc::now());
        let objections =
            serde_json::to_string(&fields.objections).context("Failed to serialize objections")?;
        let key_quotes =
            serde_json::to_string(&fields.key_quotes).context("Failed to serialize key_quotes")?;

        self.conn
            .execute(
                &format!(
                    "INSERT INTO prospects ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?20)",
                    PROSPECT_COLUMNS
                ),
                params![
                    id.to_string(),
                    fields.name,
                    fields.company,
                    fields.email,
                    fields.phone,
                    fields.source,
                    fields.stage.as_str(),
                    fields.temperature.as_str(),
                    fields.commitment.map(|c| c.as_str()),
                    fields.product_interest,
                    fields.estimated_amount.map(|a| a.to_string()),
                    fields.next_action,
                    fields.next_action_date.map(|d| d.to_string()),
                    fields.last_meeting_date.map(|d| d.to_string()),
                    fields.notes,
                    fields.sensitivity,
                    fields.summary,
                    objections,
                    key_quotes,
                    now,
                ],
            )
            .context("Failed to insert prospect")?;
        self.get_prospect(id)?
            .context("Prospect not found after insert")
    }

    pub fn get_prospect(&self, id: Uuid) -> Result<Option<Prospect>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM prospects WHERE id = ?1", PROSPECT_COLUMNS))
            .context("Failed to prepare get_prospect")?;
        let mut rows = stmt
            .query_map(params![id.to_string()], ProspectRow::from_row)
            .context("Failed to query prospect")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read prospect row")?;
                Ok(Some(r.into_prospect()?))
            }
            None => Ok(None),
        }
    }

    /// All prospects, newest first. Ties on `created_at` fall back to
    /// insertion order, newest first.
    pub fn list_prospects(&self) -> Result<Vec<Prospect>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM prospects ORDER BY created_at DESC, rowid DESC",
                PROSPECT_COLUMNS
            ))
            .context("Failed to prepare list_prospects")?;
        let rows = stmt
            .query_map([], ProspectRow::from_row)
            .context("Failed to query prospects")?;
        let mut prospects = Vec::new();
        for row in rows {
            let r = row.context("Failed to read prospect row")?;
            prospects.push(r.into_prospect()?);
        }
        Ok(prospects)
    }

    /// Replace every editable field. Returns `None` when the id is unknown.
    pub fn update_prospect(&self, id: Uuid, fields: &ProspectFields) -> Result<Option<Prospect>> {
        let objections =
            serde_json::to_string(&fields.objections).context("Failed to serialize objections")?;
        let key_quotes =
            serde_json::to_string(&fields.key_quotes).context("Failed to serialize key_quotes")?;

        let count = self
            .conn
            .execute(
                "UPDATE prospects SET
                    name = ?1, company = ?2, email = ?3, phone = ?4, source = ?5,
                    stage = ?6, temperature = ?7, commitment = ?8, product_interest = ?9,
                    estimated_amount = ?10, next_action = ?11, next_action_date = ?12,
                    last_meeting_date = ?13, notes = ?14, sensitivity = ?15, summary = ?16,
                    objections = ?17, key_quotes = ?18, updated_at = ?19
                 WHERE id = ?20",
                params![
                    fields.name,
                    fields.company,
                    fields.email,
                    fields.phone,
                    fields.source,
                    fields.stage.as_str(),
                    fields.temperature.as_str(),
                    fields.commitment.map(|c| c.as_str()),
                    fields.product_interest,
                    fields.estimated_amount.map(|a| a.to_string()),
                    fields.next_action,
                    fields.next_action_date.map(|d| d.to_string()),
                    fields.last_meeting_date.map(|d| d.to_string()),
                    fields.notes,
                    fields.sensitivity,
                    fields.summary,
                    objections,
                    key_quotes,
                    timestamp(Utc::now()),
                    id.to_string(),
                ],
            )
            .context("Failed to update prospect")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_prospect(id)
    }

    pub fn count_prospects(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM prospects", [], |row| row.get(0))
            .context("Failed to count prospects")?;
        Ok(count as usize)
    }

    // ── History ───────────────────────────────────────────────────────

    /// Append one entry per change as a single batch.
    pub fn insert_history(
        &self,
        prospect_id: Uuid,
        changes: &[FieldChange],
    ) -> Result<Vec<HistoryEntry>> {
        // Stored text keeps micros; return exactly what a re-read yields.
        let created_at = Utc::now().trunc_subsecs(6);
        let created_at_str = timestamp(created_at);

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut entries = Vec::with_capacity(changes.len());
        for change in changes {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO prospect_history (id, prospect_id, field_changed, previous_value, new_value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    prospect_id.to_string(),
                    change.field,
                    change.previous,
                    change.new,
                    created_at_str,
                ],
            )
            .context("Failed to insert history entry")?;
            entries.push(HistoryEntry {
                id,
                prospect_id,
                field_changed: change.field.to_string(),
                previous_value: change.previous.clone(),
                new_value: change.new.clone(),
                created_at,
            });
        }
        tx.commit().context("Failed to commit history batch")?;
        Ok(entries)
    }

    /// History for one prospect, newest first.
    pub fn list_history(&self, prospect_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, prospect_id, field_changed, previous_value, new_value, created_at
                 FROM prospect_history WHERE prospect_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )
            .context("Failed to prepare list_history")?;
        let rows = stmt
            .query_map(params![prospect_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to query history")?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, prospect_id, field_changed, previous_value, new_value, created_at) =
                row.context("Failed to read history row")?;
            entries.push(HistoryEntry {
                id: parse_uuid(&id)?,
                prospect_id: parse_uuid(&prospect_id)?,
                field_changed,
                previous_value,
                new_value,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(entries)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed-width micros so text ordering matches time ordering.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in database: '{}'", value))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid id in database: '{}'", value))
}

fn parse_amount(value: Option<String>) -> Result<Option<Decimal>> {
    value
        .map(|v| {
            v.parse::<Decimal>()
                .with_context(|| format!("invalid amount in database: '{}'", v))
        })
        .transpose()
}

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .with_context(|| format!("invalid date in database: '{}'", v))
        })
        .transpose()
}

/// Intermediate row struct for reading prospects from SQLite before
/// converting enum and JSON columns into typed values.
struct ProspectRow {
    id: String,
    name: String,
    company: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    source: Option<String>,
    stage: String,
    temperature: String,
    commitment: Option<String>,
    product_interest: Option<String>,
    estimated_amount: Option<String>,
    next_action: Option<String>,
    next_action_date: Option<String>,
    last_meeting_date: Option<String>,
    notes: Option<String>,
    sensitivity: Option<u8>,
    summary: Option<String>,
    objections: String,
    key_quotes: String,
    created_at: String,
    updated_at: String,
}

impl ProspectRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            company: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            source: row.get(5)?,
            stage: row.get(6)?,
            temperature: row.get(7)?,
            commitment: row.get(8)?,
            product_interest: row.get(9)?,
            estimated_amount: row.get(10)?,
            next_action: row.get(11)?,
            next_action_date: row.get(12)?,
            last_meeting_date: row.get(13)?,
            notes: row.get(14)?,
            sensitivity: row.get(15)?,
            summary: row.get(16)?,
            objections: row.get(17)?,
            key_quotes: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }

    fn into_prospect(self) -> Result<Prospect> {
        let stage = self
            .stage
            .parse::<Stage>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse prospect stage")?;
        let temperature = self
            .temperature
            .parse::<Temperature>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse prospect temperature")?;
        let commitment = self
            .commitment
            .map(|c| c.parse::<Commitment>().map_err(|e| anyhow::anyhow!(e)))
            .transpose()
            .context("Failed to parse prospect commitment")?;
        let objections: Vec<String> = serde_json::from_str(&self.objections)
            .context("Failed to parse prospect objections JSON")?;
        let key_quotes: Vec<String> = serde_json::from_str(&self.key_quotes)
            .context("Failed to parse prospect key_quotes JSON")?;

        Ok(Prospect {
            id: parse_uuid(&self.id)?,
            fields: ProspectFields {
                name: self.name,
                company: self.company,
                email: self.email,
                phone: self.phone,
                source: self.source,
                stage,
                temperature,
                commitment,
                product_interest: self.product_interest,
                estimated_amount: parse_amount(self.estimated_amount)?,
                next_action: self.next_action,
                next_action_date: parse_date(self.next_action_date)?,
                last_meeting_date: parse_date(self.last_meeting_date)?,
                notes: self.notes,
                sensitivity: self.sensitivity,
                summary: self.summary,
                objections,
                key_quotes,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn change(field: &'static str, previous: &str, new: &str) -> FieldChange {
        FieldChange {
            field,
            previous: previous.to_string(),
            new: new.to_string(),
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = CrmDb::new_in_memory()?;

        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('prospects', 'prospect_history')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 2, "Expected 2 tables to exist");

        let index_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name IN ('idx_prospects_stage', 'idx_prospects_created', 'idx_history_prospect')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(index_count, 3, "Expected 3 indexes to exist");

        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        db.run_migrations()?;
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_insert_and_get_prospect() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let mut fields = ProspectFields::named("Ana");
        fields.company = Some("Acme".into());
        fields.estimated_amount = Some(Decimal::new(150050, 2));
        fields.next_action_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        fields.commitment = Some(Commitment::Immediate);
        fields.sensitivity = Some(6);
        fields.objections = vec!["price".into()];

        let prospect = db.insert_prospect(&fields)?;
        assert_eq!(prospect.fields, fields);
        assert_eq!(prospect.created_at, prospect.updated_at);

        let fetched = db.get_prospect(prospect.id)?.expect("prospect should exist");
        assert_eq!(fetched, prospect);
        Ok(())
    }

    #[test]
    fn test_get_unknown_prospect_is_none() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        assert!(db.get_prospect(Uuid::new_v4())?.is_none());
        Ok(())
    }

    #[test]
    fn test_blank_name_rejected_by_store() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let result = db.insert_prospect(&ProspectFields::named("  "));
        assert!(result.is_err());
        assert_eq!(db.count_prospects()?, 0);
        Ok(())
    }

    #[test]
    fn test_list_prospects_newest_first() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        db.insert_prospect(&ProspectFields::named("First"))?;
        db.insert_prospect(&ProspectFields::named("Second"))?;
        db.insert_prospect(&ProspectFields::named("Third"))?;

        let names: Vec<String> = db
            .list_prospects()?
            .into_iter()
            .map(|p| p.fields.name)
            .collect();
        assert_eq!(names, vec!["Third", "Second", "First"]);
        Ok(())
    }

    #[test]
    fn test_update_prospect_replaces_fields_and_bumps_updated_at() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let created = db.insert_prospect(&ProspectFields::named("Ana"))?;

        let mut fields = created.fields.clone();
        fields.stage = Stage::Contacted;
        fields.notes = Some("called".into());
        let updated = db.update_prospect(created.id, &fields)?.expect("prospect exists");

        assert_eq!(updated.fields.stage, Stage::Contacted);
        assert_eq!(updated.fields.notes.as_deref(), Some("called"));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        Ok(())
    }

    #[test]
    fn test_update_unknown_prospect_returns_none() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let result = db.update_prospect(Uuid::new_v4(), &ProspectFields::named("Ghost"))?;
        assert!(result.is_none());
        Ok(())
    }

    #[test]
    fn test_history_batch_and_newest_first() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let prospect = db.insert_prospect(&ProspectFields::named("Ana"))?;

        db.insert_history(prospect.id, &[change("stage", "new", "contacted")])?;
        let second = db.insert_history(
            prospect.id,
            &[change("notes", "", "called"), change("temperature", "warm", "hot")],
        )?;
        assert_eq!(second.len(), 2);

        let history = db.list_history(prospect.id)?;
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().map(|h| h.field_changed.as_str()), Some("stage"));
        assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        Ok(())
    }

    #[test]
    fn test_inserted_history_matches_stored_rows() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let prospect = db.insert_prospect(&ProspectFields::named("Ana"))?;

        let written = db.insert_history(prospect.id, &[change("stage", "new", "contacted")])?;
        assert_eq!(db.list_history(prospect.id)?, written);
        Ok(())
    }

    #[test]
    fn test_amount_is_stored_as_exact_text() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let mut fields = ProspectFields::named("Ana");
        fields.estimated_amount = Some(Decimal::new(1, 1) + Decimal::new(2, 1));
        let prospect = db.insert_prospect(&fields)?;

        let raw: String = db.conn.query_row(
            "SELECT estimated_amount FROM prospects WHERE id = ?1",
            params![prospect.id.to_string()],
            |row| row.get(0),
        )?;
        assert_eq!(raw, "0.3");
        assert_eq!(prospect.fields.estimated_amount, Some(Decimal::new(3, 1)));
        Ok(())
    }

    #[test]
    fn test_history_is_scoped_to_prospect() -> Result<()> {
        let db = CrmDb::new_in_memory()?;
        let a = db.insert_prospect(&ProspectFields::named("A"))?;
        let b = db.insert_prospect(&ProspectFields::named("B"))?;
        db.insert_history(a.id, &[change("stage", "new", "paid")])?;

        assert_eq!(db.list_history(a.id)?.len(), 1);
        assert!(db.list_history(b.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_timestamp_text_orders_like_time() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2024-01-01T00:00:01Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(parse_timestamp(&timestamp(early)).unwrap(), early);
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(CrmDb::new_in_memory()?);
        let created = handle
            .call(|db| db.insert_prospect(&ProspectFields::named("Ana")))
            .await?;
        let count = handle.call(|db| db.count_prospects()).await?;
        assert_eq!(count, 1);
        assert_eq!(handle.lock_sync()?.get_prospect(created.id)?, Some(created));
        Ok(())
    }
}
