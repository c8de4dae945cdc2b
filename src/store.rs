//! Demo session and call record persistence.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::models::{CallRecord, DemoSession};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS demo_sessions (
        ticket_id TEXT PRIMARY KEY,
        conversation_id TEXT,
        customer_name TEXT NOT NULL,
        phone TEXT NOT NULL,
        email TEXT,
        service_type TEXT NOT NULL,
        address TEXT,
        preferred_time TEXT,
        notes TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS call_records (
        conversation_id TEXT PRIMARY KEY,
        agent_id TEXT,
        status TEXT,
        caller_number TEXT,
        summary TEXT,
        call_successful TEXT,
        transcript TEXT NOT NULL,
        duration_secs INTEGER,
        received_at TEXT NOT NULL
    )",
];

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Opens the database and creates missing tables.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if url.contains(":memory:") {
            // every connection would open its own empty database
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn insert_session(&self, session: &DemoSession) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO demo_sessions (ticket_id, conversation_id, customer_name, phone, email,
                service_type, address, preferred_time, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.ticket_id)
        .bind(&session.conversation_id)
        .bind(&session.customer_name)
        .bind(&session.phone)
        .bind(&session.email)
        .bind(&session.service_type)
        .bind(&session.address)
        .bind(&session.preferred_time)
        .bind(&session.notes)
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts `session`, drawing a new ticket id from `next_id` whenever the
    /// current one is already taken. Gives up after `attempts` tries.
    pub async fn insert_session_with_fresh_ticket(
        &self,
        session: &mut DemoSession,
        mut next_id: impl FnMut() -> String,
        attempts: usize,
    ) -> Result<(), sqlx::Error> {
        let mut tries = 1;
        loop {
            match self.insert_session(session).await {
                Err(err) if tries < attempts && is_unique_violation(&err) => {
                    tracing::warn!(ticket_id = %session.ticket_id, "ticket id taken, drawing another");
                    session.ticket_id = next_id();
                    tries += 1;
                }
                result => return result,
            }
        }
    }

    pub async fn get_session(&self, ticket_id: &str) -> Result<Option<DemoSession>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM demo_sessions WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| session_from_row(&r)).transpose()
    }

    /// Insert or replace by conversation id. A redelivered webhook leaves one
    /// row holding the latest payload; there is no version check.
    pub async fn upsert_call(&self, record: &CallRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO call_records (conversation_id, agent_id, status, caller_number,
                summary, call_successful, transcript, duration_secs, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.conversation_id)
        .bind(&record.agent_id)
        .bind(&record.status)
        .bind(&record.caller_number)
        .bind(&record.summary)
        .bind(&record.call_successful)
        .bind(&record.transcript)
        .bind(record.duration_secs)
        .bind(record.received_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_call(&self, conversation_id: &str) -> Result<Option<CallRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM call_records WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| call_from_row(&r)).transpose()
    }

    pub async fn count_calls(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM call_records")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn session_from_row(row: &SqliteRow) -> Result<DemoSession, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    Ok(DemoSession {
        ticket_id: row.try_get("ticket_id")?,
        conversation_id: row.try_get("conversation_id")?,
        customer_name: row.try_get("customer_name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        service_type: row.try_get("service_type")?,
        address: row.try_get("address")?,
        preferred_time: row.try_get("preferred_time")?,
        notes: row.try_get("notes")?,
        created_at: parse_time(&created_at)?,
    })
}

fn call_from_row(row: &SqliteRow) -> Result<CallRecord, sqlx::Error> {
    let received_at: String = row.try_get("received_at")?;
    Ok(CallRecord {
        conversation_id: row.try_get("conversation_id")?,
        agent_id: row.try_get("agent_id")?,
        status: row.try_get("status")?,
        caller_number: row.try_get("caller_number")?,
        summary: row.try_get("summary")?,
        call_successful: row.try_get("call_successful")?,
        transcript: row.try_get("transcript")?,
        duration_secs: row.try_get("duration_secs")?,
        received_at: parse_time(&received_at)?,
    })
}
