//! PostgreSQL-backed `MessageStore`.
//!
//! The original system addresses an Oracle database over a JDBC thin
//! driver (`jdbc:oracle:thin:@//host:port/service`); `sqlx` has no Oracle
//! driver, so this implementation speaks to PostgreSQL instead, the
//! database `sqlx` is already pulled in for elsewhere in this corpus (see
//! DESIGN.md). The connection-string shape (`DatasourceConfig`) and pool
//! knobs from the YAML configuration are unchanged; only the wire driver
//! differs.

use async_trait::async_trait;
use chrono::Utc;
use risksms_common::{MessageStatus, SmsMessage};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::repository::{MessageStore, StatusUpdate, StoreError};

const DEFAULT_PRIORITY: i32 = 997;

/// Shared connection pool. Cheap to clone (it wraps an `Arc` internally),
/// mutable internal state is its sole concession to interior mutability —
/// callers never need `&mut`.
#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
        idle_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .idle_timeout(idle_timeout)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGSERIAL PRIMARY KEY,
                priority INTEGER,
                classification TEXT
            );

            CREATE TABLE IF NOT EXISTS sms_messages (
                id NUMERIC PRIMARY KEY,
                destination TEXT NOT NULL,
                content TEXT NOT NULL,
                state CHAR(1) NOT NULL DEFAULT 'P',
                response_code INTEGER,
                response_text VARCHAR(1000),
                external_id VARCHAR(100),
                attempts INTEGER NOT NULL DEFAULT 0,
                sent_at TIMESTAMPTZ,
                carrier TEXT,
                category_id BIGINT REFERENCES categories(id)
            );
            CREATE INDEX IF NOT EXISTS idx_sms_messages_state ON sms_messages(state);

            CREATE TABLE IF NOT EXISTS received_messages (
                id BIGSERIAL PRIMARY KEY,
                origin TEXT NOT NULL,
                destination TEXT NOT NULL,
                content TEXT NOT NULL,
                received_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_message(row: &PgRow, source: &str) -> SmsMessage {
        SmsMessage {
            id: row.get("id"),
            source: source.to_string(),
            destination: row.get("destination"),
            text: row.get("content"),
        }
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn load_pending_messages(
        &self,
        source: &str,
        carrier: Option<&str>,
        classification: Option<&str>,
        limit: u32,
    ) -> Vec<SmsMessage> {
        let query = r#"
            SELECT m.id, m.destination, m.content
            FROM sms_messages m
            LEFT JOIN categories c ON m.category_id = c.id
            WHERE m.state = 'P'
              AND ($1::text IS NULL OR m.carrier = $1)
              AND ($2::text IS NULL OR c.classification = $2)
            ORDER BY COALESCE(c.priority, $3) ASC, m.id ASC
            LIMIT $4
        "#;

        let rows = sqlx::query(query)
            .bind(carrier)
            .bind(classification)
            .bind(DEFAULT_PRIORITY)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => {
                debug!(source, count = rows.len(), "Loaded pending messages");
                rows.iter().map(|row| Self::row_to_message(row, source)).collect()
            }
            Err(e) => {
                error!(source, error = %e, "Failed to load pending messages");
                Vec::new()
            }
        }
    }

    async fn update_message_status(
        &self,
        id: Decimal,
        new_state: MessageStatus,
        max_attempts: u32,
        update: StatusUpdate<'_>,
    ) {
        // Single-statement update: attempt-cap promotion to ERROR_PROCESSED,
        // attempts increment skipped only for IN_PROGRESS, sent_at stamped
        // only on SENT, text fields coalesced with the existing value and
        // truncated to their declared widths.
        let query = r#"
            UPDATE sms_messages
            SET
                state = CASE
                    WHEN $2 = 'P' AND attempts >= $3 - 1 THEN 'R'
                    ELSE $2
                END,
                attempts = CASE WHEN $2 = 'N' THEN attempts ELSE attempts + 1 END,
                sent_at = CASE WHEN $2 = 'E' THEN $4 ELSE sent_at END,
                response_code = COALESCE($5, response_code),
                response_text = COALESCE(LEFT($6, 1000), response_text),
                external_id = COALESCE(LEFT($7, 100), external_id)
            WHERE id = $1
        "#;

        let result = sqlx::query(query)
            .bind(id)
            .bind(new_state.code())
            .bind(max_attempts as i32)
            .bind(Utc::now())
            .bind(update.response_code)
            .bind(update.response_text)
            .bind(update.external_id)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            error!(%id, new_state = %new_state, error = %e, "Failed to update message status");
        }
    }

    async fn bulk_claim(&self, ids: &[Decimal], new_state: MessageStatus) -> Vec<Decimal> {
        if ids.is_empty() {
            return Vec::new();
        }

        let query = r#"
            UPDATE sms_messages
            SET state = $1
            WHERE id IN (
                SELECT id FROM sms_messages WHERE id = ANY($2) FOR UPDATE SKIP LOCKED
            )
            RETURNING id
        "#;

        let result = sqlx::query(query)
            .bind(new_state.code())
            .bind(ids)
            .fetch_all(&self.pool)
            .await;

        match result {
            Ok(rows) => rows.iter().map(|r| r.get::<Decimal, _>("id")).collect(),
            Err(e) => {
                warn!(error = %e, "bulk_claim failed, no rows claimed");
                Vec::new()
            }
        }
    }

    async fn save_received_message(&self, origin: &str, destination: &str, text: &str) -> Option<Decimal> {
        let result = sqlx::query(
            "INSERT INTO received_messages (origin, destination, content) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(origin)
        .bind(destination)
        .bind(text)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                let id: i64 = row.get("id");
                Some(Decimal::from(id))
            }
            Err(e) => {
                error!(origin, destination, error = %e, "Failed to persist received message");
                None
            }
        }
    }
}
