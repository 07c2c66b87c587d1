//! `MessageStore` trait — the storage boundary the rest of the gateway
//! depends on. Kept as a trait (teacher precedent:
//! `OutboxRepository` in the pack this was grounded on) so tests can swap
//! in an in-memory fake instead of a live database.

use async_trait::async_trait;
use rust_decimal::Decimal;
use risksms_common::{MessageStatus, SmsMessage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Options accepted by `update_message_status`; grouped into a struct
/// because most calls only populate a subset and positional `Option`
/// arguments would be unreadable at call sites.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate<'a> {
    pub response_code: Option<i32>,
    pub response_text: Option<&'a str>,
    pub external_id: Option<&'a str>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Up to `limit` rows in state `PENDING_SEND`, filtered by carrier and
    /// classification (`None` = wildcard), ordered by
    /// `(category.priority asc [nulls -> 997], id asc)`.
    ///
    /// `source` is not a filter, it is copied into every returned
    /// `SmsMessage::source`. On any query error this returns an empty
    /// sequence and logs — it never propagates the failure to the loop.
    async fn load_pending_messages(
        &self,
        source: &str,
        carrier: Option<&str>,
        classification: Option<&str>,
        limit: u32,
    ) -> Vec<SmsMessage>;

    /// Single-row update keyed by `id`, applying all invariants
    /// (attempt-cap promotion to `ERROR_PROCESSED`, attempts increment
    /// skipped for `IN_PROGRESS`, `sent_at` stamped only on `SENT`,
    /// coalesced truncated text fields) as one committed statement.
    /// Storage errors are logged and swallowed.
    async fn update_message_status(
        &self,
        id: Decimal,
        new_state: MessageStatus,
        max_attempts: u32,
        update: StatusUpdate<'_>,
    );

    /// Attempts a non-blocking row lock on each id; ids that could not be
    /// locked are absent from the result. Locked rows are committed with
    /// `state = new_state` before the ids are returned.
    async fn bulk_claim(&self, ids: &[Decimal], new_state: MessageStatus) -> Vec<Decimal>;

    /// Inserts one inbound (mobile-originated) message, returning its new
    /// id, or `None` on error.
    async fn save_received_message(&self, origin: &str, destination: &str, text: &str) -> Option<Decimal>;
}
