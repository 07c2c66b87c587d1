//! `SmppSession` — the boundary between this gateway and the wire
//! protocol. Everything above this trait (Sender, WindowMonitor,
//! SessionManager) is written against it; `production` is the only module
//! that knows about the `smpp` crate.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fields needed to build one submit_sm PDU. Source and destination are
/// always submitted with TON `0x01` and NPI `0x01` per the wire contract.
#[derive(Debug, Clone)]
pub struct SubmitPdu {
    pub source_addr: String,
    pub dest_addr: String,
    pub data_coding: u8,
    pub esm_class: u8,
    pub short_message: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub command_status: i32,
    pub message_id: Option<String>,
    pub result_message: Option<String>,
}

/// One outstanding submit_sm awaiting its response, as seen by the window
/// monitor.
#[derive(Debug, Clone, Copy)]
pub struct WindowEntry {
    pub sequence_number: u32,
    pub offered_at: Instant,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not bound")]
    NotBound,
    #[error("submit timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

/// One decoded inbound PDU, as handed to `InboundHandler`.
#[derive(Debug, Clone)]
pub struct InboundPdu {
    pub esm_class: u8,
    pub source_addr: String,
    pub dest_addr: String,
    pub short_message: Vec<u8>,
}

/// A bound (or not-yet-bound) SMPP TRANSCEIVER session, abstracted so the
/// rest of the gateway never depends on the wire library directly.
///
/// Implementations own their in-flight window bookkeeping: `submit`
/// registers a slot before sending and clears it on response,
/// `window_snapshot`/`cancel_slot` expose that bookkeeping to
/// `WindowMonitor` without either side touching the codec.
#[async_trait]
pub trait SmppSession: Send + Sync {
    async fn submit(&self, pdu: SubmitPdu, timeout: Duration) -> Result<SubmitOutcome, SessionError>;

    /// Snapshot of requests still awaiting a response, keyed by sequence
    /// number, as of the moment this is called.
    async fn window_snapshot(&self) -> Vec<WindowEntry>;

    /// Cancels one outstanding slot (treats it as abandoned). Returns
    /// `true` if a slot with that sequence number was present and
    /// removed.
    async fn cancel_slot(&self, sequence_number: u32) -> bool;

    /// Unbinds, waiting up to `wait` for the carrier's response before
    /// giving up.
    async fn unbind(&self, wait: Duration) -> Result<(), SessionError>;

    /// Blocks until the next inbound `deliver_sm` PDU arrives, or the
    /// session ends. Called in a loop by the owning inbound task.
    async fn receive(&self) -> Result<InboundPdu, SessionError>;

    fn is_bound(&self) -> bool;
}
