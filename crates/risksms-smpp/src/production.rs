//! Adapter from `SmppSession` onto the real `smpp` wire crate.
//!
//! The `smpp` crate's client types take `&mut self` for bind/submit/unbind,
//! so the client itself lives behind a `tokio::sync::Mutex`; in-flight
//! window bookkeeping is kept separately from the client because the
//! window monitor needs to inspect and cancel slots without blocking on
//! whatever the client itself is doing.

use async_trait::async_trait;
use smpp::client::traits::{SmppClient, SmppConnection, SmppReceiver, SmppTransmitter};
use smpp::client::types::BindCredentials;
use smpp::client::DefaultClient;
use smpp::datatypes::{DeliverSm, SubmitSm};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::session::{InboundPdu, SessionError, SmppSession, SubmitOutcome, SubmitPdu, WindowEntry};

const SOURCE_TON: u8 = 0x01;
const SOURCE_NPI: u8 = 0x01;
const INTERFACE_VERSION: u8 = 0x34;

struct InFlight {
    slots: StdMutex<HashMap<u32, Instant>>,
    next_slot: AtomicU32,
}

impl InFlight {
    fn new() -> Self {
        Self {
            slots: StdMutex::new(HashMap::new()),
            next_slot: AtomicU32::new(1),
        }
    }

    fn offer(&self) -> u32 {
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().unwrap().insert(slot, Instant::now());
        slot
    }

    fn complete(&self, slot: u32) {
        self.slots.lock().unwrap().remove(&slot);
    }
}

/// Production `SmppSession` wrapping a bound `smpp::client::DefaultClient`.
pub struct ProductionSmppSession {
    client: Mutex<DefaultClient>,
    bound: AtomicBool,
    in_flight: InFlight,
}

impl ProductionSmppSession {
    /// Connects and binds as TRANSCEIVER against `host:port` with the
    /// given credentials. `session_name` is used only for logging.
    pub async fn bind(
        host: &str,
        port: u16,
        system_id: &str,
        password: &str,
        session_name: &str,
    ) -> Result<Self, SessionError> {
        let addr = format!("{host}:{port}");
        let mut client = DefaultClient::connect(&addr)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let credentials = BindCredentials {
            system_id: system_id.to_string(),
            password: password.to_string(),
            system_type: String::new(),
            interface_version: INTERFACE_VERSION,
            ..Default::default()
        };

        client
            .bind(&credentials)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        debug!(session = %session_name, %addr, "SMPP TRANSCEIVER bound");

        Ok(Self {
            client: Mutex::new(client),
            bound: AtomicBool::new(true),
            in_flight: InFlight::new(),
        })
    }

}

#[async_trait]
impl SmppSession for ProductionSmppSession {
    async fn submit(&self, pdu: SubmitPdu, timeout: Duration) -> Result<SubmitOutcome, SessionError> {
        if !self.is_bound() {
            return Err(SessionError::NotBound);
        }

        let slot = self.in_flight.offer();

        let submit_sm = SubmitSm {
            source_addr_ton: SOURCE_TON,
            source_addr_npi: SOURCE_NPI,
            source_addr: pdu.source_addr,
            dest_addr_ton: SOURCE_TON,
            dest_addr_npi: SOURCE_NPI,
            destination_addr: pdu.dest_addr,
            esm_class: pdu.esm_class,
            data_coding: pdu.data_coding,
            short_message: pdu.short_message,
            ..Default::default()
        };

        let result = tokio::time::timeout(timeout, async {
            let mut client = self.client.lock().await;
            client.submit_sm(&submit_sm).await
        })
        .await;

        self.in_flight.complete(slot);

        match result {
            Ok(Ok(message_id)) => Ok(SubmitOutcome {
                command_status: 0,
                message_id: Some(message_id),
                result_message: Some("OK".to_string()),
            }),
            Ok(Err(e)) => {
                warn!(error = %e, "submit_sm rejected");
                Ok(SubmitOutcome {
                    command_status: e.command_status().unwrap_or(-1),
                    message_id: None,
                    result_message: Some(e.to_string()),
                })
            }
            Err(_) => Err(SessionError::Timeout(timeout)),
        }
    }

    async fn window_snapshot(&self) -> Vec<WindowEntry> {
        self.in_flight
            .slots
            .lock()
            .unwrap()
            .iter()
            .map(|(seq, offered_at)| WindowEntry {
                sequence_number: *seq,
                offered_at: *offered_at,
            })
            .collect()
    }

    async fn cancel_slot(&self, sequence_number: u32) -> bool {
        self.in_flight
            .slots
            .lock()
            .unwrap()
            .remove(&sequence_number)
            .is_some()
    }

    async fn unbind(&self, wait: Duration) -> Result<(), SessionError> {
        self.bound.store(false, Ordering::SeqCst);
        let mut client = self.client.lock().await;
        match tokio::time::timeout(wait, client.unbind()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(e.to_string())),
            Err(_) => Err(SessionError::Timeout(wait)),
        }
    }

    async fn receive(&self) -> Result<InboundPdu, SessionError> {
        let mut client = self.client.lock().await;
        let pdu: DeliverSm = client
            .receive_message()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(InboundPdu {
            esm_class: pdu.esm_class,
            source_addr: pdu.source_addr,
            dest_addr: pdu.destination_addr,
            short_message: pdu.short_message,
        })
    }

    fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }
}
