//! Routes inbound `deliver_sm` PDUs to either delivery-receipt logging or
//! mobile-originated persistence.

use risksms_store::MessageStore;
use std::sync::Arc;
use tracing::info;

const ESM_CLASS_DLR_BIT: u8 = 0x04;

/// One bound session's inbound-PDU callback. Constructed fresh on every
/// bind (and rebind) alongside the session it serves.
pub struct InboundHandler {
    service_name: String,
    store: Arc<dyn MessageStore>,
}

impl InboundHandler {
    pub fn new(service_name: impl Into<String>, store: Arc<dyn MessageStore>) -> Self {
        Self {
            service_name: service_name.into(),
            store,
        }
    }

    /// Handles one inbound PDU's fields, already decoded from the wire by
    /// the caller. Always succeeds from the caller's point of view — a
    /// positive response is implied by returning.
    pub async fn handle(&self, esm_class: u8, source_addr: &str, dest_addr: &str, short_message: &[u8]) {
        let text = String::from_utf8_lossy(short_message).into_owned();

        if esm_class & ESM_CLASS_DLR_BIT == ESM_CLASS_DLR_BIT {
            self.handle_delivery_receipt(&text);
        } else {
            self.handle_mobile_originated(source_addr, dest_addr, &text).await;
        }
    }

    fn handle_delivery_receipt(&self, body: &str) {
        let mut id = String::new();
        let mut stat = String::new();
        for token in body.split_whitespace() {
            if let Some((key, value)) = token.split_once(':') {
                match key {
                    "id" => id = value.to_string(),
                    "stat" => stat = value.to_string(),
                    _ => {}
                }
            }
        }
        info!(service = %self.service_name, id, stat, "Delivery receipt received");
    }

    async fn handle_mobile_originated(&self, origin: &str, destination: &str, text: &str) {
        let saved_id = self.store.save_received_message(origin, destination, text).await;
        info!(
            service = %self.service_name,
            origin,
            destination,
            id = ?saved_id,
            "Mobile-originated message received"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use risksms_common::{MessageStatus, SmsMessage};
    use risksms_store::repository::StatusUpdate;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        received: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl MessageStore for FakeStore {
        async fn load_pending_messages(
            &self,
            _source: &str,
            _carrier: Option<&str>,
            _classification: Option<&str>,
            _limit: u32,
        ) -> Vec<SmsMessage> {
            Vec::new()
        }

        async fn update_message_status(
            &self,
            _id: Decimal,
            _new_state: MessageStatus,
            _max_attempts: u32,
            _update: StatusUpdate<'_>,
        ) {
        }

        async fn bulk_claim(&self, _ids: &[Decimal], _new_state: MessageStatus) -> Vec<Decimal> {
            Vec::new()
        }

        async fn save_received_message(&self, origin: &str, destination: &str, text: &str) -> Option<Decimal> {
            self.received
                .lock()
                .unwrap()
                .push((origin.to_string(), destination.to_string(), text.to_string()));
            Some(Decimal::from(1))
        }
    }

    #[tokio::test]
    async fn dlr_bit_set_does_not_persist_a_received_message() {
        let store = Arc::new(FakeStore::default());
        let handler = InboundHandler::new("svc", store.clone());
        handler.handle(0x04, "1000", "0972100000", b"id:ext-42 stat:DELIVRD").await;
        assert!(store.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mobile_originated_without_dlr_bit_is_persisted() {
        let store = Arc::new(FakeStore::default());
        let handler = InboundHandler::new("svc", store.clone());
        handler.handle(0x00, "0972100000", "1000", b"hola").await;
        let received = store.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].2, "hola");
    }

    #[tokio::test]
    async fn empty_mo_text_is_persisted_as_empty_string() {
        let store = Arc::new(FakeStore::default());
        let handler = InboundHandler::new("svc", store.clone());
        handler.handle(0x00, "0972100000", "1000", b"").await;
        assert_eq!(store.received.lock().unwrap()[0].2, "");
    }
}
