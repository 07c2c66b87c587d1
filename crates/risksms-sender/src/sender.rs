//! Batch dispatch over a bound SMPP session: four pacing strategies
//! wrapping one per-message submit-and-record flow.

use risksms_common::{
    is_retry_eligible, MessageStatus, SmsMessage, RESPONSE_CODE_SESSION_UNAVAILABLE,
    RESPONSE_CODE_SUBMIT_EXCEPTION, SESSION_UNAVAILABLE_TEXT,
};
use risksms_smpp::encoding::{next_ref_num, segment, Iso88591Encoder, TextEncoder};
use risksms_smpp::session::{SessionError, SubmitPdu};
use risksms_smpp::SessionManager;
use risksms_store::repository::StatusUpdate;
use risksms_store::{LatencyStats, MessageStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::mode::DispatchMode;

const DEFAULT_WORKER_POOL_SIZE: usize = 50;
const DEFAULT_DELAY_MS: u64 = 500;
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(3);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const SOURCE_TON: u8 = 0x01;
const SOURCE_NPI: u8 = 0x01;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub service_name: String,
    pub source_address: String,
    pub max_attempts: u32,
    pub worker_pool_size: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            source_address: String::new(),
            max_attempts: 5,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

/// One service's outbound dispatcher. Never holds a session reference
/// itself — every submit fetches the current session fresh from
/// `SessionManager`, so a mid-batch rebind is observed by the very next
/// segment.
pub struct Sender {
    config: SenderConfig,
    store: Arc<dyn MessageStore>,
    session_manager: Arc<SessionManager>,
    latency: Arc<LatencyStats>,
    encoder: Arc<dyn TextEncoder>,
    worker_permits: Arc<Semaphore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: Arc<AtomicBool>,
}

impl Sender {
    pub fn new(
        config: SenderConfig,
        store: Arc<dyn MessageStore>,
        session_manager: Arc<SessionManager>,
        latency: Arc<LatencyStats>,
    ) -> Arc<Self> {
        let worker_permits = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Arc::new(Self {
            config,
            store,
            session_manager,
            latency,
            encoder: Arc::new(Iso88591Encoder),
            worker_permits,
            tasks: Mutex::new(Vec::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    fn resolve_delay(delay_ms: i64) -> Duration {
        if delay_ms <= 0 {
            Duration::from_millis(DEFAULT_DELAY_MS)
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    pub async fn send(self: &Arc<Self>, mode: DispatchMode, messages: Vec<SmsMessage>, delay_ms: i64) {
        if self.shutting_down.load(Ordering::SeqCst) {
            warn!(service = %self.config.service_name, "Sender is shutting down, rejecting batch");
            return;
        }
        if messages.is_empty() {
            return;
        }

        let delay = Self::resolve_delay(delay_ms);

        match mode {
            DispatchMode::Parallel => self.dispatch_parallel(messages).await,
            DispatchMode::ParallelSpaced => self.dispatch_spaced(messages, delay, false).await,
            DispatchMode::SequentialSpaced => self.run_sequential(messages, delay, false).await,
            DispatchMode::SequentialSpacedAsync => self.dispatch_spaced(messages, delay, true).await,
        }
    }

    async fn dispatch_parallel(self: &Arc<Self>, messages: Vec<SmsMessage>) {
        for message in messages {
            let sender = Arc::clone(self);
            let permits = Arc::clone(&self.worker_permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                sender.dispatch_one(message).await;
            });
            self.tasks.lock().await.push(handle);
        }
    }

    /// Spawns a single pacing task that submits one message per `delay`
    /// tick, in order. `log_completion` distinguishes
    /// `sequential_spaced_async` (which logs when the chain finishes)
    /// from `parallel_spaced` (which doesn't).
    async fn dispatch_spaced(self: &Arc<Self>, messages: Vec<SmsMessage>, delay: Duration, log_completion: bool) {
        let sender = Arc::clone(self);
        let handle = tokio::spawn(async move {
            sender.run_sequential(messages, delay, log_completion).await;
        });
        self.tasks.lock().await.push(handle);
    }

    async fn run_sequential(self: &Arc<Self>, messages: Vec<SmsMessage>, delay: Duration, log_completion: bool) {
        let count = messages.len();
        for message in messages {
            self.dispatch_one(message).await;
            tokio::time::sleep(delay).await;
        }
        if log_completion {
            info!(service = %self.config.service_name, count, "Spaced batch chain complete");
        }
    }

    /// Encodes, segments, and submits one message, applying the
    /// segment-scoped status update policy: session-unavailable aborts
    /// the whole message; otherwise only the first and last segments are
    /// reflected in storage.
    async fn dispatch_one(&self, message: SmsMessage) {
        let encoded = self.encoder.encode(&message.text);
        let ref_num = next_ref_num();
        let segments = segment(&encoded, ref_num);

        for seg in &segments {
            let session = self.session_manager.current_session().await;
            let session = match session {
                Some(s) if s.is_bound() => s,
                _ => {
                    if seg.part_num == 1 {
                        self.store
                            .update_message_status(
                                message.id,
                                MessageStatus::PendingSend,
                                self.config.max_attempts,
                                StatusUpdate {
                                    response_code: Some(RESPONSE_CODE_SESSION_UNAVAILABLE),
                                    response_text: Some(SESSION_UNAVAILABLE_TEXT),
                                    external_id: None,
                                },
                            )
                            .await;
                    }
                    return;
                }
            };

            let pdu = SubmitPdu {
                source_addr: self.config.source_address.clone(),
                dest_addr: message.destination.clone(),
                data_coding: seg.data_coding,
                esm_class: seg.esm_class,
                short_message: seg.body.clone(),
            };

            let started = std::time::Instant::now();
            let outcome = session.submit(pdu, SUBMIT_TIMEOUT).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(outcome) => {
                    self.latency.record(elapsed_ms);
                    if outcome.command_status == 0 {
                        if seg.part_num == seg.total_parts {
                            self.store
                                .update_message_status(
                                    message.id,
                                    MessageStatus::Sent,
                                    self.config.max_attempts,
                                    StatusUpdate {
                                        response_code: Some(0),
                                        response_text: outcome.result_message.as_deref(),
                                        external_id: outcome.message_id.as_deref(),
                                    },
                                )
                                .await;
                        }
                    } else if seg.part_num == 1 {
                        let new_state = if is_retry_eligible(outcome.command_status) {
                            MessageStatus::PendingSend
                        } else {
                            MessageStatus::ErrorProcessed
                        };
                        self.store
                            .update_message_status(
                                message.id,
                                new_state,
                                self.config.max_attempts,
                                StatusUpdate {
                                    response_code: Some(outcome.command_status),
                                    response_text: outcome.result_message.as_deref(),
                                    external_id: None,
                                },
                            )
                            .await;
                    }
                }
                Err(e) => {
                    match &e {
                        SessionError::Timeout(_) => self.latency.record_timeout(elapsed_ms),
                        _ => self.latency.record(elapsed_ms),
                    }
                    warn!(id = %message.id, error = %e, "Submit failed with an exception");
                    if seg.part_num == 1 {
                        let text = format!("Excepción: {e}");
                        self.store
                            .update_message_status(
                                message.id,
                                MessageStatus::PendingSend,
                                self.config.max_attempts,
                                StatusUpdate {
                                    response_code: Some(RESPONSE_CODE_SUBMIT_EXCEPTION),
                                    response_text: Some(&text),
                                    external_id: None,
                                },
                            )
                            .await;
                    }
                }
            }
        }
    }

    /// Drains in-flight tasks gracefully for up to 5 seconds, then
    /// force-cancels whatever remains. New sends are rejected from the
    /// moment this is called.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().await);
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;

        for handle in handles {
            let abort_handle = handle.abort_handle();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, handle).await.is_err() {
                warn!(service = %self.config.service_name, "Force-cancelling sender task after grace period");
                abort_handle.abort();
            }
        }

        info!(service = %self.config.service_name, "Sender shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use risksms_common::MessageStatus as Status;
    use risksms_smpp::session::{InboundPdu, SmppSession, WindowEntry};
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;

    struct RecordedUpdate {
        id: Decimal,
        state: MessageStatus,
        response_code: Option<i32>,
        external_id: Option<String>,
    }

    #[derive(Default)]
    struct FakeStore {
        updates: StdMutex<Vec<RecordedUpdate>>,
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
            id: Decimal,
            new_state: MessageStatus,
            _max_attempts: u32,
            update: StatusUpdate<'_>,
        ) {
            self.updates.lock().unwrap().push(RecordedUpdate {
                id,
                state: new_state,
                response_code: update.response_code,
                external_id: update.external_id.map(str::to_string),
            });
        }

        async fn bulk_claim(&self, _ids: &[Decimal], _new_state: MessageStatus) -> Vec<Decimal> {
            Vec::new()
        }

        async fn save_received_message(&self, _origin: &str, _destination: &str, _text: &str) -> Option<Decimal> {
            None
        }
    }

    struct FakeSession {
        bound: bool,
        responses: StdMutex<Vec<Result<SubmitOutcome, SessionError>>>,
        submitted: StdMutex<Vec<SubmitPdu>>,
    }

    impl FakeSession {
        fn bound_with(responses: Vec<Result<SubmitOutcome, SessionError>>) -> Arc<Self> {
            Arc::new(Self {
                bound: true,
                responses: StdMutex::new(responses.into_iter().rev().collect()),
                submitted: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SmppSession for FakeSession {
        async fn submit(&self, pdu: SubmitPdu, _timeout: Duration) -> Result<SubmitOutcome, SessionError> {
            self.submitted.lock().unwrap().push(pdu);
            self.responses.lock().unwrap().pop().unwrap_or(Ok(SubmitOutcome {
                command_status: 0,
                message_id: Some("default".to_string()),
                result_message: Some("OK".to_string()),
            }))
        }

        async fn window_snapshot(&self) -> Vec<WindowEntry> {
            Vec::new()
        }

        async fn cancel_slot(&self, _sequence_number: u32) -> bool {
            false
        }

        async fn unbind(&self, _wait: Duration) -> Result<(), SessionError> {
            Ok(())
        }

        async fn receive(&self) -> Result<InboundPdu, SessionError> {
            std::future::pending().await
        }

        fn is_bound(&self) -> bool {
            self.bound
        }
    }

    fn test_message(id: i64) -> SmsMessage {
        SmsMessage {
            id: Decimal::from(id),
            source: "1000".to_string(),
            destination: "0972100000".to_string(),
            text: "Hola".to_string(),
        }
    }

    async fn make_sender(store: Arc<FakeStore>, session: Option<Arc<FakeSession>>) -> Arc<Sender> {
        let latency = Arc::new(LatencyStats::new("svc", 100));
        let session_manager = SessionManager::new(store.clone(), latency.clone());
        if let Some(session) = session {
            session_manager.set_session(session).await;
        }
        Sender::new(
            SenderConfig {
                service_name: "svc".to_string(),
                source_address: "1000".to_string(),
                max_attempts: 5,
                worker_pool_size: 4,
            },
            store,
            session_manager,
            latency,
        )
    }

    #[tokio::test]
    async fn happy_path_marks_sent_with_external_id() {
        let store = Arc::new(FakeStore::default());
        let session = FakeSession::bound_with(vec![Ok(SubmitOutcome {
            command_status: 0,
            message_id: Some("ext-42".to_string()),
            result_message: Some("OK".to_string()),
        })]);
        let sender = make_sender(store.clone(), Some(session)).await;

        sender
            .send(DispatchMode::SequentialSpaced, vec![test_message(10)], 0)
            .await;

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, Status::Sent);
        assert_eq!(updates[0].external_id.as_deref(), Some("ext-42"));
    }

    #[tokio::test]
    async fn retry_eligible_status_keeps_message_pending() {
        let store = Arc::new(FakeStore::default());
        let session = FakeSession::bound_with(vec![Ok(SubmitOutcome {
            command_status: 88,
            message_id: None,
            result_message: Some("busy".to_string()),
        })]);
        let sender = make_sender(store.clone(), Some(session)).await;

        sender
            .send(DispatchMode::SequentialSpaced, vec![test_message(11)], 0)
            .await;

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates[0].state, Status::PendingSend);
        assert_eq!(updates[0].response_code, Some(88));
    }

    #[tokio::test]
    async fn terminal_status_marks_error_processed() {
        let store = Arc::new(FakeStore::default());
        let session = FakeSession::bound_with(vec![Ok(SubmitOutcome {
            command_status: 13,
            message_id: None,
            result_message: Some("rejected".to_string()),
        })]);
        let sender = make_sender(store.clone(), Some(session)).await;

        sender
            .send(DispatchMode::SequentialSpaced, vec![test_message(12)], 0)
            .await;

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates[0].state, Status::ErrorProcessed);
        assert_eq!(updates[0].response_code, Some(13));
    }

    #[tokio::test]
    async fn no_session_marks_pending_with_session_unavailable_code() {
        let store = Arc::new(FakeStore::default());
        let sender = make_sender(store.clone(), None).await;

        sender
            .send(DispatchMode::SequentialSpaced, vec![test_message(13)], 0)
            .await;

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, Status::PendingSend);
        assert_eq!(updates[0].response_code, Some(RESPONSE_CODE_SESSION_UNAVAILABLE));
    }

    #[tokio::test]
    async fn multi_segment_message_only_commits_sent_after_final_segment() {
        let store = Arc::new(FakeStore::default());
        let session = FakeSession::bound_with(vec![
            Ok(SubmitOutcome {
                command_status: 0,
                message_id: Some("part-1".to_string()),
                result_message: Some("OK".to_string()),
            }),
            Ok(SubmitOutcome {
                command_status: 0,
                message_id: Some("part-2".to_string()),
                result_message: Some("OK".to_string()),
            }),
        ]);
        let mut message = test_message(14);
        message.text = "A".repeat(200);
        let sender = make_sender(store.clone(), Some(session)).await;

        sender.send(DispatchMode::SequentialSpaced, vec![message], 0).await;

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, Status::Sent);
        assert_eq!(updates[0].external_id.as_deref(), Some("part-2"));
    }

    #[tokio::test]
    async fn empty_batch_does_not_submit_or_update() {
        let store = Arc::new(FakeStore::default());
        let sender = make_sender(store.clone(), None).await;

        sender.send(DispatchMode::SequentialSpaced, vec![], 0).await;

        assert!(store.updates.lock().unwrap().is_empty());
    }
}
