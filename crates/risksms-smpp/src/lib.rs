//! SMPP session lifecycle, the in-flight window monitor, and inbound PDU
//! handling for one carrier service.
//!
//! `SmppSession` is the seam: the real wire protocol lives behind it (an
//! adapter over the `smpp` crate in `production`), so the rest of this
//! crate — and `risksms-sender` above it — never touches PDU bytes
//! directly except through `encoding`.

pub mod encoding;
pub mod inbound;
pub mod production;
pub mod session;
pub mod session_manager;
pub mod window_monitor;

pub use encoding::{Iso88591Encoder, Segment, TextEncoder};
pub use inbound::InboundHandler;
pub use session::{SessionError, SmppSession, SubmitOutcome, SubmitPdu, WindowEntry};
pub use session_manager::{SessionManager, SessionManagerConfig};
pub use window_monitor::{WindowMonitor, WindowMonitorConfig};

pub use risksms_common::{is_retry_eligible, RETRY_ELIGIBLE_STATUSES};
