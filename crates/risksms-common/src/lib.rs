//! Shared types for the risk-sms gateway: the `SmsMessage` value type, the
//! closed `MessageStatus` enumeration whose wire codes are frozen, and the
//! structured-logging bootstrap shared by every binary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod logging;

/// An outbound or inbound SMS message as carried through the gateway.
///
/// Immutable value type: nothing in the send/receive pipeline mutates an
/// `SmsMessage` in place, it is replaced by a fresh value on each load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// Arbitrary-precision row identity (mirrors a `NUMBER` primary key).
    pub id: Decimal,
    /// Sender address, copied in from the service's configured source
    /// address rather than read from storage.
    pub source: String,
    pub destination: String,
    pub text: String,
}

/// The five terminal/non-terminal states a persisted message can occupy.
///
/// Wire codes are frozen single-character strings and must never change;
/// lookup by code is total (`from_code` returns `None` for anything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// `"P"` — awaiting dispatch.
    PendingSend,
    /// `"N"` — claimed by a worker (optional transitional state).
    InProgress,
    /// `"E"` — accepted by the carrier.
    Sent,
    /// `"R"` — terminal failure or attempt cap reached.
    ErrorProcessed,
    /// `"A"` — administratively voided.
    Cancelled,
}

impl MessageStatus {
    pub const fn code(self) -> &'static str {
        match self {
            MessageStatus::PendingSend => "P",
            MessageStatus::InProgress => "N",
            MessageStatus::Sent => "E",
            MessageStatus::ErrorProcessed => "R",
            MessageStatus::Cancelled => "A",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "P" => Some(MessageStatus::PendingSend),
            "N" => Some(MessageStatus::InProgress),
            "E" => Some(MessageStatus::Sent),
            "R" => Some(MessageStatus::ErrorProcessed),
            "A" => Some(MessageStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for MessageStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MessageStatus::from_code(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown message status code: {s}")))
    }
}

/// Which SMPP submit-response status codes leave a message eligible for
/// retry (returned to `PENDING_SEND`) versus terminal (`ERROR_PROCESSED`).
///
/// Frozen by the wire contract in the specification: exactly these four
/// codes are retry-eligible, everything else non-zero is terminal.
pub const RETRY_ELIGIBLE_STATUSES: [i32; 4] = [-1, 8, 20, 88];

pub fn is_retry_eligible(status: i32) -> bool {
    RETRY_ELIGIBLE_STATUSES.contains(&status)
}

/// Synthetic response code used when no bound session was available at
/// send time; no submit was attempted.
pub const RESPONSE_CODE_SESSION_UNAVAILABLE: i32 = 999998;
/// Synthetic response code used when submit raised an exception/error
/// rather than returning a carrier status.
pub const RESPONSE_CODE_SUBMIT_EXCEPTION: i32 = 999999;

pub const SESSION_UNAVAILABLE_TEXT: &str = "Sesión no disponible";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_code_is_total_and_exact() {
        assert_eq!(MessageStatus::from_code("P"), Some(MessageStatus::PendingSend));
        assert_eq!(MessageStatus::from_code("N"), Some(MessageStatus::InProgress));
        assert_eq!(MessageStatus::from_code("E"), Some(MessageStatus::Sent));
        assert_eq!(MessageStatus::from_code("R"), Some(MessageStatus::ErrorProcessed));
        assert_eq!(MessageStatus::from_code("A"), Some(MessageStatus::Cancelled));
        assert_eq!(MessageStatus::from_code("Z"), None);
        assert_eq!(MessageStatus::from_code(""), None);
    }

    #[test]
    fn round_trips_through_its_own_code() {
        for status in [
            MessageStatus::PendingSend,
            MessageStatus::InProgress,
            MessageStatus::Sent,
            MessageStatus::ErrorProcessed,
            MessageStatus::Cancelled,
        ] {
            assert_eq!(MessageStatus::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn retry_eligible_set_is_exact() {
        for code in RETRY_ELIGIBLE_STATUSES {
            assert!(is_retry_eligible(code));
        }
        assert!(!is_retry_eligible(0));
        assert!(!is_retry_eligible(13));
        assert!(!is_retry_eligible(1));
    }
}
