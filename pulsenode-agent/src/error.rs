//! Error taxonomy for the agent
//!
//! Two tiers only: connectivity/transient errors restart the cycle after a
//! cooldown, validation errors are logged and leave state unchanged. There
//! is no catch-all path; the loop matches on kind.

use thiserror::Error;

use crate::rate::{RATE_CEIL_MS, RATE_FLOOR_MS};

/// Rejected rate update. Validation tier: never escalates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateError {
    #[error("rate payload is not a decimal integer")]
    NotANumber,
    #[error("rate {value}ms outside safe bounds ({floor}-{ceil})", value = .0, floor = RATE_FLOOR_MS, ceil = RATE_CEIL_MS)]
    OutOfBounds(i64),
}

/// Dropped peer announcement. Validation tier: never escalates.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer payload is not valid JSON: {0}")]
    BadPayload(#[from] serde_json::Error),
}

/// Network link / session establishment failure. Fatal for the cycle.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("network association timed out after {attempts} attempts")]
    LinkTimeout { attempts: u32 },
    #[error("network interface error: {0}")]
    Interface(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Messaging session failure. Fatal for the cycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("mqtt request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("mqtt connection lost: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("broker refused connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),
    #[error("timed out waiting for broker acknowledgment")]
    ConnAckTimeout,
}

/// Anything that escapes one loop iteration. The caller logs, sleeps the
/// cooldown and re-enters the cycle with fresh state.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("status serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
}
