//! Error types for the bus gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Success code reserved by the wire contract for envelopes emitted by
/// workers. The gateway itself never fabricates one.
pub const CODE_OK: i32 = 1;
pub const CODE_UNKNOWN: i32 = -1;
pub const CODE_BROKER: i32 = -1001;
pub const CODE_TIMEOUT: i32 = -1002;
pub const CODE_CONNECTION: i32 = -1003;

/// Everything a bus call can fail with. Each variant maps to the wire code
/// embedded in the HTTP error envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Broker channels were never opened or have gone away.
    #[error("AMQP Channel is not defined")]
    Connection,

    /// A broker operation (queue declare, publish, consume) failed.
    #[error("{0}")]
    Broker(String),

    /// No correlated reply arrived within the wait window.
    #[error("Timeout error")]
    Timeout,

    /// Catch-all for unexpected failures.
    #[error("{0}")]
    Unknown(String),
}

impl BusError {
    /// Queue declaration failure, with the broker's message embedded.
    pub fn lease(message: impl std::fmt::Display) -> Self {
        Self::Broker(format!("Failed to create temporary queue. {}", message))
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Connection => CODE_CONNECTION,
            Self::Broker(_) => CODE_BROKER,
            Self::Timeout => CODE_TIMEOUT,
            Self::Unknown(_) => CODE_UNKNOWN,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// JSON error envelope returned to HTTP callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: i32,
    pub message: String,
}
