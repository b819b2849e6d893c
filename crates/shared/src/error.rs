use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotConnected,
    Rejected,
    Reverted,
    Transport,
    Decode,
    InvalidInput,
}

/// Failure surfaced to the user through `ContractState::error`. The message
/// is shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ContractError {
    pub code: ErrorCode,
    pub message: String,
}

impl ContractError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected, "no wallet connected")
    }
}
