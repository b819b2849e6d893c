use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexParseError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

pub type AddressParseError = HexParseError;

macro_rules! hex_newtype {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn parse(raw: &str) -> Result<Self, HexParseError> {
                let digits = raw
                    .strip_prefix("0x")
                    .or_else(|| raw.strip_prefix("0X"))
                    .ok_or(HexParseError::MissingPrefix)?;
                if digits.len() != $len * 2 {
                    return Err(HexParseError::InvalidLength {
                        expected: $len * 2,
                        actual: digits.len(),
                    });
                }
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(digits, &mut bytes)
                    .map_err(|err| HexParseError::InvalidHex(err.to_string()))?;
                Ok(Self(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = HexParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(Address, 20);
hex_newtype!(TxHash, 32);

/// Accepts `0x` followed by 40 hex digits in any case. Mixed-case checksums
/// are not verified.
pub fn is_address(raw: &str) -> bool {
    Address::parse(raw).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected(Address),
}

impl ConnectionStatus {
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Connected(address) => Some(*address),
            Self::Disconnected => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
