//! Call encoding and return decoding for the attendance contract interface.
//!
//! Only the six functions the client consumes are described here. Selectors
//! are the first four bytes of the keccak-256 hash of each signature.

use thiserror::Error;

use crate::domain::Address;

const WORD: usize = 32;
const ADDRESS_PADDING: usize = WORD - Address::LEN;
const U64_PADDING: usize = WORD - 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("return data truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("uint256 value does not fit in 64 bits")]
    Overflow,
    #[error("address word has non-zero padding")]
    DirtyAddress,
    #[error("expected {expected} return value")]
    UnexpectedValue { expected: &'static str },
    #[error("invalid hex payload: {0}")]
    Hex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadCall {
    Owner,
    AttendeeCount,
    AllAttendees,
    AttendanceTimestamp(Address),
}

impl ReadCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::AttendeeCount => "getAttendeeCount",
            Self::AllAttendees => "getAllAttendees",
            Self::AttendanceTimestamp(_) => "getAttendanceTimestamp",
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        match self {
            Self::Owner => [0x8d, 0xa5, 0xcb, 0x5b],
            Self::AttendeeCount => [0xab, 0xaf, 0xe4, 0x85],
            Self::AllAttendees => [0xe3, 0x36, 0x96, 0xf7],
            Self::AttendanceTimestamp(_) => [0x17, 0x8f, 0x15, 0x36],
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.selector().to_vec();
        if let Self::AttendanceTimestamp(address) = self {
            data.extend_from_slice(&encode_address(address));
        }
        data
    }

    pub fn decode(&self, data: &[u8]) -> Result<ReadValue, AbiError> {
        match self {
            Self::Owner => decode_address(word_at(data, 0)?).map(ReadValue::Address),
            Self::AttendeeCount | Self::AttendanceTimestamp(_) => {
                decode_u64(word_at(data, 0)?).map(ReadValue::Uint)
            }
            Self::AllAttendees => decode_address_array(data).map(ReadValue::Addresses),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteCall {
    MarkAttendance,
    ClearAttendance,
}

impl WriteCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::MarkAttendance => "markAttendance",
            Self::ClearAttendance => "clearAttendance",
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        match self {
            Self::MarkAttendance => [0x3d, 0xc9, 0x38, 0xc1],
            Self::ClearAttendance => [0x0f, 0x57, 0xa2, 0x97],
        }
    }

    /// Neither write takes arguments, so calldata is the bare selector.
    pub fn encode(&self) -> Vec<u8> {
        self.selector().to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadValue {
    Address(Address),
    Uint(u64),
    Addresses(Vec<Address>),
}

impl ReadValue {
    pub fn into_address(self) -> Result<Address, AbiError> {
        match self {
            Self::Address(address) => Ok(address),
            _ => Err(AbiError::UnexpectedValue { expected: "address" }),
        }
    }

    pub fn into_uint(self) -> Result<u64, AbiError> {
        match self {
            Self::Uint(value) => Ok(value),
            _ => Err(AbiError::UnexpectedValue { expected: "uint256" }),
        }
    }

    pub fn into_addresses(self) -> Result<Vec<Address>, AbiError> {
        match self {
            Self::Addresses(addresses) => Ok(addresses),
            _ => Err(AbiError::UnexpectedValue {
                expected: "address[]",
            }),
        }
    }
}

pub fn encode_address(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[ADDRESS_PADDING..].copy_from_slice(address.as_bytes());
    word
}

pub fn encode_u64(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[U64_PADDING..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex(raw: &str) -> Result<Vec<u8>, AbiError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|err| AbiError::Hex(err.to_string()))
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Overflow)?;
    data.get(offset..end).ok_or(AbiError::Truncated {
        needed: end,
        actual: data.len(),
    })
}

fn decode_u64(word: &[u8]) -> Result<u64, AbiError> {
    if word[..U64_PADDING].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[U64_PADDING..]);
    Ok(u64::from_be_bytes(bytes))
}

fn decode_usize(word: &[u8]) -> Result<usize, AbiError> {
    usize::try_from(decode_u64(word)?).map_err(|_| AbiError::Overflow)
}

fn decode_address(word: &[u8]) -> Result<Address, AbiError> {
    if word[..ADDRESS_PADDING].iter().any(|b| *b != 0) {
        return Err(AbiError::DirtyAddress);
    }
    let mut bytes = [0u8; Address::LEN];
    bytes.copy_from_slice(&word[ADDRESS_PADDING..]);
    Ok(Address(bytes))
}

fn decode_address_array(data: &[u8]) -> Result<Vec<Address>, AbiError> {
    let offset = decode_usize(word_at(data, 0)?)?;
    let len = decode_usize(word_at(data, offset)?)?;

    let body_start = offset + WORD;
    let needed = len
        .checked_mul(WORD)
        .and_then(|body| body.checked_add(body_start))
        .ok_or(AbiError::Overflow)?;
    if data.len() < needed {
        return Err(AbiError::Truncated {
            needed,
            actual: data.len(),
        });
    }

    (0..len)
        .map(|i| decode_address(word_at(data, body_start + i * WORD)?))
        .collect()
}

#[cfg(test)]
#[path = "tests/abi_tests.rs"]
mod tests;
