// DNS encoding and decoding for file chunks
//
// Maps (offset, filename) pairs to query names and file chunks to
// A/AAAA/TXT record bodies, plus the raw message codec both sides share

pub mod name;
pub mod payload;
pub mod protocol;

pub use name::{decode_name, encode_name};
pub use payload::{
    decode_payload, encode_payload, RecordBody, RecordType, AAAA_PREFIX, A_TAG, MAX_PAYLOAD,
};
pub use protocol::{DnsHeader, DnsMessage, DnsQuestion, DnsRecord, ResponseCode, CLASS_INET};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Invalid query name {0:?}: {1}")]
    InvalidQueryName(String, &'static str),

    #[error("Unsupported record type {0}")]
    UnsupportedRecordType(RecordType),

    #[error("Payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),

    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Invalid DNS message: {0}")]
    InvalidMessage(String),

    #[error("Offset {offset} cannot advance by {step} bytes")]
    OffsetOverflow { offset: u64, step: usize },
}

pub type Result<T> = std::result::Result<T, DnsError>;
