// Record payload codec
//
// A records carry 3 bytes behind a fixed tag byte, AAAA records carry 8
// bytes behind a fixed 8-byte prefix, TXT records carry up to 160 bytes
// as unpadded base64.  A/AAAA chunks are zero-padded, and the padding
// comes back out of the decoder as-is: a short final chunk is
// indistinguishable from one that ends in zero bytes.

use super::{DnsError, Result};
use base64::{engine::general_purpose::STANDARD_NO_PAD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// First byte of every A record answer
pub const A_TAG: u8 = 3;

/// First half of every AAAA record answer
pub const AAAA_PREFIX: [u8; 8] = [0x26, 0x00, 0x90, 0x00, 0x53, 0x05, 0xce, 0x00];

/// Largest chunk carried by any record type
pub const MAX_PAYLOAD: usize = 160;

/// DNS record type used to carry a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    AAAA,
    TXT,
    /// Any other wire type; cannot carry a payload
    Other(u16),
}

impl RecordType {
    /// Number of payload bytes one answer of this type carries
    pub fn payload_capacity(self) -> Result<usize> {
        match self {
            RecordType::A => Ok(3),
            RecordType::AAAA => Ok(8),
            RecordType::TXT => Ok(MAX_PAYLOAD),
            RecordType::Other(_) => Err(DnsError::UnsupportedRecordType(self)),
        }
    }

    /// Wire value (QTYPE / TYPE field)
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::AAAA => 28,
            RecordType::TXT => 16,
            RecordType::Other(t) => t,
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            28 => RecordType::AAAA,
            16 => RecordType::TXT,
            t => RecordType::Other(t),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::Other(t) => write!(f, "TYPE{}", t),
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "TXT" => Ok(RecordType::TXT),
            other => other
                .strip_prefix("TYPE")
                .and_then(|n| n.parse::<u16>().ok())
                .map(RecordType::from)
                .ok_or_else(|| format!("unknown record type {:?}", s)),
        }
    }
}

impl TryFrom<String> for RecordType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.to_string()
    }
}

/// Body of one answer record carrying a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    TXT(String),
}

impl RecordBody {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordBody::A(_) => RecordType::A,
            RecordBody::AAAA(_) => RecordType::AAAA,
            RecordBody::TXT(_) => RecordType::TXT,
        }
    }

    /// Wire RDATA for this body; TXT is a single character-string
    pub fn to_rdata(&self) -> Vec<u8> {
        match self {
            RecordBody::A(ip) => ip.octets().to_vec(),
            RecordBody::AAAA(ip) => ip.octets().to_vec(),
            RecordBody::TXT(text) => {
                // Base64 of MAX_PAYLOAD bytes is well under 255 characters
                let mut rdata = Vec::with_capacity(1 + text.len());
                rdata.push(text.len() as u8);
                rdata.extend_from_slice(text.as_bytes());
                rdata
            }
        }
    }
}

impl fmt::Display for RecordBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordBody::A(ip) => write!(f, "{}", ip),
            RecordBody::AAAA(ip) => write!(f, "{}", ip),
            RecordBody::TXT(text) => f.write_str(text),
        }
    }
}

/// Encode a chunk of at most `rtype.payload_capacity()` bytes
pub fn encode_payload(chunk: &[u8], rtype: RecordType) -> Result<RecordBody> {
    let capacity = rtype.payload_capacity()?;
    if chunk.len() > capacity {
        return Err(DnsError::PayloadTooLarge(chunk.len(), capacity));
    }

    Ok(match rtype {
        RecordType::A => {
            let mut octets = [0u8; 4];
            octets[0] = A_TAG;
            octets[1..1 + chunk.len()].copy_from_slice(chunk);
            RecordBody::A(Ipv4Addr::from(octets))
        }
        RecordType::AAAA => {
            let mut octets = [0u8; 16];
            octets[..8].copy_from_slice(&AAAA_PREFIX);
            octets[8..8 + chunk.len()].copy_from_slice(chunk);
            RecordBody::AAAA(Ipv6Addr::from(octets))
        }
        RecordType::TXT => RecordBody::TXT(BASE64.encode(chunk)),
        RecordType::Other(_) => return Err(DnsError::UnsupportedRecordType(rtype)),
    })
}

/// Decode one answer (address text or TXT text) into `buf`
///
/// Returns the number of bytes written.  A/AAAA answers always yield
/// their full capacity, padding included.
pub fn decode_payload(answer: &str, rtype: RecordType, buf: &mut [u8]) -> Result<usize> {
    match rtype {
        RecordType::A | RecordType::AAAA => decode_address(answer, rtype, buf),
        RecordType::TXT => decode_txt(answer, buf),
        RecordType::Other(_) => Err(DnsError::UnsupportedRecordType(rtype)),
    }
}

fn decode_address(answer: &str, rtype: RecordType, buf: &mut [u8]) -> Result<usize> {
    let ip: IpAddr = answer
        .parse()
        .map_err(|_| DnsError::Decoding(format!("invalid IP address {:?}", answer)))?;

    let capacity = rtype.payload_capacity()?;
    if buf.len() < capacity {
        return Err(DnsError::BufferTooSmall {
            need: capacity,
            have: buf.len(),
        });
    }

    match rtype {
        RecordType::A => {
            let v4 = match ip {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(v6) => v6.to_ipv4_mapped().ok_or_else(|| {
                    DnsError::Decoding(format!("{} is not an IPv4 address", answer))
                })?,
            };
            buf[..3].copy_from_slice(&v4.octets()[1..]);
            Ok(3)
        }
        _ => {
            let v6 = match ip {
                IpAddr::V4(v4) => v4.to_ipv6_mapped(),
                IpAddr::V6(v6) => v6,
            };
            buf[..8].copy_from_slice(&v6.octets()[8..]);
            Ok(8)
        }
    }
}

fn decode_txt(txt: &str, buf: &mut [u8]) -> Result<usize> {
    // Exact decoded length of unpadded base64
    let need = txt.len() * 6 / 8;
    if need > buf.len() {
        return Err(DnsError::BufferTooSmall {
            need,
            have: buf.len(),
        });
    }

    BASE64.decode_slice(txt, buf).map_err(|e| match e {
        base64::DecodeSliceError::OutputSliceTooSmall => DnsError::BufferTooSmall {
            need,
            have: buf.len(),
        },
        base64::DecodeSliceError::DecodeError(e) => {
            DnsError::Decoding(format!("decoding TXT record: {}", e))
        }
    })
}
