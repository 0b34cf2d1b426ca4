// Query name codec
//
// Names have the form <base36 offset>-<filename>.<domain>.  Only the
// leftmost label carries protocol data; the rest is the serving domain.

use super::{DnsError, Result};

/// Render `offset` in lowercase base 36 without padding
fn to_base36(mut offset: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if offset == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::with_capacity(13);
    while offset > 0 {
        digits.push(DIGITS[(offset % 36) as usize]);
        offset /= 36;
    }
    digits.reverse();

    // Only ASCII digits were pushed
    digits.into_iter().map(char::from).collect()
}

/// Build the query name asking for the chunk of `filename` at `offset`
///
/// ```
/// use dnsdrop::dns::encode_name;
///
/// assert_eq!(encode_name(0, "payload", "example.com"), "0-payload.example.com");
/// assert_eq!(encode_name(36, "payload", "example.com"), "10-payload.example.com");
/// ```
pub fn encode_name(offset: u64, filename: &str, domain: &str) -> String {
    format!("{}-{}.{}", to_base36(offset), filename, domain)
}

/// Split a query name back into its offset and filename
///
/// Matching is case-insensitive; the returned filename is lowercase.
pub fn decode_name(name: &str) -> Result<(u64, String)> {
    let lower = name.to_lowercase();
    let label = lower.split('.').next().unwrap_or_default();

    let (offset, filename) = label
        .split_once('-')
        .ok_or_else(|| DnsError::InvalidQueryName(name.to_string(), "no offset separator"))?;

    if offset.is_empty() {
        return Err(DnsError::InvalidQueryName(name.to_string(), "empty offset"));
    }

    // from_str_radix would also take a leading '+'
    if !offset.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DnsError::InvalidQueryName(name.to_string(), "offset is not base 36"));
    }

    let offset = u64::from_str_radix(offset, 36)
        .map_err(|_| DnsError::InvalidQueryName(name.to_string(), "offset is not base 36"))?;

    Ok((offset, filename.to_string()))
}
