// Minimal DNS protocol implementation
//
// Implements just enough of RFC 1035 to:
// - Build recursive queries for DNS over HTTPS
// - Parse DoH answers, following compression pointers
// - Parse inbound queries and pack responses on the server

use super::{DnsError, RecordBody, RecordType, Result};
use bytes::{Buf, BufMut};
use std::fmt;
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Class IN
pub const CLASS_INET: u16 = 1;

/// Longest label allowed on the wire
const MAX_LABEL_LEN: usize = 63;

/// Longest encoded name allowed on the wire
const MAX_NAME_LEN: usize = 255;

/// Compression pointers followed before a name is considered looped
const MAX_POINTERS: usize = 16;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const RCODE_MASK: u16 = 0x000f;

/// Header RCODE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const NO_ERROR: Self = Self(0);
    pub const FORM_ERR: Self = Self(1);
    pub const SERV_FAIL: Self = Self(2);
    pub const NX_DOMAIN: Self = Self(3);
    pub const NOT_IMP: Self = Self(4);
    pub const REFUSED: Self = Self(5);

    /// Symbolic name, as printed by dig and friends
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "NoError",
            1 => "FormErr",
            2 => "ServFail",
            3 => "NXDomain",
            4 => "NotImp",
            5 => "Refused",
            6 => "YXDomain",
            7 => "YXRRSet",
            8 => "NXRRSet",
            9 => "NotAuth",
            10 => "NotZone",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DNS message header (12 bytes)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,      // Transaction ID
    pub flags: u16,   // Flags
    pub qdcount: u16, // Question count
    pub ancount: u16, // Answer count
    pub nscount: u16, // Authority count
    pub arcount: u16, // Additional count
}

impl DnsHeader {
    /// Parse header from bytes
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Self> {
        if buf.remaining() < 12 {
            return Err(DnsError::InvalidMessage("Header too short".into()));
        }

        Ok(Self {
            id: buf.get_u16(),
            flags: buf.get_u16(),
            qdcount: buf.get_u16(),
            ancount: buf.get_u16(),
            nscount: buf.get_u16(),
            arcount: buf.get_u16(),
        })
    }

    /// Write header to buffer
    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.id);
        buf.put_u16(self.flags);
        buf.put_u16(self.qdcount);
        buf.put_u16(self.ancount);
        buf.put_u16(self.nscount);
        buf.put_u16(self.arcount);
    }

    fn set_flag(&mut self, flag: u16, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn set_response(&mut self, on: bool) {
        self.set_flag(FLAG_QR, on);
    }

    pub fn is_authoritative(&self) -> bool {
        self.flags & FLAG_AA != 0
    }

    pub fn set_authoritative(&mut self, on: bool) {
        self.set_flag(FLAG_AA, on);
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & FLAG_RD != 0
    }

    pub fn set_recursion_desired(&mut self, on: bool) {
        self.set_flag(FLAG_RD, on);
    }

    pub fn recursion_available(&self) -> bool {
        self.flags & FLAG_RA != 0
    }

    pub fn set_recursion_available(&mut self, on: bool) {
        self.set_flag(FLAG_RA, on);
    }

    pub fn rcode(&self) -> ResponseCode {
        ResponseCode((self.flags & RCODE_MASK) as u8)
    }

    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.flags = (self.flags & !RCODE_MASK) | (rcode.0 as u16 & RCODE_MASK);
    }
}

/// DNS question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub qname: String,
    pub qtype: RecordType,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn new(qname: &str, qtype: RecordType) -> Self {
        Self {
            qname: qname.to_string(),
            qtype,
            qclass: CLASS_INET,
        }
    }

    /// Parse question from bytes
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Self> {
        let qname = read_domain_name(buf)?;

        if buf.remaining() < 4 {
            return Err(DnsError::InvalidMessage("Question too short".into()));
        }

        Ok(Self {
            qname,
            qtype: RecordType::from(buf.get_u16()),
            qclass: buf.get_u16(),
        })
    }

    /// Write question to buffer
    pub fn write<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        write_domain_name(&self.qname, buf)?;
        buf.put_u16(self.qtype.to_u16());
        buf.put_u16(self.qclass);
        Ok(())
    }
}

/// DNS resource record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub rtype: RecordType,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl DnsRecord {
    /// Create a record holding an encoded chunk
    pub fn new(name: &str, body: &RecordBody, rclass: u16, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: body.record_type(),
            rclass,
            ttl,
            rdata: body.to_rdata(),
        }
    }

    /// Parse record from bytes
    pub fn parse(buf: &mut Cursor<&[u8]>) -> Result<Self> {
        let name = read_domain_name(buf)?;

        if buf.remaining() < 10 {
            return Err(DnsError::InvalidMessage("Record too short".into()));
        }

        let rtype = RecordType::from(buf.get_u16());
        let rclass = buf.get_u16();
        let ttl = buf.get_u32();
        let rdlen = buf.get_u16() as usize;

        if buf.remaining() < rdlen {
            return Err(DnsError::InvalidMessage("Truncated record data".into()));
        }

        let mut rdata = vec![0u8; rdlen];
        buf.copy_to_slice(&mut rdata);

        Ok(Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }

    /// Write record to buffer
    pub fn write<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.rdata.len() > u16::MAX as usize {
            return Err(DnsError::InvalidMessage("Record data too long".into()));
        }

        write_domain_name(&self.name, buf)?;
        buf.put_u16(self.rtype.to_u16());
        buf.put_u16(self.rclass);
        buf.put_u32(self.ttl);
        buf.put_u16(self.rdata.len() as u16);
        buf.put_slice(&self.rdata);
        Ok(())
    }

    /// Character-strings of a TXT record, in order
    pub fn txt_strings(&self) -> Result<Vec<&[u8]>> {
        let mut strings = Vec::new();
        let mut rest = &self.rdata[..];

        while let Some((&len, tail)) = rest.split_first() {
            let len = len as usize;
            if tail.len() < len {
                return Err(DnsError::InvalidMessage("Truncated TXT data".into()));
            }
            strings.push(&tail[..len]);
            rest = &tail[len..];
        }

        Ok(strings)
    }

    /// Text form of the record data: an address for A/AAAA, the
    /// concatenated character-strings for TXT
    pub fn rdata_text(&self) -> Result<String> {
        match self.rtype {
            RecordType::A => {
                let octets: [u8; 4] = self.rdata[..].try_into().map_err(|_| {
                    DnsError::InvalidMessage(format!("A record of {} bytes", self.rdata.len()))
                })?;
                Ok(Ipv4Addr::from(octets).to_string())
            }
            RecordType::AAAA => {
                let octets: [u8; 16] = self.rdata[..].try_into().map_err(|_| {
                    DnsError::InvalidMessage(format!("AAAA record of {} bytes", self.rdata.len()))
                })?;
                Ok(Ipv6Addr::from(octets).to_string())
            }
            RecordType::TXT => {
                let joined: Vec<u8> = self.txt_strings()?.concat();
                Ok(String::from_utf8_lossy(&joined).into_owned())
            }
            RecordType::Other(_) => Err(DnsError::UnsupportedRecordType(self.rtype)),
        }
    }
}

/// DNS message (complete query or response)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub additionals: Vec<DnsRecord>,
}

impl DnsMessage {
    /// Create a recursive single-question query with ID 0
    pub fn new_query(qname: &str, qtype: RecordType) -> Self {
        let mut header = DnsHeader::default();
        header.set_recursion_desired(true);

        Self {
            header,
            questions: vec![DnsQuestion::new(qname, qtype)],
            ..Default::default()
        }
    }

    /// Parse DNS message from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut msg = Self::default();
        msg.unpack_into(data)?;
        Ok(msg)
    }

    /// Parse DNS message from bytes into `self`, reusing its allocations
    pub fn unpack_into(&mut self, data: &[u8]) -> Result<()> {
        self.clear();

        let mut cursor = Cursor::new(data);
        self.header = DnsHeader::parse(&mut cursor)?;

        for _ in 0..self.header.qdcount {
            self.questions.push(DnsQuestion::parse(&mut cursor)?);
        }
        for _ in 0..self.header.ancount {
            self.answers.push(DnsRecord::parse(&mut cursor)?);
        }
        for _ in 0..self.header.nscount {
            self.authorities.push(DnsRecord::parse(&mut cursor)?);
        }
        for _ in 0..self.header.arcount {
            self.additionals.push(DnsRecord::parse(&mut cursor)?);
        }

        Ok(())
    }

    /// Reset to an empty message, keeping allocations
    pub fn clear(&mut self) {
        self.header = DnsHeader::default();
        self.questions.clear();
        self.answers.clear();
        self.authorities.clear();
        self.additionals.clear();
    }

    /// Serialize into `buf`; section counts come from the section lengths
    pub fn write<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let count = |n: usize| {
            u16::try_from(n).map_err(|_| DnsError::InvalidMessage("Too many records".into()))
        };

        let header = DnsHeader {
            qdcount: count(self.questions.len())?,
            ancount: count(self.answers.len())?,
            nscount: count(self.authorities.len())?,
            arcount: count(self.additionals.len())?,
            ..self.header.clone()
        };
        header.write(buf);

        for q in &self.questions {
            q.write(buf)?;
        }
        for r in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            r.write(buf)?;
        }

        Ok(())
    }

    /// Serialize DNS message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(512);
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// Read a domain name, following compression pointers
fn read_domain_name(buf: &mut Cursor<&[u8]>) -> Result<String> {
    let msg: &[u8] = *buf.get_ref();
    let mut pos = buf.position() as usize;
    let mut labels: Vec<String> = Vec::new();
    let mut resume_at = None;
    let mut pointers = 0;
    let mut name_len = 1;

    loop {
        let len = *msg
            .get(pos)
            .ok_or_else(|| DnsError::InvalidMessage("Truncated domain name".into()))?;

        match len & 0xc0 {
            0x00 if len == 0 => {
                pos += 1;
                break;
            }
            0x00 => {
                let start = pos + 1;
                let end = start + len as usize;
                let label = msg
                    .get(start..end)
                    .ok_or_else(|| DnsError::InvalidMessage("Truncated label".into()))?;

                name_len += 1 + label.len();
                if name_len > MAX_NAME_LEN {
                    return Err(DnsError::InvalidMessage("Domain name too long".into()));
                }

                labels.push(String::from_utf8(label.to_vec()).map_err(|_| {
                    DnsError::InvalidMessage("Invalid UTF-8 in domain name".into())
                })?);
                pos = end;
            }
            0xc0 => {
                let low = *msg
                    .get(pos + 1)
                    .ok_or_else(|| DnsError::InvalidMessage("Truncated pointer".into()))?;

                pointers += 1;
                if pointers > MAX_POINTERS {
                    return Err(DnsError::InvalidMessage("Too many compression pointers".into()));
                }

                // Only the first pointer determines where the record continues
                resume_at.get_or_insert(pos + 2);
                pos = (((len & 0x3f) as usize) << 8) | low as usize;
            }
            _ => {
                return Err(DnsError::InvalidMessage("Reserved label type".into()));
            }
        }
    }

    buf.set_position(resume_at.unwrap_or(pos) as u64);
    Ok(labels.join("."))
}

/// Write a domain name without compression
fn write_domain_name<B: BufMut>(domain: &str, buf: &mut B) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if !domain.is_empty() {
        if domain.len() + 2 > MAX_NAME_LEN {
            return Err(DnsError::InvalidMessage(format!(
                "Domain name too long: {} bytes",
                domain.len()
            )));
        }

        for label in domain.split('.') {
            let bytes = label.as_bytes();
            if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
                return Err(DnsError::InvalidMessage(format!(
                    "Invalid label length {} in {:?}",
                    bytes.len(),
                    domain
                )));
            }
            buf.put_u8(bytes.len() as u8);
            buf.put_slice(bytes);
        }
    }

    buf.put_u8(0); // End of name
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_query_construction() {
        let msg = DnsMessage::new_query("0-payload.example.com.", RecordType::TXT);
        let bytes = msg.to_bytes().unwrap();

        assert_eq!(&bytes[0..2], &[0x00, 0x00]); // Transaction ID
        assert_eq!(&bytes[2..4], &[0x01, 0x00]); // RD only
        assert_eq!(&bytes[4..6], &[0x00, 0x01]); // QDCOUNT

        // QTYPE and QCLASS close out the question
        let tail = &bytes[bytes.len() - 4..];
        assert_eq!(tail, &[0x00, 0x10, 0x00, 0x01]);
    }

    #[test]
    fn test_message_roundtrip() {
        let mut msg = DnsMessage::new_query("0-f.example.com", RecordType::A);
        msg.header.id = 0x1234;
        msg.header.set_response(true);
        msg.header.set_authoritative(true);
        let body = RecordBody::A(Ipv4Addr::new(3, 1, 2, 3));
        msg.answers
            .push(DnsRecord::new("0-f.example.com", &body, CLASS_INET, 1800));

        let parsed = DnsMessage::parse(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.header.id, 0x1234);
        assert_eq!(parsed.header.ancount, 1);
        assert!(parsed.header.is_response());
        assert!(parsed.header.is_authoritative());
        assert!(parsed.header.recursion_desired());
        assert!(!parsed.header.recursion_available());
        assert_eq!(parsed.questions, msg.questions);
        assert_eq!(parsed.answers, msg.answers);
        assert_eq!(parsed.answers[0].rdata_text().unwrap(), "3.1.2.3");
    }

    #[test]
    fn test_rcode_accessors() {
        let mut header = DnsHeader::default();
        header.set_recursion_desired(true);
        header.set_rcode(ResponseCode::NX_DOMAIN);
        assert_eq!(header.rcode(), ResponseCode::NX_DOMAIN);
        assert!(header.recursion_desired());
        assert_eq!(header.rcode().to_string(), "NXDomain");

        header.set_rcode(ResponseCode::NO_ERROR);
        assert_eq!(header.flags, FLAG_RD);
        assert_eq!(ResponseCode(14).name(), "Unknown");
    }

    #[test]
    fn test_compressed_answer_name() {
        let mut bytes = DnsMessage::new_query("a.example.com", RecordType::A)
            .to_bytes()
            .unwrap();
        bytes[7] = 1; // ANCOUNT
        bytes.extend_from_slice(&[0xc0, 0x0c]); // Pointer to question name
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        bytes.extend_from_slice(&60u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x04, 3, 9, 8, 7]);

        let msg = DnsMessage::parse(&bytes).unwrap();
        assert_eq!(msg.answers[0].name, "a.example.com");
        assert_eq!(msg.answers[0].rdata_text().unwrap(), "3.9.8.7");
    }

    #[test]
    fn test_pointer_loop_rejected() {
        let mut bytes = vec![0u8; 12];
        bytes[5] = 1; // QDCOUNT
        bytes.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01]);
        assert!(DnsMessage::parse(&bytes).is_err());
    }

    #[test]
    fn test_truncated_messages_rejected() {
        assert!(DnsMessage::parse(&[0u8; 5]).is_err());

        let bytes = DnsMessage::new_query("a.example.com", RecordType::A)
            .to_bytes()
            .unwrap();
        assert!(DnsMessage::parse(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_txt_strings_concatenated() {
        let record = DnsRecord {
            name: "x".into(),
            rtype: RecordType::TXT,
            rclass: CLASS_INET,
            ttl: 0,
            rdata: vec![2, b'a', b'b', 0, 1, b'c'],
        };
        assert_eq!(record.txt_strings().unwrap().len(), 3);
        assert_eq!(record.rdata_text().unwrap(), "abc");

        let broken = DnsRecord {
            rdata: vec![5, b'a'],
            ..record
        };
        assert!(broken.rdata_text().is_err());
    }

    #[test]
    fn test_invalid_names_not_written() {
        let long = "a".repeat(64);
        assert!(DnsMessage::new_query(&long, RecordType::A).to_bytes().is_err());
        assert!(DnsMessage::new_query("a..b", RecordType::A).to_bytes().is_err());

        let root = DnsMessage::new_query(".", RecordType::A).to_bytes().unwrap();
        assert_eq!(root.len(), 12 + 1 + 4);
    }

    #[test]
    fn test_unpack_into_reuses_message() {
        let first = DnsMessage::new_query("one.example.com", RecordType::A);
        let second = DnsMessage::new_query("two.example.com", RecordType::TXT);

        let mut msg = DnsMessage::default();
        msg.unpack_into(&first.to_bytes().unwrap()).unwrap();
        msg.unpack_into(&second.to_bytes().unwrap()).unwrap();
        assert_eq!(msg.questions.len(), 1);
        assert_eq!(msg.questions[0].qname, "two.example.com");
        assert_eq!(msg.questions[0].qtype, RecordType::TXT);
    }
}
