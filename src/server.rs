//! File server answering chunk queries over UDP
//!
//! Every query name carries an offset and a file name.  The server reads
//! one record's worth of the file at that offset and answers with it, or
//! answers NXDOMAIN once the offset is past the end of the file.  Anything
//! else (malformed packets, unknown files, unsupported types, I/O
//! failures) gets no answer at all.

use crate::config::ServerConfig;
use crate::dns::{
    decode_name, encode_payload, DnsMessage, DnsQuestion, DnsRecord, ResponseCode, MAX_PAYLOAD,
};
use crate::pool::Pool;
use std::io::{self, ErrorKind, SeekFrom};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::UdpSocket;

/// Largest packet received or sent
pub const NET_BUF_SIZE: usize = 1024;

/// Pause after a temporary receive error
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Turns query packets into response packets
pub struct QueryHandler {
    dir: PathBuf,
    ttl: u32,
    messages: Arc<Pool<DnsMessage>>,
}

/// Outcome of reading one chunk
enum Chunk {
    Data(Vec<u8>),
    Eof,
}

impl QueryHandler {
    pub fn new(dir: impl Into<PathBuf>, ttl: u32) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            messages: Arc::new(Pool::messages()),
        }
    }

    /// Work out the response to `packet`, if it deserves one
    pub async fn handle_query(&self, packet: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        if packet.is_empty() {
            return None;
        }

        let mut msg = self.messages.get();
        if let Err(e) = msg.unpack_into(packet) {
            log::debug!("[{}] Error unpacking {} byte message: {}", peer, packet.len(), e);
            return None;
        }

        let Some(question) = msg.questions.first_mut() else {
            log::debug!("[{}] Got query with 0 questions", peer);
            return None;
        };
        question.qname = question.qname.to_lowercase();
        let question = question.clone();
        let q = format!("{}({})", question.qname, question.qtype);

        let (offset, name) = match decode_name(&question.qname) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("[{}] Badly-formatted query {}: {}", peer, q, e);
                return None;
            }
        };

        let Some(path) = sanitize(&self.dir, &name) else {
            log::warn!("[{}] Refusing file name {:?} in {}", peer, name, q);
            return None;
        };

        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                log::debug!("[{}] Error opening {} for {}: {}", peer, path.display(), q, e);
                return None;
            }
        };

        let chunk = match read_chunk(&mut file, offset, &question).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                log::debug!("[{}] Unsupported {} request for {}", peer, question.qtype, q);
                return None;
            }
            Err(e) => {
                log::warn!("[{}] Error reading {} for {}: {}", peer, path.display(), q, e);
                return None;
            }
        };

        // Answer with the question and nothing else
        msg.questions.truncate(1);
        msg.questions[0] = question.clone();
        msg.answers.clear();
        msg.authorities.clear();
        msg.additionals.clear();
        msg.header.set_response(true);
        msg.header.set_authoritative(true);
        msg.header.set_recursion_available(false);
        msg.header.set_rcode(ResponseCode::NO_ERROR);

        match chunk {
            Chunk::Eof => {
                log::info!("[{}] EOF at offset {} of {} for {}", peer, offset, path.display(), q);
                msg.header.set_rcode(ResponseCode::NX_DOMAIN);
            }
            Chunk::Data(data) => {
                let body = match encode_payload(&data, question.qtype) {
                    Ok(body) => body,
                    Err(e) => {
                        log::warn!("[{}] Error encoding answer to {}: {}", peer, q, e);
                        return None;
                    }
                };
                msg.answers.push(DnsRecord::new(
                    &question.qname,
                    &body,
                    question.qclass,
                    self.ttl,
                ));
                log::info!(
                    "[{}] Responded starting at offset {} of {} for {}",
                    peer,
                    offset,
                    path.display(),
                    q
                );
            }
        }

        match msg.to_bytes() {
            Ok(response) => Some(response),
            Err(e) => {
                log::warn!("[{}] Error packing response to {}: {}", peer, q, e);
                None
            }
        }
    }
}

/// Read the chunk at `offset` sized for the question's type
///
/// `Ok(None)` means the type cannot carry a payload.  The type is only
/// checked once the offset is known to be inside the file, so a query
/// of any type past the end still gets the end of file.
async fn read_chunk(
    file: &mut File,
    offset: u64,
    question: &DnsQuestion,
) -> io::Result<Option<Chunk>> {
    let meta = file.metadata().await?;
    if !meta.is_file() {
        return Err(io::Error::new(ErrorKind::Other, "not a regular file"));
    }
    if offset >= meta.len() {
        return Ok(Some(Chunk::Eof));
    }

    let Ok(capacity) = question.qtype.payload_capacity() else {
        return Ok(None);
    };

    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = [0u8; MAX_PAYLOAD];
    let mut n = 0;
    while n < capacity {
        match file.read(&mut buf[n..capacity]).await {
            Ok(0) => break,
            Ok(read) => n += read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }

    // The file shrank under us
    if n == 0 {
        return Ok(Some(Chunk::Eof));
    }

    Ok(Some(Chunk::Data(buf[..n].to_vec())))
}

/// Resolve `name` to a path under `dir`
///
/// The name is cleaned lexically.  Absolute names, names which climb out
/// of `dir` and names which clean to nothing are refused.
pub fn sanitize(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if clean.as_os_str().is_empty() {
        return None;
    }

    Some(dir.join(clean))
}

fn is_temporary(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
    )
}

/// UDP file server
#[derive(Clone)]
pub struct FileServer {
    socket: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
    buffers: Arc<Pool<Vec<u8>>>,
}

impl FileServer {
    /// Bind the listening socket
    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.listen).await?;

        Ok(Self {
            socket: Arc::new(socket),
            handler: Arc::new(QueryHandler::new(&config.dir, config.ttl)),
            buffers: Arc::new(Pool::buffers(NET_BUF_SIZE)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// See [`QueryHandler::handle_query`]
    pub async fn handle_query(&self, packet: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        self.handler.handle_query(packet, peer).await
    }

    /// Answer queries until a receive fails for good
    pub async fn serve(&self) -> io::Result<()> {
        log::info!("Listening for DNS queries on {}", self.local_addr()?);

        loop {
            let mut buf = self.buffers.get();
            let (n, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if is_temporary(&e) => {
                    log::warn!("Temporary receive error: {}", e);
                    tokio::time::sleep(RETRY_PAUSE).await;
                    continue;
                }
                Err(e) => {
                    log::error!("Receiving packet: {}", e);
                    return Err(e);
                }
            };

            if n == 0 {
                continue;
            }

            let server = self.clone();
            tokio::spawn(async move {
                let Some(response) = server.handle_query(&buf[..n], peer).await else {
                    return;
                };
                if let Err(e) = server.socket.send_to(&response, peer).await {
                    log::warn!("[{}] Error sending response: {}", peer, e);
                }
            });
        }
    }
}
