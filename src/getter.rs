//! Streaming file retrieval
//!
//! A [`Getter`] describes one transfer: which file, through which domain,
//! carried in which record type.  [`Getter::get`] starts a background task
//! which walks the file one record at a time and feeds the decoded bytes
//! into a [`TransferStream`].  The file ends when a query comes back
//! NXDOMAIN.
//!
//! Queries are strictly sequential; the channel between the task and the
//! reader holds one chunk, so a slow reader throttles the queries.

use crate::dns::{decode_payload, encode_name, DnsError, RecordType, MAX_PAYLOAD};
use crate::querier::{QueryError, Querier, SystemQuerier};
use bytes::{Buf, Bytes};
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Why a transfer stopped early
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("creating system querier: {0}")]
    Querier(#[source] QueryError),

    #[error("computing query name: {0}")]
    Name(#[source] DnsError),

    #[error("querying for {name}: {source}")]
    Query {
        name: String,
        #[source]
        source: QueryError,
    },

    #[error("empty response for {0}")]
    EmptyResponse(String),

    #[error("decoding response {answer:?} to {name}: {source}")]
    Decode {
        name: String,
        answer: String,
        #[source]
        source: DnsError,
    },
}

impl From<TransferError> for io::Error {
    fn from(e: TransferError) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

#[derive(Debug)]
struct TransferCursor {
    offset: u64,
    /// Bytes still wanted, if bounded
    remaining: Option<u64>,
}

/// One file transfer
pub struct Getter {
    rtype: RecordType,
    name: String,
    domain: String,
    querier: Option<Arc<dyn Querier>>,
    cursor: Mutex<TransferCursor>,
}

impl Getter {
    /// Describe a transfer of `name` from under `domain`
    ///
    /// The file name is lowercased, as DNS may change its case in transit.
    pub fn new(rtype: RecordType, name: &str, domain: &str) -> Self {
        Self {
            rtype,
            name: name.to_lowercase(),
            domain: domain.to_string(),
            querier: None,
            cursor: Mutex::new(TransferCursor {
                offset: 0,
                remaining: None,
            }),
        }
    }

    /// Start reading at `offset` rather than at the beginning of the file
    pub fn start_offset(self, offset: u64) -> Self {
        self.lock_cursor().offset = offset;
        self
    }

    /// Stop after `max` bytes; 0 means read to the end of the file
    pub fn max_bytes(self, max: u64) -> Self {
        self.lock_cursor().remaining = (max > 0).then_some(max);
        self
    }

    /// Resolve through `querier` instead of the system resolver
    pub fn querier(mut self, querier: Arc<dyn Querier>) -> Self {
        self.querier = Some(querier);
        self
    }

    pub fn record_type(&self) -> RecordType {
        self.rtype
    }

    /// Offset of the next chunk to be requested
    pub fn offset(&self) -> u64 {
        self.lock_cursor().offset
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, TransferCursor> {
        // The cursor holds plain integers; a poisoned lock leaves them usable
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn limit_reached(&self) -> bool {
        self.lock_cursor().remaining == Some(0)
    }

    /// Charge `n` decoded bytes against the limit, returning how many of
    /// them to hand on
    fn consume(&self, n: usize) -> usize {
        match self.lock_cursor().remaining.as_mut() {
            Some(remaining) => {
                let n = usize::try_from(*remaining).map_or(n, |r| n.min(r));
                *remaining -= n as u64;
                n
            }
            None => n,
        }
    }

    /// Query name for the next chunk, advancing the offset past it
    ///
    /// Fails without touching the offset if the record type cannot carry
    /// a payload or the offset would run past `u64::MAX`.
    pub fn next_name(&self) -> Result<String, DnsError> {
        let capacity = self.rtype.payload_capacity()?;

        let mut cursor = self.lock_cursor();
        let next = cursor
            .offset
            .checked_add(capacity as u64)
            .ok_or(DnsError::OffsetOverflow {
                offset: cursor.offset,
                step: capacity,
            })?;
        let name = encode_name(cursor.offset, &self.name, &self.domain);
        cursor.offset = next;
        Ok(name)
    }

    /// Decode one answer into `buf`, returning the number of bytes written
    pub fn decode_response(&self, buf: &mut [u8], answer: &str) -> Result<usize, DnsError> {
        decode_payload(answer, self.rtype, buf)
    }

    /// Start the transfer
    ///
    /// Must be called within a tokio runtime.  The transfer runs until the
    /// file ends, the byte limit is reached, an error occurs or the returned
    /// stream is closed or dropped.
    pub fn get(self) -> TransferStream {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            if let Err(e) = self.transfer(&tx).await {
                log::debug!("Transfer of {} stopped: {}", self.name, e);
                let _ = tx.send(Err(e.into())).await;
            }
        });

        TransferStream {
            rx,
            pending: Bytes::new(),
            done: false,
        }
    }

    async fn transfer(
        &self,
        tx: &mpsc::Sender<io::Result<Bytes>>,
    ) -> Result<(), TransferError> {
        let querier = match &self.querier {
            Some(querier) => Arc::clone(querier),
            None => Arc::new(SystemQuerier::from_system_conf().map_err(TransferError::Querier)?),
        };

        let mut buf = [0u8; MAX_PAYLOAD];

        loop {
            if self.limit_reached() {
                log::debug!("Transfer of {} reached its limit", self.name);
                return Ok(());
            }

            let name = self.next_name().map_err(TransferError::Name)?;

            let answers = match querier.resolve(&name, self.rtype).await {
                Ok(answers) => answers,
                Err(e) if e.is_not_found() => {
                    log::debug!("End of {} at {}", self.name, name);
                    return Ok(());
                }
                Err(source) => return Err(TransferError::Query { name, source }),
            };

            let Some(answer) = answers.first() else {
                return Err(TransferError::EmptyResponse(name));
            };

            let n = self
                .decode_response(&mut buf, answer)
                .map_err(|source| TransferError::Decode {
                    name: name.clone(),
                    answer: answer.clone(),
                    source,
                })?;

            let n = self.consume(n);

            log::trace!("{} -> {} bytes", name, n);

            if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                log::debug!("Reader of {} went away", self.name);
                return Ok(());
            }
        }
    }
}

/// Reading half of a transfer
///
/// Readable as a byte stream through [`AsyncRead`] or chunk by chunk as a
/// [`Stream`].  A clean end of file ends the stream; a failed transfer
/// yields one error and then ends.
pub struct TransferStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    pending: Bytes,
    done: bool,
}

impl TransferStream {
    /// Stop the transfer; no further queries are made once the task
    /// notices
    pub fn close(&mut self) {
        self.rx.close();
        self.pending.clear();
        self.done = true;
    }
}

impl Stream for TransferStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if !this.pending.is_empty() {
            return Poll::Ready(Some(Ok(std::mem::take(&mut this.pending))));
        }
        if this.done {
            return Poll::Ready(None);
        }

        let item = ready!(this.rx.poll_recv(cx));
        if item.is_none() {
            this.done = true;
        }
        Poll::Ready(item)
    }
}

impl AsyncRead for TransferStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.advance(n);
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => this.done = true,
            }
        }
    }
}
