//! HTTP POST transports for DNS over HTTPS
//!
//! A [`PostClient`] sends a request body to a URL and returns the response
//! body.  [`WrapPost`] turns any reqwest-style POST function into one,
//! enforcing a 2xx status and reading at most [`MAX_POST_BODY`] bytes of the
//! response; anything past that is silently dropped.

use super::{QueryError, Result};
use crate::pool::{Pool, Pooled};
use async_trait::async_trait;
use reqwest::header::HOST;
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;

/// Port used for domain-fronted TLS connections when none is given
pub const DEFAULT_DOH_PORT: u16 = 443;

/// Most bytes of a response body handed back by the clients in this module
pub const MAX_POST_BODY: usize = 65535;

/// Performs an HTTP POST and returns the response body
///
/// Implementations should fail on any non-2xx response, per RFC 8484
/// section 4.2.1.
#[async_trait]
pub trait PostClient: Send + Sync {
    async fn post(&self, url: &str, body: &[u8]) -> Result<Pooled<Vec<u8>>>;
}

/// Adapts a POST-shaped async function into a [`PostClient`]
///
/// The function gets the URL and request body and returns a
/// `reqwest::Response`.  No `Content-Type` is set on the request; callers
/// which need one can add it in the function.
pub struct WrapPost<F> {
    post: F,
    bodies: Arc<Pool<Vec<u8>>>,
}

impl<F> WrapPost<F> {
    pub fn new(post: F) -> Self {
        Self {
            post,
            bodies: Arc::new(Pool::buffers(MAX_POST_BODY)),
        }
    }
}

#[async_trait]
impl<F, Fut, E> PostClient for WrapPost<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<reqwest::Response, E>> + Send,
    E: Into<QueryError> + Send,
{
    async fn post(&self, url: &str, body: &[u8]) -> Result<Pooled<Vec<u8>>> {
        let mut res = (self.post)(url.to_string(), body.to_vec())
            .await
            .map_err(Into::into)?;

        let status = res.status();
        if !status.is_success() {
            return Err(QueryError::Status(status));
        }

        // Slurp the body, stopping at the buffer's end
        let mut buf = self.bodies.get();
        let mut n = 0;
        while n < buf.len() {
            let Some(chunk) = res.chunk().await? else {
                break;
            };
            let take = chunk.len().min(buf.len() - n);
            buf[n..n + take].copy_from_slice(&chunk[..take]);
            n += take;
        }
        buf.truncate(n);

        log::trace!("POST {} returned {} body bytes", url, n);
        Ok(buf)
    }
}

/// [`PostClient`] around a stock reqwest client
pub fn builtin_post() -> Result<impl PostClient> {
    let client = reqwest::Client::builder().build()?;

    Ok(WrapPost::new(move |url: String, body: Vec<u8>| {
        client.post(url).body(body).send()
    }))
}

/// [`PostClient`] which domain-fronts through `sni`
///
/// The TLS connection is made to `sni` (`host` or `host:port`, port
/// [`DEFAULT_DOH_PORT`] if absent) and uses it for SNI, while the HTTP
/// request names the host from the URL passed to `post`.
pub fn fronted_post(sni: &str) -> Result<impl PostClient> {
    let front = Arc::new(Front::parse(sni));
    log::debug!("Domain fronting via {}:{}", front.host, front.port);

    // Host headers are only honoured as the request authority over HTTP/1
    let client = reqwest::Client::builder().http1_only().build()?;

    Ok(WrapPost::new(move |url: String, body: Vec<u8>| {
        let client = client.clone();
        let front = Arc::clone(&front);
        async move {
            let (fronted, authority) = front.rewrite(&url)?;
            client
                .post(fronted)
                .header(HOST, authority)
                .body(body)
                .send()
                .await
                .map_err(QueryError::from)
        }
    }))
}

/// Where fronted connections actually go
#[derive(Debug, PartialEq, Eq)]
struct Front {
    host: String,
    port: u16,
}

impl Front {
    fn parse(sni: &str) -> Self {
        if let Some((host, port)) = sni.rsplit_once(':') {
            // Bare IPv6 addresses have colons but no port
            let bracketed = host.starts_with('[') && host.ends_with(']');
            if bracketed || !host.contains(':') {
                if let Ok(port) = port.parse::<u16>() {
                    return Self {
                        host: host.to_string(),
                        port,
                    };
                }
            }
        }

        let host = if sni.contains(':') && !sni.starts_with('[') {
            format!("[{}]", sni)
        } else {
            sni.to_string()
        };

        Self {
            host,
            port: DEFAULT_DOH_PORT,
        }
    }

    /// Point `url` at the front, returning it and the original authority
    fn rewrite(&self, url: &str) -> Result<(Url, String)> {
        let invalid = |why: String| QueryError::InvalidUrl(url.to_string(), why);

        let mut fronted = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let host = fronted
            .host_str()
            .ok_or_else(|| invalid("no host".to_string()))?;
        let authority = match fronted.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        fronted
            .set_host(Some(&self.host))
            .map_err(|e| invalid(e.to_string()))?;
        fronted
            .set_port(Some(self.port))
            .map_err(|_| invalid("cannot set port".to_string()))?;

        Ok((fronted, authority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// What the responder saw: lowercased request head and the body
    type Seen = (String, Vec<u8>);

    /// Answer a single HTTP/1.1 request with `status` and `body`
    async fn respond_once(
        status: &'static str,
        body: Vec<u8>,
    ) -> (SocketAddr, JoinHandle<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];

            let head_end = loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "request cut short");
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map_or(0, |v| v.trim().parse::<usize>().unwrap());
            while request.len() < head_end + length {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "request body cut short");
                request.extend_from_slice(&buf[..n]);
            }

            let reply = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.write_all(&body).await.unwrap();
            let _ = stream.shutdown().await;

            (head, request[head_end..].to_vec())
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn test_wrap_post_truncates_body() {
        let body: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let (addr, seen) = respond_once("200 OK", body.clone()).await;

        let client = reqwest::Client::new();
        let post = WrapPost::new(move |url: String, body: Vec<u8>| {
            client.post(url).body(body).send()
        });

        let url = format!("http://{}/dns-query", addr);
        let got = post.post(&url, b"query bytes").await.unwrap();
        assert_eq!(got.len(), MAX_POST_BODY);
        assert_eq!(&got[..], &body[..MAX_POST_BODY]);

        let (head, sent) = seen.await.unwrap();
        assert!(head.starts_with("post /dns-query "), "{}", head);
        assert_eq!(sent, b"query bytes");
    }

    #[tokio::test]
    async fn test_wrap_post_short_body() {
        let (addr, _seen) = respond_once("200 OK", b"tiny".to_vec()).await;

        let post = builtin_post().unwrap();
        let got = post.post(&format!("http://{}/", addr), b"q").await.unwrap();
        assert_eq!(&got[..], b"tiny");
    }

    #[tokio::test]
    async fn test_wrap_post_rejects_non_2xx() {
        let (addr, _seen) = respond_once("404 Not Found", b"nope".to_vec()).await;

        let post = builtin_post().unwrap();
        let err = post
            .post(&format!("http://{}/dns-query", addr), b"q")
            .await
            .unwrap_err();
        assert!(
            matches!(err, QueryError::Status(status) if status == reqwest::StatusCode::NOT_FOUND),
            "{}",
            err
        );
    }

    #[tokio::test]
    async fn test_fronted_post_sends_hidden_host() {
        let (addr, seen) = respond_once("200 OK", b"fronted".to_vec()).await;

        let post = fronted_post(&addr.to_string()).unwrap();
        let got = post
            .post("http://hidden.example:8080/dns-query", b"q")
            .await
            .unwrap();
        assert_eq!(&got[..], b"fronted");

        let (head, _) = seen.await.unwrap();
        assert!(head.starts_with("post /dns-query "), "{}", head);
        assert!(
            head.lines().any(|line| line == "host: hidden.example:8080"),
            "{}",
            head
        );
    }

    #[test]
    fn test_front_default_port() {
        assert_eq!(
            Front::parse("cdn.example.net"),
            Front {
                host: "cdn.example.net".into(),
                port: 443
            }
        );
        assert_eq!(Front::parse("cdn.example.net:8443").port, 8443);
        assert_eq!(Front::parse("[2001:db8::1]:853").host, "[2001:db8::1]");
        assert_eq!(
            Front::parse("2001:db8::1"),
            Front {
                host: "[2001:db8::1]".into(),
                port: 443
            }
        );
    }

    #[test]
    fn test_front_rewrite() {
        let front = Front::parse("cdn.example.net");
        let (url, authority) = front
            .rewrite("https://doh.hidden.example/dns-query")
            .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.net/dns-query");
        assert_eq!(authority, "doh.hidden.example");

        let front = Front::parse("cdn.example.net:8443");
        let (url, authority) = front
            .rewrite("https://doh.hidden.example:4443/q?x=1")
            .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.net:8443/q?x=1");
        assert_eq!(authority, "doh.hidden.example:4443");

        assert!(matches!(
            front.rewrite("not a url"),
            Err(QueryError::InvalidUrl(_, _))
        ));
    }
}
