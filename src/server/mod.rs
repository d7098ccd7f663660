//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function. Connections are persistent (keep-alive) by default. A handler
//! still in flight when its client resets the connection is dropped,
//! cancelling any outbound call it was awaiting; a client that only
//! half-closes its write side still gets its response.

use std::future::{Future, pending};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Default cap on a buffered request (head + body): 8 MiB.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// The tutor's HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use zyvora::server::Server;
/// use zyvora::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:5000").await?;
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_size: usize,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        })
    }

    /// Overrides the largest request (head + body) the server will buffer.
    #[must_use]
    pub fn with_max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, dispatching each request to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, pending::<()>()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connections already being served keep running to completion on their
    /// own tasks; only the accept loop stops.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let max_request_size = self.max_request_size;
        info!(address = %self.local_addr, "zyvora listening");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!("shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(stream, peer_addr, handler, max_request_size).await
                {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Serves one TCP connection, one request at a time, until the peer closes
/// it or a response is sent with `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    max_request_size: usize,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut sent_continue = false;

    loop {
        // Pipelined bytes may already hold a full request; only read when they don't.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if buf.len() > max_request_size {
                    return reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large").await;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    return Ok(());
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                return reject(&mut stream, StatusCode::BadRequest, &format!("Bad Request: {e}")).await;
            }
        };

        if request.is_chunked() {
            warn!(peer = %peer_addr, "chunked request body, sending 411");
            return reject(&mut stream, StatusCode::LengthRequired, "Content-Length required").await;
        }

        let content_length = request.content_length().unwrap_or(0);
        let total_needed = match body_offset.checked_add(content_length) {
            Some(total) if total <= max_request_size => total,
            _ => {
                warn!(peer = %peer_addr, content_length, "request too large, sending 413");
                return reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large").await;
            }
        };

        if buf.len() < total_needed {
            if request.expects_continue() && !sent_continue {
                stream.write_all(CONTINUE).await?;
                sent_continue = true;
            }
            if stream.read_buf(&mut buf).await? == 0 {
                debug!(peer = %peer_addr, "connection closed mid-body");
                return Ok(());
            }
            continue;
        }
        sent_continue = false;

        let mut consumed = buf.split_to(total_needed);
        let body = consumed.split_off(body_offset).freeze();
        let request = request.with_body(body);
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request);
        tokio::pin!(response);

        // Keep reading while the handler runs so a reset connection drops the
        // in-flight handler. EOF is a half-close: the client still waits for
        // this response, but sends nothing further.
        let mut peer_finished = false;
        let response = loop {
            tokio::select! {
                response = &mut response => break response,
                read = stream.read_buf(&mut buf), if !peer_finished && buf.len() <= max_request_size => match read {
                    Ok(0) => {
                        debug!(peer = %peer_addr, "peer finished sending");
                        peer_finished = true;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        info!(peer = %peer_addr, error = %e, "client went away, abandoning request");
                        return Ok(());
                    }
                },
            }
        };

        let response = if keep_alive {
            response
        } else {
            response.keep_alive(false)
        };
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            return Ok(());
        }
    }
}

async fn reject(stream: &mut TcpStream, status: StatusCode, message: &str) -> Result<(), std::io::Error> {
    let response = Response::new(status).body(message.to_owned()).keep_alive(false);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}
