//! HTTP Server
//!
//! Minimal HTTP/1.1 transport over tokio: one request per connection, JSON in
//! and out. The storage layer is synchronous, so every call into it runs on
//! the blocking pool.

pub mod http;

pub use http::{handle_request, HttpResponse};

use crate::error::Result;
use crate::ingest::EventStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind `address` and serve until the listener fails
pub async fn serve(address: &str, store: Arc<dyn EventStore>, max_body_bytes: usize) -> Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Starting HTTP server on {}", listener.local_addr()?);
    serve_listener(listener, store, max_body_bytes).await
}

/// Accept loop over an already bound listener
pub async fn serve_listener(listener: TcpListener, store: Arc<dyn EventStore>, max_body_bytes: usize) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!(%addr, "new connection");
        let store = Arc::clone(&store);
        let span = info_span!("request", id = %Uuid::new_v4(), %addr);
        tokio::spawn(handle_connection(stream, store, max_body_bytes).instrument(span));
    }
}

enum ReadOutcome {
    Complete(Vec<u8>),
    TooLarge,
    Closed,
}

async fn handle_connection(mut stream: TcpStream, store: Arc<dyn EventStore>, max_body_bytes: usize) {
    let response = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut stream, max_body_bytes)).await {
        Err(_) => {
            warn!("request read timeout");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to read request");
            return;
        }
        Ok(Ok(ReadOutcome::Closed)) => return,
        Ok(Ok(ReadOutcome::TooLarge)) => HttpResponse::error(413, "request body too large"),
        Ok(Ok(ReadOutcome::Complete(bytes))) => match String::from_utf8(bytes) {
            Ok(request) => handle_request(&request, store).await,
            Err(_) => HttpResponse::error(400, "request is not valid UTF-8"),
        },
    };

    if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
        warn!(error = %e, "failed to write response");
    }
    let _ = stream.shutdown().await;
}

/// Read until the headers and `Content-Length` bytes of body have arrived
async fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> std::io::Result<ReadOutcome> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buffer.is_empty() {
                ReadOutcome::Closed
            } else {
                ReadOutcome::Complete(buffer)
            });
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(headers_end) = find_header_end(&buffer) {
            let content_length = http::content_length(&String::from_utf8_lossy(&buffer[..headers_end])).unwrap_or(0);
            if content_length > max_body_bytes {
                return Ok(ReadOutcome::TooLarge);
            }
            if buffer.len() >= headers_end + content_length {
                return Ok(ReadOutcome::Complete(buffer));
            }
        } else if buffer.len() > max_body_bytes {
            return Ok(ReadOutcome::TooLarge);
        }
    }
}

/// Offset of the first body byte, if the header terminator has arrived
fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}
