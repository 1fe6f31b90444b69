//! Request routing and response encoding

use crate::error::{BalancerError, ErrorKind};
use crate::ingest::{Batch, EventStore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }).to_string(),
        }
    }

    fn from_error(err: &BalancerError) -> Self {
        let status = match err.kind() {
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::Internal => 500,
        };
        Self::error(status, &err.to_string())
    }

    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            reason_phrase(self.status),
            self.body.len(),
            self.body
        )
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

/// `Content-Length` from a raw header block
pub fn content_length(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

#[derive(Deserialize)]
struct QueryBody {
    query: String,
}

/// Route one complete HTTP request
pub async fn handle_request(request: &str, store: Arc<dyn EventStore>) -> HttpResponse {
    let (head, body) = request.split_once("\r\n\r\n").unwrap_or((request, ""));
    let mut parts = head.lines().next().unwrap_or("").split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method, target),
        _ => return HttpResponse::error(400, "malformed request line"),
    };

    let path = target.split('?').next().unwrap_or(target);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    debug!(method, path, "routing request");

    match (method, path) {
        ("GET", "/api/health") => HttpResponse::ok(json!({ "status": "ok" }).to_string()),
        ("PUT", "/api/log") => ingest(body, store).await,
        ("POST", "/api/query") => query(body, store).await,
        ("GET", "/api/describe") => describe(store).await,
        _ => HttpResponse::error(404, &format!("Route not found: {} {}", method, path)),
    }
}

async fn ingest(body: &str, store: Arc<dyn EventStore>) -> HttpResponse {
    let batch: Batch = match serde_json::from_str(body) {
        Ok(batch) => batch,
        Err(e) => return HttpResponse::from_error(&BalancerError::Json(e)),
    };

    let result = tokio::task::spawn_blocking(move || store.ingest(&batch.family, &batch.schema, &batch.logs)).await;
    match result {
        Ok(Ok(())) => HttpResponse::ok("{}".to_string()),
        Ok(Err(e)) => {
            warn!(error = %e, "error ingesting logs");
            HttpResponse::from_error(&e)
        }
        Err(e) => HttpResponse::error(500, &format!("ingest task failed: {}", e)),
    }
}

async fn query(body: &str, store: Arc<dyn EventStore>) -> HttpResponse {
    let request: QueryBody = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => return HttpResponse::from_error(&BalancerError::Json(e)),
    };

    let result = tokio::task::spawn_blocking(move || store.query(&request.query)).await;
    match result {
        Ok(Ok(results)) => HttpResponse::ok(json!({ "results": results }).to_string()),
        Ok(Err(e)) => {
            warn!(error = %e, "error querying logs");
            HttpResponse::from_error(&e)
        }
        Err(e) => HttpResponse::error(500, &format!("query task failed: {}", e)),
    }
}

async fn describe(store: Arc<dyn EventStore>) -> HttpResponse {
    let result = tokio::task::spawn_blocking(move || store.describe()).await;
    match result {
        Ok(Ok(tables)) => HttpResponse::ok(json!({ "tables": tables }).to_string()),
        Ok(Err(e)) => {
            warn!(error = %e, "error describing logs");
            HttpResponse::from_error(&e)
        }
        Err(e) => HttpResponse::error(500, &format!("describe task failed: {}", e)),
    }
}
