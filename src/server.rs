//! Transports: NDJSON over stdio and JSON-RPC over HTTP POST.

use crate::mcp::errors::{JSONRPC_INTERNAL_ERROR, UNEXPECTED_ERROR};
use crate::rpc::{Dispatcher, JsonRpcError, JsonRpcResponse};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("stdout writer stopped: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

/// Reads one request per line until stdin closes. Blank lines and
/// notifications produce no output.
pub async fn serve_stdio(dispatcher: Dispatcher) -> Result<(), ServerError> {
    tracing::info!("serving MCP over stdio");
    serve_lines(
        dispatcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;
    tracing::info!("stdin closed, stopping");
    Ok(())
}

/// NDJSON loop over any reader/writer pair. Each request runs in its own
/// task; a single writer task owns `writer`, so replies are whole lines in
/// completion order. Returns once the input ends and in-flight calls drain.
pub async fn serve_lines<R, W>(
    dispatcher: Dispatcher,
    reader: R,
    writer: W,
) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (replies, outbox) = mpsc::unbounded_channel();
    let writing = tokio::spawn(write_replies(outbox, writer));

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if replies.is_closed() {
            break;
        }
        let dispatcher = dispatcher.clone();
        let replies = replies.clone();
        tokio::spawn(async move {
            if let Some(response) = dispatcher.handle_str(&line).await {
                let _ = replies.send(response);
            }
        });
    }
    drop(replies);

    writing.await?
}

async fn write_replies<W>(
    mut outbox: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = outbox.recv().await {
        let mut serialized = serde_json::to_vec(&response)?;
        serialized.push(b'\n');
        writer.write_all(&serialized).await?;
        writer.flush().await?;
    }
    Ok(())
}

struct HttpState {
    dispatcher: Dispatcher,
    request_timeout: Option<Duration>,
}

pub fn router(dispatcher: Dispatcher, request_timeout: Option<Duration>) -> Router {
    let state = Arc::new(HttpState {
        dispatcher,
        request_timeout,
    });
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/mcp", post(handle_rpc))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve_http(
    dispatcher: Dispatcher,
    addr: SocketAddr,
    request_timeout: Option<Duration>,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(%addr, "serving MCP over HTTP");

    axum::serve(listener, router(dispatcher, request_timeout))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn handle_rpc(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let raw = String::from_utf8_lossy(&body);
    let handled = state.dispatcher.handle_str(&raw);
    let response = match state.request_timeout {
        Some(limit) => match tokio::time::timeout(limit, handled).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(timeout_secs = limit.as_secs(), "request timed out");
                Some(timed_out(&raw, limit))
            }
        },
        None => handled.await,
    };

    match response {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn timed_out(raw: &str, limit: Duration) -> JsonRpcResponse {
    let id = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|request| request.get("id").cloned())
        .unwrap_or(Value::Null);
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code: JSONRPC_INTERNAL_ERROR,
            message: format!("request timed out after {}s", limit.as_secs()),
            data: Some(json!({ "error_code": UNEXPECTED_ERROR })),
        }),
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
