//! SSE transport
//!
//! `GET /sse` opens an event stream and starts a fresh server instance for
//! it. The first event is `endpoint`, whose data is the URL the client posts
//! messages to: `<base_url>/message?sessionId=<id>`. Each `POST /message`
//! body is one JSON-RPC message for that session; responses come back on the
//! event stream as `message` events.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use rmcp::{ServerHandler, ServiceExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

const PIPE_CAPACITY: usize = 64 * 1024;

type Inbox = Arc<tokio::sync::Mutex<DuplexStream>>;

struct AppState<S> {
    factory: Arc<dyn Fn() -> S + Send + Sync>,
    base_url: String,
    sessions: Arc<Mutex<HashMap<String, Inbox>>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            base_url: self.base_url.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl<S: ServerHandler> AppState<S> {
    fn new<F>(factory: F, base_url: impl Into<String>) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Removes a session once its event stream is dropped.
///
/// Dropping the inbox ends the server's input, which stops its task.
struct SessionGuard {
    id: String,
    sessions: Arc<Mutex<HashMap<String, Inbox>>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if lock(&self.sessions).remove(&self.id).is_some() {
            tracing::info!("SSE session {} disconnected", self.id);
        }
    }
}

/// Routes for the SSE transport
pub fn router<S, F>(factory: F, base_url: impl Into<String>) -> Router
where
    S: ServerHandler,
    F: Fn() -> S + Send + Sync + 'static,
{
    let state = AppState::new(factory, base_url);

    Router::new()
        .route("/sse", get(open_stream::<S>))
        .route("/message", post(post_message::<S>))
        .with_state(state)
}

/// Bind `port` on all interfaces and serve until Ctrl+C
pub async fn serve_sse<S, F>(factory: F, port: u16, base_url: String) -> anyhow::Result<()>
where
    S: ServerHandler,
    F: Fn() -> S + Send + Sync + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(
        "SSE server ready on {} (events: {}/sse, messages: {}/message)",
        addr,
        base_url,
        base_url
    );

    axum::serve(listener, router(factory, base_url))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("SSE server stopped");
    Ok(())
}

async fn open_stream<S: ServerHandler>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();

    // Client -> server requests and server -> client responses
    let (inbox, server_in) = tokio::io::duplex(PIPE_CAPACITY);
    let (server_out, outbox) = tokio::io::duplex(PIPE_CAPACITY);

    lock(&state.sessions).insert(session_id.clone(), Arc::new(tokio::sync::Mutex::new(inbox)));
    tracing::info!("SSE session {} opened", session_id);

    let server = (state.factory)();
    let sessions = state.sessions.clone();
    let id = session_id.clone();
    tokio::spawn(async move {
        match server.serve((server_in, server_out)).await {
            Ok(service) => {
                if let Err(e) = service.waiting().await {
                    tracing::warn!("SSE session {} ended with error: {}", id, e);
                }
            }
            Err(e) => tracing::warn!("SSE session {} failed to start: {}", id, e),
        }
        lock(&sessions).remove(&id);
        tracing::info!("SSE session {} closed", id);
    });

    let guard = SessionGuard {
        id: session_id.clone(),
        sessions: state.sessions.clone(),
    };
    let endpoint = format!("{}/message?sessionId={}", state.base_url, session_id);
    let events = stream::once(async move {
        Ok::<Event, Infallible>(Event::default().event("endpoint").data(endpoint))
    })
    .chain(messages(outbox, guard));

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

/// One `message` event per line the server writes. The stream owns the
/// session guard, so the session ends when the client goes away.
fn messages(
    outbox: DuplexStream,
    guard: SessionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let state = (BufReader::new(outbox).lines(), guard);
    stream::unfold(state, |(mut lines, guard)| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((
                Ok(Event::default().event("message").data(line)),
                (lines, guard),
            )),
            _ => None,
        }
    })
}

async fn post_message<S: ServerHandler>(
    State(state): State<AppState<S>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> StatusCode {
    let Some(inbox) = lock(&state.sessions).get(&query.session_id).cloned() else {
        return StatusCode::NOT_FOUND;
    };

    // Re-encode so the message is exactly one line on the pipe
    let message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Rejected malformed message for {}: {}", query.session_id, e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let mut line = message.to_string();
    line.push('\n');

    let mut inbox = inbox.lock().await;
    match inbox.write_all(line.as_bytes()).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::warn!("Session {} is gone: {}", query.session_id, e);
            StatusCode::GONE
        }
    }
}

fn lock(sessions: &Mutex<HashMap<String, Inbox>>) -> std::sync::MutexGuard<'_, HashMap<String, Inbox>> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
