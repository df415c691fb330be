//! HTTP surface of the room server: root redirect, WebSocket signaling and a
//! room membership lookup.

pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::identity::{Directory, NameResolver, StaticDirectory};
use crate::protocol::ServerMessage;
use crate::room::{ParticipantInfo, RoomRegistryHandle};
use crate::types::{PeerId, RoomId, SessionId};
use session::SignalingSession;

#[derive(Clone)]
pub struct AppState {
    registry: RoomRegistryHandle,
    resolver: NameResolver,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(registry: RoomRegistryHandle, resolver: NameResolver) -> Self {
        Self {
            registry,
            resolver,
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let directory: Arc<dyn Directory> = match &config.directory_path {
            Some(path) => Arc::new(StaticDirectory::from_file(path)?),
            None => Arc::new(StaticDirectory::default()),
        };
        let resolver = NameResolver::new(
            directory,
            config.name_lookup_timeout,
            config.default_name.clone(),
        );
        Ok(Self::new(RoomRegistryHandle::spawn(), resolver))
    }

    pub fn registry(&self) -> &RoomRegistryHandle {
        &self.registry
    }

    fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(redirect_to_new_room))
        .route("/ws", get(ws_handler))
        .route("/rooms/:room", get(room_summary))
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!("server running on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn redirect_to_new_room() -> Redirect {
    Redirect::to(&format!("/{}", RoomId::generate()))
}

#[derive(Debug, Serialize)]
struct MemberView {
    peer_id: PeerId,
    name: String,
    joined_at_ms: u64,
}

#[derive(Debug, Serialize)]
struct RoomSummary {
    room_id: RoomId,
    participants: Vec<MemberView>,
}

async fn room_summary(
    Path(room): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let room_id = RoomId::new(room);
    match state.registry.members(room_id.clone()).await {
        Ok(members) => {
            let participants = members
                .into_iter()
                .map(|ParticipantInfo { peer_id, name, joined_at_ms, .. }| MemberView {
                    peer_id,
                    name,
                    joined_at_ms,
                })
                .collect();
            Json(RoomSummary {
                room_id,
                participants,
            })
            .into_response()
        }
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = state.next_session_id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    tracing::debug!("{}: connected", session_id);

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!("{}: cannot encode {:?}: {}", session_id, msg, err);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut session = SignalingSession::new(
        session_id,
        state.registry.clone(),
        state.resolver.clone(),
        outbox,
    );

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!("{}: transport error: {}", session_id, err);
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                if let Err(err) = session.handle_text(&text).await {
                    tracing::error!("{}: {}", session_id, err);
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Clean close and abrupt loss take the same path.
    if let Err(err) = session.close().await {
        tracing::error!("{}: leave failed: {}", session_id, err);
    }
    drop(session);
    let _ = writer.await;
    tracing::debug!("{}: disconnected", session_id);
}
