//! Connection handlers for the sohbet relay.
//!
//! This module handles the WebSocket upgrade, the per-connection event
//! loop, and the shared server state. Each connection runs as one task;
//! tasks share only the registry and the store.

use crate::config::Config;
use crate::identity;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use sohbet_core::{
    ConnectionRegistry, MessageRouter, MessageStore, Outbound, PresenceBroadcaster, Session,
};
use sohbet_protocol::codec;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared server state.
pub struct AppState {
    /// Who is online.
    pub registry: Arc<ConnectionRegistry>,
    /// Durable message log.
    pub store: MessageStore,
    /// Presence and typing fan-out.
    pub presence: PresenceBroadcaster,
    /// Persist-then-deliver routing.
    pub router: MessageRouter,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state, opening the message store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub async fn new(config: Config) -> Result<Self> {
        let store = MessageStore::connect(&config.database.url).await?;
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = PresenceBroadcaster::new(Arc::clone(&registry));
        let router = MessageRouter::new(
            store.clone(),
            Arc::clone(&registry),
            config.display_offset(),
        );

        Ok(Self {
            registry,
            store,
            presence,
            router,
            config,
        })
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()).await?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            warn!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("sohbet relay listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
///
/// Refuses the upgrade outright when the handshake carries no verified
/// identity; an unauthenticated client never touches the registry.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(username) = identity::verified_username(&headers) else {
        debug!("refusing unauthenticated websocket upgrade");
        metrics::record_error("unauthenticated");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, username, state))
        .into_response()
}

/// Handle one authenticated WebSocket connection.
async fn handle_socket(socket: WebSocket, username: String, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut session = Session::connect(
        username.clone(),
        tx,
        Arc::clone(&state.registry),
        state.store.clone(),
        state.presence.clone(),
        state.router.clone(),
        state.config.history.replay_limit,
    );
    metrics::set_online_users(state.registry.len());

    if let Err(e) = session.bootstrap().await {
        warn!(user = %username, error = %e, "bootstrap failed");
        metrics::record_error("bootstrap");
        session.close();
        metrics::set_online_users(state.registry.len());
        return;
    }

    // Event loop: drain the outbound queue and the inbound stream.
    loop {
        tokio::select! {
            biased;

            // Outbound frames queued by the registry, router, or presence.
            Some(outbound) = rx.recv() => {
                match outbound {
                    Outbound::Frame(frame) => {
                        metrics::record_message(frame.len(), "outbound");
                        if sender.send(Message::Text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close => {
                        debug!(user = %username, "session superseded, closing transport");
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // Inbound frames from the client.
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        match codec::decode_client(&text) {
                            Ok(event) => session.handle_event(event).await,
                            Err(e) => {
                                // Malformed input is dropped; the connection stays up.
                                metrics::record_error("malformed");
                                debug!(user = %username, error = %e, "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(user = %username, "dropping binary frame on text protocol");
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(user = %username, "received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(user = %username, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(user = %username, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    session.close();
    metrics::set_online_users(state.registry.len());
}
