use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use funil_core::RealtimeEvent;
use funil_engine::Engine;
use funil_waha::{normalize, WahaWebhookEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    /// Fan-out channel for operator real-time events.
    events: broadcast::Sender<RealtimeEvent>,
}

/// The gateway HTTP + WebSocket server.
///
/// Bridges the WhatsApp provider and the dashboard to the engine via:
/// - `POST /webhook/waha` — inbound provider events
/// - `GET /ws` — operator real-time event stream
/// - `GET /health` — health check
pub struct GatewayServer {
    engine: Arc<Engine>,
    events: broadcast::Sender<RealtimeEvent>,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(
        engine: Arc<Engine>,
        events: broadcast::Sender<RealtimeEvent>,
        host: &str,
        port: u16,
    ) -> Self {
        Self {
            engine,
            events,
            host: host.to_string(),
            port,
        }
    }

    /// Start the server. Spawns a background task and returns its handle.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let state = AppState {
            engine: self.engine,
            events: self.events,
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/webhook/waha", post(handle_webhook))
            .route("/ws", get(ws_upgrade))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let addr = format!("{}:{}", self.host, self.port);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Gateway failed to bind {}: {}", addr, e);
                    return;
                }
            };
            tracing::info!("Gateway listening on {}", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Gateway server error: {}", e);
            }
        })
    }
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// POST /webhook/waha — provider events.
///
/// Always acknowledged with 200: unknown event types are ignored and
/// malformed payloads are dropped, both without triggering provider
/// retries. Engine failures are logged, never propagated to the
/// provider.
async fn handle_webhook(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let event: WahaWebhookEvent = match serde_json::from_value(body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("dropping malformed webhook envelope: {}", e);
            return StatusCode::OK;
        }
    };
    match normalize(event) {
        Ok(Some(inbound)) => {
            if let Err(e) = state.engine.handle_inbound(inbound).await {
                tracing::error!("inbound processing failed: {:#}", e);
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("dropping malformed webhook payload: {}", e);
        }
    }
    StatusCode::OK
}

/// GET /ws — operator real-time stream.
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Forward broadcast events to the socket as JSON until either side
/// closes. Inbound frames are ignored except Close.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = state.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("failed to encode realtime event: {}", e);
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("ws subscriber lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
