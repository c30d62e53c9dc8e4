//! HTTP/WebSocket server using Axum.

use crate::api;
use crate::client::ClientState;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::handshake::SubscriptionConfirmer;
use crate::hub::RealtimeHub;
use crate::ingress::{IngressConfig, NotificationIngress};
use crate::protocol::{ClientMessage, ErrorData, LatestData, PongData, ServerMessage};
use crate::subscription::{device_room, validate_device_id, FIRE_ALERTS_ROOM};
use crate::webhook;
use alerts::{AlertHistory, Classifier, ClassifierPolicy};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use sensor_store::SharedStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::interval;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Interval between server keepalive pings.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Connections silent for longer than this are dropped.
const IDLE_TIMEOUT_MS: i64 = 90_000;

/// Shared application state.
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    pub ingress: Arc<NotificationIngress>,
    pub history: Arc<AlertHistory>,
    pub store: SharedStore,
    pub client_channel_buffer: usize,
    pub debug_errors: bool,
}

impl AppState {
    /// Wire the pipeline components from configuration.
    pub fn new(config: &GatewayConfig, store: SharedStore) -> Result<Self> {
        let history = Arc::new(AlertHistory::new(config.history_capacity));
        let hub = Arc::new(RealtimeHub::new());
        let confirmer = Arc::new(SubscriptionConfirmer::new(config.confirmation_timeout)?);
        let classifier = Classifier::new(ClassifierPolicy {
            fallback_location: config.fallback_location,
        });
        let ingress = Arc::new(NotificationIngress::new(
            classifier,
            history.clone(),
            Some(hub.clone()),
            confirmer,
            IngressConfig {
                emergency_keyword: config.emergency_keyword.clone(),
            },
        ));

        Ok(Self {
            hub,
            ingress,
            history,
            store,
            client_channel_buffer: config.client_channel_buffer,
            debug_errors: config.debug_errors,
        })
    }
}

/// Create the full HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .merge(api::routes())
        .merge(webhook::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Split the socket into sender and receiver
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Bounded channel for outgoing messages
    let (tx, mut rx) = mpsc::channel::<Message>(state.client_channel_buffer);

    // Registers the client and queues the welcome frame
    let client = state.hub.connect(tx);
    let client_id = client.id;

    counter!("gateway_connections_total").increment(1);
    gauge!("gateway_active_connections").set(state.hub.client_count() as f64);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut ping_interval = interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(msg)) => {
                        client.touch();
                        if let Err(e) = handle_message(&state, &client, msg).await {
                            warn!("Error handling message from {}: {}", client_id, e);
                            let code = match e {
                                GatewayError::Json(_) => "INVALID_MESSAGE",
                                _ => "PROCESSING_ERROR",
                            };
                            let _ = client.send(&ServerMessage::Error(ErrorData {
                                message: e.to_string(),
                                code: code.to_string(),
                            }));
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if client.idle_ms() > IDLE_TIMEOUT_MS {
                    warn!("Dropping idle client {}", client_id);
                    break;
                }
                if let Err(TrySendError::Closed(_)) = client.tx.try_send(Message::Ping(Bytes::new())) {
                    break;
                }
            }
        }
    }

    // Cleanup
    state.hub.disconnect(&client_id);
    send_task.abort();

    counter!("gateway_disconnections_total").increment(1);
    gauge!("gateway_active_connections").set(state.hub.client_count() as f64);
}

/// Handle a single WebSocket frame.
async fn handle_message(state: &AppState, client: &Arc<ClientState>, msg: Message) -> Result<()> {
    let client_msg: ClientMessage = match msg {
        Message::Text(text) => serde_json::from_str(text.as_str())?,
        Message::Binary(data) => serde_json::from_slice(&data)?,
        // Pongs to pings are sent by the transport itself.
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => return Ok(()),
    };
    handle_client_message(state, client, client_msg).await
}

/// Handle a parsed client message.
async fn handle_client_message(
    state: &AppState,
    client: &Arc<ClientState>,
    msg: ClientMessage,
) -> Result<()> {
    match msg {
        ClientMessage::SubscribeDevice(device_id) => {
            check_device_id(&device_id)?;
            state.hub.join(&client.id, &device_room(&device_id))?;
            counter!("gateway_room_joins_total").increment(1);
            Ok(())
        }
        ClientMessage::UnsubscribeDevice(device_id) => {
            check_device_id(&device_id)?;
            state.hub.leave(&client.id, &device_room(&device_id))
        }
        ClientMessage::SubscribeFireAlerts => {
            state.hub.join(&client.id, FIRE_ALERTS_ROOM)?;
            counter!("gateway_room_joins_total").increment(1);
            Ok(())
        }
        ClientMessage::UnsubscribeFireAlerts => state.hub.leave(&client.id, FIRE_ALERTS_ROOM),
        ClientMessage::RequestLatest(device_id) => {
            check_device_id(&device_id)?;
            debug!("Client {} requested latest for {}", client.id, device_id);
            match state.store.get_latest_record(Some(&device_id)).await {
                Ok(record) => client.send(&ServerMessage::LatestData(LatestData {
                    device_id,
                    record,
                })),
                Err(e) => {
                    error!("Failed to fetch latest data for {}: {}", device_id, e);
                    client.send(&ServerMessage::Error(ErrorData {
                        message: "Failed to fetch latest data".to_string(),
                        code: "STORE_ERROR".to_string(),
                    }))
                }
            }
        }
        ClientMessage::Ping => client.send(&ServerMessage::Pong(PongData::now())),
    }
}

fn check_device_id(device_id: &str) -> Result<()> {
    match validate_device_id(device_id) {
        Some(reason) => Err(GatewayError::InvalidRoom(reason)),
        None => Ok(()),
    }
}

/// Log the listening address and endpoint list.
pub fn log_endpoints(addr: &std::net::SocketAddr) {
    info!("Gateway listening on {}", addr);
    info!("Available endpoints:");
    info!("  GET  /ws                          - WebSocket stream");
    info!("  POST /sns/webhook                 - Notification webhook");
    info!("  POST /webhook/fire-alert          - Notification webhook (alias)");
    info!("  GET|POST /sns/test                - Trigger a test alert");
    info!("  GET  /api/devices                 - Known devices");
    info!("  GET  /api/devices/{{id}}/latest     - Latest reading");
    info!("  GET  /api/devices/{{id}}/data       - Reading history");
    info!("  GET  /api/analytics               - Analytics summary");
    info!("  GET  /api/alerts/recent           - Recent alerts");
    info!("  GET  /api/alerts/stats            - Alert statistics");
    info!("  GET  /api/realtime/stats          - Connected clients and rooms");
}
