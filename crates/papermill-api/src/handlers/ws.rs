//! WebSocket progress streaming.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use papermill_core::error::AppError;
use papermill_core::events::ProgressEvent;
use papermill_core::types::JobId;

use crate::error::ApiError;
use crate::state::AppState;

/// Optional job filter on the stream.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// Follow only this job; its stream ends with the terminal event.
    pub job: Option<String>,
}

/// GET /ws — upgrade and stream progress events as JSON text frames.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let events = match &query.job {
        Some(raw) => {
            let job_id: JobId = raw
                .parse()
                .map_err(|_| AppError::validation(format!("Invalid job id: {raw}")))?;
            state.bus.subscribe_job(&job_id)
        }
        None => state.bus.subscribe(),
    };
    Ok(ws.on_upgrade(move |socket| forward_events(socket, events)))
}

/// Forward bus events to the socket until either side ends.
///
/// A lagging client skips ahead rather than stalling publishers; a per-job
/// subscription ends cleanly when the bus closes the job's channel.
async fn forward_events(socket: WebSocket, mut events: broadcast::Receiver<ProgressEvent>) {
    let (mut outbound, mut inbound) = socket.split();
    debug!("WebSocket progress stream opened");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize progress event");
                            continue;
                        }
                    };
                    if outbound.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = inbound.next() => match msg {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = outbound.close().await;
    debug!("WebSocket progress stream closed");
}
