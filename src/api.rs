use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::minecraft::common::ServerStatus;
use crate::minecraft::Protocol;
use crate::probes::dispatcher::{self, TaskResult};
use crate::probes::registry::{self, ProbeSession};
use crate::probes::credentials;
use crate::status::{self, DistributedResponse};

const CLOSE_UNAUTHORIZED: u16 = 4001;
const CLOSE_MISSING_PARAMS: u16 = 4002;

#[derive(Deserialize, Default)]
pub struct StatusParams {
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn protocol_param(params: &StatusParams) -> ApiResult<Protocol> {
    params
        .kind
        .as_deref()
        .and_then(Protocol::from_param)
        .ok_or(ApiError::MissingType)
}

// API handlers

pub async fn server_status(
    Path(server): Path<String>,
    Query(params): Query<StatusParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Json<ServerStatus>> {
    let protocol = protocol_param(&params)?;
    debug!(
        "Status request from {} for {} ({})",
        addr.ip(),
        server,
        protocol.as_str()
    );

    match tokio::spawn(async move { status::direct_status(&server, protocol).await }).await {
        Ok(status) => Ok(Json(status)),
        Err(_) => Err(ApiError::Internal),
    }
}

pub async fn distributed_status(
    Path(server): Path<String>,
    Query(params): Query<StatusParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Json<DistributedResponse>> {
    let protocol = protocol_param(&params)?;
    debug!(
        "Distributed request from {} for {} ({})",
        addr.ip(),
        server,
        protocol.as_str()
    );

    match tokio::spawn(async move { status::distributed_status(&server, protocol).await }).await {
        Ok(result) => result.map(Json),
        Err(_) => Err(ApiError::Internal),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "probes": registry::count(),
    }))
}

pub async fn banner() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "mcprobe",
        "version": env!("CARGO_PKG_VERSION"),
        "usage": "GET /v1/status/{server}?type=java|bedrock for a direct probe, GET /v1/distributed/{server}?type=... to fan out to every probe node",
        "endpoints": [
            "/v1/status/{server}",
            "/v1/distributed/{server}",
            "/v1/stream",
            "/health"
        ]
    }))
}

// Probe streaming endpoint

#[derive(Deserialize, Default)]
pub struct StreamParams {
    id: Option<String>,
    region: Option<String>,
}

#[derive(Debug)]
struct Refusal {
    code: u16,
    reason: &'static str,
}

fn authorize(
    params: &StreamParams,
    auth_header: Option<&str>,
    secrets: &HashMap<String, String>,
) -> Result<(String, String), Refusal> {
    let (id, region) = match (params.id.as_deref(), params.region.as_deref()) {
        (Some(id), Some(region)) if !id.is_empty() && !region.is_empty() => (id, region),
        _ => {
            return Err(Refusal {
                code: CLOSE_MISSING_PARAMS,
                reason: "Missing id or region",
            })
        }
    };

    let unauthorized = Refusal {
        code: CLOSE_UNAUTHORIZED,
        reason: "Unauthorized",
    };

    let Some(secret) = auth_header.and_then(|v| v.strip_prefix("Bearer ")) else {
        return Err(unauthorized);
    };
    let Some(expected) = secrets.get(id) else {
        return Err(unauthorized);
    };
    if !credentials::constant_time_eq(expected, secret) {
        return Err(unauthorized);
    }

    Ok((id.to_string(), region.to_string()))
}

pub async fn stream(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Response {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let secrets = credentials::snapshot().await;
    let verdict = authorize(&params, auth_header.as_deref(), &secrets);

    ws.on_upgrade(move |socket| probe_session(socket, verdict))
}

/// Runs one probe connection: refusals get a close code, accepted probes are
/// registered and their frames fed to the dispatcher until the socket ends.
async fn probe_session(mut socket: WebSocket, verdict: Result<(String, String), Refusal>) {
    let (id, region) = match verdict {
        Ok(identity) => identity,
        Err(refusal) => {
            warn!("Probe connection refused: {}", refusal.reason);
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: refusal.code,
                    reason: refusal.reason.into(),
                })))
                .await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = ProbeSession::new(id.clone(), region, tx);
    let conn = session.conn;
    registry::register(session);

    let (mut sink, mut source) = socket.split();

    // Writer task: the only owner of the sink, so dispatcher writes are
    // serialized and never interleave mid-frame
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_probe_frame(&id, text.as_str()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    registry::unregister(&id, conn);
    writer.abort();
    info!("Probe {} disconnected", id);
}

fn handle_probe_frame(probe_id: &str, text: &str) {
    registry::touch(probe_id);

    match serde_json::from_str::<TaskResult>(text) {
        Ok(result) if !result.id.is_empty() => dispatcher::handle_reply(result),
        Ok(_) => warn!("Probe {} sent a result without a task id", probe_id),
        Err(e) => warn!("Probe {} sent a malformed frame: {}", probe_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: Option<&str>, region: Option<&str>) -> StreamParams {
        StreamParams {
            id: id.map(str::to_string),
            region: region.map(str::to_string),
        }
    }

    fn secrets() -> HashMap<String, String> {
        HashMap::from([("alpha".to_string(), "s3cret".to_string())])
    }

    #[test]
    fn missing_id_or_region_closes_4002() {
        for p in [
            params(None, None),
            params(Some("alpha"), None),
            params(None, Some("us-west")),
            params(Some(""), Some("us-west")),
        ] {
            let err = authorize(&p, Some("Bearer s3cret"), &secrets()).unwrap_err();
            assert_eq!(err.code, CLOSE_MISSING_PARAMS);
        }
    }

    #[test]
    fn bad_credentials_close_4001() {
        let p = params(Some("alpha"), Some("us-west"));
        for header in [None, Some("s3cret"), Some("Basic s3cret"), Some("Bearer wrong")] {
            let err = authorize(&p, header, &secrets()).unwrap_err();
            assert_eq!(err.code, CLOSE_UNAUTHORIZED);
        }

        let unknown = params(Some("beta"), Some("us-west"));
        let err = authorize(&unknown, Some("Bearer s3cret"), &secrets()).unwrap_err();
        assert_eq!(err.code, CLOSE_UNAUTHORIZED);
    }

    #[test]
    fn valid_credentials_accepted() {
        let p = params(Some("alpha"), Some("us-west"));
        let (id, region) = authorize(&p, Some("Bearer s3cret"), &secrets()).unwrap();
        assert_eq!(id, "alpha");
        assert_eq!(region, "us-west");
    }

    #[test]
    fn missing_type_param_rejected() {
        assert!(protocol_param(&StatusParams { kind: None }).is_err());
        assert!(protocol_param(&StatusParams {
            kind: Some("quic".to_string())
        })
        .is_err());
        assert!(protocol_param(&StatusParams {
            kind: Some("java".to_string())
        })
        .is_ok());
    }
}
