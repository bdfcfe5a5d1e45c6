//! Registry of live probe sessions. One entry per probe id; registering a
//! duplicate id displaces and closes the previous session (last-writer-wins).

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

pub type SessionTx = mpsc::UnboundedSender<Message>;

/// A live, authenticated probe connection. The WebSocket sink is owned by
/// the session's writer task; the registry holds only the message sender.
#[derive(Clone)]
pub struct ProbeSession {
    pub id: String,
    pub region: String,
    /// Distinguishes this connection from a later one under the same id, so
    /// a displaced session's teardown cannot unregister its successor.
    pub conn: Uuid,
    tx: SessionTx,
    pub last_seen: Instant,
}

impl ProbeSession {
    pub fn new(id: String, region: String, tx: SessionTx) -> Self {
        Self {
            id,
            region,
            conn: Uuid::new_v4(),
            tx,
            last_seen: Instant::now(),
        }
    }

    pub fn send(&self, message: Message) -> Result<(), String> {
        self.tx
            .send(message)
            .map_err(|_| format!("Probe {} channel closed", self.id))
    }
}

fn sessions() -> &'static DashMap<String, ProbeSession> {
    static SESSIONS: OnceLock<DashMap<String, ProbeSession>> = OnceLock::new();
    SESSIONS.get_or_init(DashMap::new)
}

/// Inserts the session, displacing any existing entry for the same id. The
/// new entry is canonical the moment the insert lands; the displaced channel
/// is then told to close.
pub fn register(session: ProbeSession) {
    let id = session.id.clone();
    let region = session.region.clone();
    if let Some(old) = sessions().insert(session.id.clone(), session) {
        info!(
            "Probe {} reconnected ({:?} since last frame), closing previous session",
            old.id,
            old.last_seen.elapsed()
        );
        let _ = old.send(Message::Close(Some(CloseFrame {
            code: 1000,
            reason: "Replaced by new connection".into(),
        })));
    } else {
        info!("Probe {} registered (region {})", id, region);
    }
}

/// Removes the session only if it is still the same connection. Idempotent.
pub fn unregister(id: &str, conn: Uuid) -> bool {
    let removed = sessions().remove_if(id, |_, s| s.conn == conn).is_some();
    if removed {
        info!("Probe {} unregistered", id);
    }
    removed
}

pub fn get(id: &str) -> Option<ProbeSession> {
    sessions().get(id).map(|s| s.value().clone())
}

/// Sends a text frame to one probe's channel.
pub fn send_to(id: &str, text: String) -> Result<(), String> {
    match sessions().get(id) {
        Some(session) => session.send(Message::Text(text.into())),
        None => Err(format!("Probe {} not found", id)),
    }
}

pub fn touch(id: &str) {
    if let Some(mut session) = sessions().get_mut(id) {
        session.last_seen = Instant::now();
    }
}

/// A point-in-time copy of all sessions, taken before fan-out so no lock is
/// held across sends.
pub fn snapshot() -> Vec<ProbeSession> {
    sessions()
        .iter()
        .map(|entry| entry.value().clone())
        .collect()
}

pub fn count() -> usize {
    sessions().len()
}
