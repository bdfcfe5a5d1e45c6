//! Shared-secret credentials for probe authentication, loaded from a flat
//! `{"probe-id": "secret"}` JSON file and hot-reloaded on change.
//!
//! The whole map is swapped atomically on each reload; auth checks always
//! observe one fully-formed state. A missing or unparsable file swaps in an
//! empty map, denying all probes until a valid file appears.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

type SecretMap = Arc<HashMap<String, String>>;

static SECRETS: OnceLock<RwLock<SecretMap>> = OnceLock::new();

fn store() -> &'static RwLock<SecretMap> {
    SECRETS.get_or_init(|| RwLock::new(Arc::new(HashMap::new())))
}

/// The current credential map. Callers get a snapshot and never hold the
/// lock across I/O.
pub async fn snapshot() -> SecretMap {
    store().read().await.clone()
}

async fn swap(map: HashMap<String, String>) {
    *store().write().await = Arc::new(map);
}

fn parse(text: &str) -> Result<HashMap<String, String>, String> {
    serde_json::from_str(text).map_err(|e| e.to_string())
}

async fn reload(path: &Path) {
    let loaded = match tokio::fs::read_to_string(path).await {
        Ok(text) => parse(&text),
        Err(e) => Err(e.to_string()),
    };

    match loaded {
        Ok(map) => {
            info!(
                "Loaded {} probe credential(s) from {}",
                map.len(),
                path.display()
            );
            swap(map).await;
        }
        Err(e) => {
            warn!(
                "Credentials file {} unusable ({}); denying all probe auth",
                path.display(),
                e
            );
            swap(HashMap::new()).await;
        }
    }
}

async fn mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
}

/// Performs the initial load, then polls the file's modification time every
/// second and reloads on change.
pub async fn start_watcher(path: PathBuf) {
    reload(&path).await;

    tokio::spawn(async move {
        let mut ticker = interval(POLL_INTERVAL);
        let mut last_mtime = mtime(&path).await;
        loop {
            ticker.tick().await;
            let current = mtime(&path).await;
            if current != last_mtime {
                last_mtime = current;
                reload(&path).await;
            }
        }
    });
}

/// Constant-time string comparison for secret checks.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_secret_map() {
        let map = parse(r#"{"alpha":"s3cret","beta":"hunter2"}"#).unwrap();
        assert_eq!(map.get("alpha").map(String::as_str), Some("s3cret"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(parse("[]").is_err());
        assert!(parse("not json").is_err());
        assert!(parse(r#"{"alpha": 42}"#).is_err());
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secrex"));
        assert!(!constant_time_eq("short", "longer"));
        assert!(constant_time_eq("", ""));
    }

    // The swap flow mutates the process-wide store, so it lives in a single
    // test to avoid interleaving with itself.
    #[tokio::test]
    async fn swap_replaces_whole_map() {
        let mut map = HashMap::new();
        map.insert("cred-test-alpha".to_string(), "topsecret".to_string());
        map.insert("cred-test-beta".to_string(), "other".to_string());
        swap(map).await;

        let before = snapshot().await;
        assert_eq!(before.len(), 2);

        let mut replacement = HashMap::new();
        replacement.insert("cred-test-gamma".to_string(), "fresh".to_string());
        swap(replacement).await;

        // The old snapshot is untouched; the store holds only the new state
        assert!(before.contains_key("cred-test-alpha"));
        let after = snapshot().await;
        assert_eq!(after.len(), 1);
        assert!(after.contains_key("cred-test-gamma"));
        assert!(!after.contains_key("cred-test-alpha"));
    }
}
