//! Per-session result snapshots
//!
//! Holds the last normalized result of a parameterized execution per
//! session. Each execution overwrites the previous snapshot. A snapshot
//! untouched for longer than the session lifetime is dropped, matching the
//! max-age of the session cookie.

use crate::value::ResultSet;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

struct Snapshot {
    saved_at: Instant,
    result: ResultSet,
}

impl Snapshot {
    fn is_live(&self, ttl: Duration) -> bool {
        self.saved_at.elapsed() < ttl
    }
}

pub struct SessionStore {
    ttl: Duration,
    snapshots: RwLock<HashMap<Uuid, Snapshot>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Normalize and keep a result as the session's snapshot, evicting the
    /// snapshots of expired sessions
    pub async fn save(&self, session: Uuid, result: ResultSet) -> ResultSet {
        let result = result.normalized();
        let mut snapshots = self.snapshots.write().await;

        let before = snapshots.len();
        snapshots.retain(|_, snapshot| snapshot.is_live(self.ttl));
        if snapshots.len() < before {
            debug!("Evicted {} expired session snapshots", before - snapshots.len());
        }

        snapshots.insert(
            session,
            Snapshot {
                saved_at: Instant::now(),
                result: result.clone(),
            },
        );
        result
    }

    pub async fn get(&self, session: Uuid) -> Option<ResultSet> {
        self.snapshots
            .read()
            .await
            .get(&session)
            .filter(|snapshot| snapshot.is_live(self.ttl))
            .map(|snapshot| snapshot.result.clone())
    }
}
