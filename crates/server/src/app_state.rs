use std::{collections::HashMap, sync::Arc, time::Duration};

use shared::domain::SessionId;
use study::{SessionFactory, StudySession};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::info;

pub(crate) type SharedSession = Arc<Mutex<StudySession>>;

struct Tracked {
    session: SharedSession,
    last_seen: Instant,
}

/// Live participant sessions keyed by id. Each session has its own lock, so a
/// slow assistant call only blocks the participant who made it.
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Tracked>>>,
}

impl SessionRegistry {
    pub(crate) async fn insert(&self, session: StudySession) -> SharedSession {
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(
            id,
            Tracked {
                session: Arc::clone(&shared),
                last_seen: Instant::now(),
            },
        );
        shared
    }

    /// Looks up a session and marks it as active.
    pub(crate) async fn get(&self, id: SessionId) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let tracked = sessions.get_mut(&id)?;
        tracked.last_seen = Instant::now();
        Some(Arc::clone(&tracked.session))
    }

    pub(crate) async fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub(crate) async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops every session nobody has touched for longer than `max_idle`.
    /// Requests already holding a session keep it until they finish.
    pub(crate) async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, tracked| now.duration_since(tracked.last_seen) <= max_idle);
        before - sessions.len()
    }

    pub(crate) fn spawn_idle_sweep(&self, max_idle: Duration, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(max_idle).await;
                if evicted > 0 {
                    let active = registry.len().await;
                    info!(evicted, active, "evicted idle sessions");
                }
            }
        })
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) factory: SessionFactory,
    pub(crate) sessions: SessionRegistry,
}

impl AppState {
    pub(crate) fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            sessions: SessionRegistry::default(),
        }
    }
}

#[cfg(test)]
#[path = "tests/app_state_tests.rs"]
mod tests;
