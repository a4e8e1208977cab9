use crate::session::state::{
    NewSession, Session, SessionConfig, SessionId, StoredMask, generate_session_id,
};
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Mask ID {mask_id} not found in session {session_id}")]
    MaskNotFound { session_id: SessionId, mask_id: u32 },
}

/// Session store: owns every live session and the reaper that expires them
///
/// Each table entry is an immutable `Arc<Session>` snapshot. Writers swap
/// whole entries under the write lock, so a reader holding a snapshot sees
/// either the table before or after a replacement, never a mix, and keeps
/// the image alive until it is done even if the session is deleted.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    config: SessionConfig,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            reaper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session owning `new.image` with an empty mask table
    pub async fn create(&self, new: NewSession) -> Arc<Session> {
        let session = Arc::new(Session::new(generate_session_id(), new));

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.id.clone(), Arc::clone(&session));
            gauge!("maskpaint_sessions_active").set(sessions.len() as f64);
        }
        counter!("maskpaint_sessions_created_total").increment(1);

        info!(
            "Created session {} for {} ({}x{})",
            session.id, session.filename, session.width, session.height
        );
        session
    }

    /// Current snapshot of a session
    pub async fn get(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Swap the session's whole mask table, numbering masks 0..n in input order
    pub async fn replace_masks(
        &self,
        session_id: &str,
        masks: Vec<StoredMask>,
    ) -> Result<Arc<Session>, SessionError> {
        let masks: Vec<StoredMask> = masks
            .into_iter()
            .enumerate()
            .map(|(id, mask)| StoredMask {
                id: id as u32,
                ..mask
            })
            .collect();
        let count = masks.len();

        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let updated = Arc::new(entry.with_masks(masks));
        *entry = Arc::clone(&updated);

        debug!("Session {} mask table replaced ({} masks)", session_id, count);
        Ok(updated)
    }

    /// Stored mask by id from the current table
    pub async fn get_mask(&self, session_id: &str, mask_id: u32) -> Result<StoredMask, SessionError> {
        let session = self.get(session_id).await?;
        session
            .mask(mask_id)
            .cloned()
            .ok_or_else(|| SessionError::MaskNotFound {
                session_id: session_id.to_string(),
                mask_id,
            })
    }

    /// Delete a session; unknown ids are an error
    pub async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        if self.remove(session_id).await {
            counter!("maskpaint_sessions_deleted_total").increment(1);
            info!("Deleted session: {}", session_id);
            Ok(())
        } else {
            Err(SessionError::NotFound(session_id.to_string()))
        }
    }

    /// Remove a session if present; returns whether it existed
    pub async fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(session_id).is_some();
        gauge!("maskpaint_sessions_active").set(sessions.len() as f64);
        removed
    }

    /// Remove every session older than the TTL; returns how many were removed
    pub async fn reap_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let mut sessions = self.sessions.write().await;

        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| session.age() > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            info!("Removing expired session: {}", id);
            sessions.remove(id);
            counter!("maskpaint_sessions_expired_total").increment(1);
        }
        gauge!("maskpaint_sessions_active").set(sessions.len() as f64);

        expired.len()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start the background reaper; a second call is a no-op
    ///
    /// The task holds only a weak reference, so dropping the last store
    /// handle also ends the reaper.
    pub fn start_reaper(self: &Arc<Self>) {
        let mut reaper = match self.reaper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if reaper.is_some() {
            warn!("Session reaper already running");
            return;
        }

        let period = self.config.reaper_interval;
        let store: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.reap_expired().await;
                if removed > 0 {
                    info!("Session reaper removed {} expired sessions", removed);
                }
            }
        });

        info!("Session reaper started (interval {:?})", period);
        *reaper = Some(handle);
    }

    /// Stop the background reaper if it is running
    pub fn stop_reaper(&self) {
        let mut reaper = match self.reaper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = reaper.take() {
            handle.abort();
            info!("Session reaper stopped");
        }
    }

    /// Shift a session's creation time into the past
    #[cfg(test)]
    pub(crate) async fn backdate(&self, session_id: &str, by: std::time::Duration) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            let mut aged = Session::clone(entry);
            aged.created_at = aged
                .created_at
                .checked_sub(by)
                .expect("backdate beyond monotonic clock origin");
            *entry = Arc::new(aged);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Ok(mut reaper) = self.reaper.lock()
            && let Some(handle) = reaper.take()
        {
            handle.abort();
        }
    }
}
