//! Explicit per-camera session registry
//!
//! Owned by the composition root. Sessions are registered on create and
//! deregistered on close; there is no process-global table.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{CameraBackend, CameraId, SessionConfig};
use tracing::info;

use crate::error::{Result, SessionError};
use crate::session::CameraSession;

pub struct SessionRegistry {
    backend: Arc<dyn CameraBackend>,
    sessions: HashMap<CameraId, CameraSession>,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            sessions: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CameraBackend> {
        &self.backend
    }

    /// Register a new session; the id must not be in use.
    pub fn create(&mut self, config: SessionConfig) -> Result<&mut CameraSession> {
        let camera_id = config.camera_id.clone();
        if self.sessions.contains_key(&camera_id) {
            return Err(SessionError::DuplicateSession {
                camera_id: camera_id.to_string(),
            });
        }
        info!(camera_id = %camera_id, backend = self.backend.name(), "session registered");
        let session = CameraSession::new(config, Arc::clone(&self.backend));
        Ok(self.sessions.entry(camera_id).or_insert(session))
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraSession> {
        self.sessions.get(camera_id)
    }

    pub fn get_mut(&mut self, camera_id: &str) -> Option<&mut CameraSession> {
        self.sessions.get_mut(camera_id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<CameraId> {
        let mut ids: Vec<_> = self.sessions.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Tick every session.
    pub fn update_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.update();
        }
    }

    /// Close and deregister one session.
    pub fn close(&mut self, camera_id: &str) -> bool {
        match self.sessions.remove(camera_id) {
            Some(mut session) => {
                session.close();
                info!(camera_id, "session deregistered");
                true
            }
            None => false,
        }
    }

    pub fn close_all(&mut self) {
        for (camera_id, mut session) in self.sessions.drain() {
            session.close();
            info!(camera_id = %camera_id, "session deregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
