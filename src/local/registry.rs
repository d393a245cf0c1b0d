//! Surface Session Registry
//!
//! Maps each display surface to at most one PTY session. A surface gets a
//! new session only while it holds no running one; tearing a surface down
//! always kills its shell.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::local::priming::PrimingQueue;
use crate::local::pty::LaunchSpec;
use crate::local::session::{PtySession, SessionEvents, SessionInfo};
use crate::local::shell::{spawn_chain, Platform};

/// Identifier of a display surface (one window)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Shared handle to a registered session
pub type SessionHandle = Arc<PtySession>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} already has a live session")]
    SurfaceBusy(SurfaceId),

    #[error("No session for {0}")]
    NotFound(SurfaceId),
}

/// Registry of the session owned by each surface
pub struct SurfaceRegistry {
    sessions: RwLock<HashMap<SurfaceId, SessionHandle>>,
}

impl SurfaceRegistry {
    /// Create a new registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session for `surface`, falling back through the platform's
    /// shell chain.
    ///
    /// Rejected with [`RegistryError::SurfaceBusy`] while the surface holds a
    /// running session. An exited session, or one whose shell never spawned,
    /// is replaced.
    pub async fn create(
        &self,
        surface: SurfaceId,
        spec: LaunchSpec,
        priming: PrimingQueue,
    ) -> Result<(SessionHandle, SessionEvents), RegistryError> {
        let candidates = spawn_chain(Platform::current(), &spec.shell_path);
        self.create_with_candidates(surface, spec, candidates, priming)
            .await
    }

    /// Like [`SurfaceRegistry::create`] with an explicit candidate list
    pub async fn create_with_candidates(
        &self,
        surface: SurfaceId,
        spec: LaunchSpec,
        candidates: Vec<PathBuf>,
        priming: PrimingQueue,
    ) -> Result<(SessionHandle, SessionEvents), RegistryError> {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&surface) {
            if existing.is_running() {
                tracing::warn!(
                    "Refusing second session for {} (session {} is running)",
                    surface,
                    existing.id()
                );
                return Err(RegistryError::SurfaceBusy(surface));
            }
            tracing::debug!(
                "Replacing {:?} session {} of {}",
                existing.state(),
                existing.id(),
                surface
            );
            // Never blocks: the session is not running
            existing.kill();
            sessions.remove(&surface);
        }

        let (session, events) = PtySession::open_with_candidates(spec, candidates, priming).await;
        let session = Arc::new(session);
        sessions.insert(surface, session.clone());

        tracing::info!(
            "Created session {} for {}, total sessions: {}",
            session.id(),
            surface,
            sessions.len()
        );

        Ok((session, events))
    }

    /// Session currently owned by `surface`
    pub async fn get(&self, surface: SurfaceId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&surface).cloned()
    }

    /// Get session info
    pub async fn info(&self, surface: SurfaceId) -> Option<SessionInfo> {
        self.sessions.read().await.get(&surface).map(|s| s.info())
    }

    /// List all sessions
    pub async fn list(&self) -> Vec<(SurfaceId, SessionInfo)> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<_> = sessions.iter().map(|(id, s)| (*id, s.info())).collect();
        list.sort_by_key(|(id, _)| *id);
        list
    }

    /// Forward input to the surface's session; no-op without one
    pub async fn write(&self, surface: SurfaceId, data: &[u8]) {
        if let Some(session) = self.get(surface).await {
            session.write(data);
        }
    }

    /// Resize the surface's session; no-op without one
    pub async fn resize(&self, surface: SurfaceId, cols: u16, rows: u16) {
        if let Some(session) = self.get(surface).await {
            session.resize(cols, rows);
        }
    }

    /// Kill the surface's session (if alive) and forget it
    pub async fn destroy(&self, surface: SurfaceId) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&surface)
            .ok_or(RegistryError::NotFound(surface))?;

        tracing::info!("Destroying session {} of {}", session.id(), surface);
        kill_off_runtime(session).await;
        Ok(())
    }

    /// Drop the entry for `surface` if it is still `session_id` and that
    /// session has exited. Returns whether an entry was removed.
    pub async fn evict_exited(&self, surface: SurfaceId, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let matches = sessions
            .get(&surface)
            .map(|s| s.id() == session_id && s.is_exited())
            .unwrap_or(false);
        if matches {
            sessions.remove(&surface);
            tracing::debug!("Evicted exited session {} of {}", session_id, surface);
        }
        matches
    }

    /// Kill every session; used on host teardown
    pub async fn destroy_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (surface, session) in drained {
            tracing::info!("Closing session {} of {}", session.id(), surface);
            kill_off_runtime(session).await;
        }
    }

    /// Get the number of registered sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `kill()` blocks briefly while the child is reaped
async fn kill_off_runtime(session: SessionHandle) {
    let id = session.id().to_string();
    if let Err(e) = tokio::task::spawn_blocking(move || session.kill()).await {
        tracing::error!("Kill task for session {} failed: {}", id, e);
    }
}
