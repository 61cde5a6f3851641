// Browser session pool: bounded, scoped checkouts with teardown on drop.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::page::{FetchFailure, FetchFailureKind};

/// Hands out browser sessions. With `max_sessions = 1` there is a single,
/// exclusively owned session per run and adapters take turns.
#[derive(Clone)]
pub struct BrowserPool {
    semaphore: Arc<Semaphore>,
    open: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    with_profile: bool,
}

impl BrowserPool {
    /// `with_profile` gives each session its own throwaway browser profile
    /// directory (needed for local Chrome, not for remote backends).
    pub fn new(max_sessions: usize, with_profile: bool) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_sessions.max(1))),
            open: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
            with_profile,
        }
    }

    /// Wait for a free slot and open a session. The session is released when
    /// the returned guard drops, on every exit path.
    pub async fn checkout(&self, url: &str) -> Result<BrowserSession, FetchFailure> {
        let permit = self.semaphore.clone().acquire_owned().await.map_err(|_| {
            FetchFailure::new(FetchFailureKind::RenderUnavailable, url, "browser pool closed")
        })?;

        let profile = if self.with_profile {
            Some(tempfile::tempdir().map_err(|e| {
                FetchFailure::new(
                    FetchFailureKind::RenderUnavailable,
                    url,
                    format!("failed to create browser profile dir: {e}"),
                )
            })?)
        } else {
            None
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.open.fetch_add(1, Ordering::SeqCst);
        debug!(session = id, "Browser session opened");

        Ok(BrowserSession {
            id,
            profile,
            open: self.open.clone(),
            _permit: permit,
        })
    }

    /// Sessions currently checked out.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Permanently refuse new checkouts; waiters get `RenderUnavailable`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

pub struct BrowserSession {
    id: u64,
    profile: Option<TempDir>,
    open: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl BrowserSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn profile_dir(&self) -> Option<&std::path::Path> {
        self.profile.as_ref().map(|p| p.path())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // TempDir removes the profile directory when dropped right after this.
        self.open.fetch_sub(1, Ordering::SeqCst);
        debug!(session = self.id, "Browser session closed");
    }
}
