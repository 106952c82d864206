//! Coalesced manifest writes.
//!
//! A write request marks the manifest dirty and, if no timer is running,
//! starts one. Requests arriving while a timer or a write is pending are
//! merged into the next write. The file write itself is serialized and always
//! snapshots the manifest after taking the IO lock, so a later write never
//! lands an older snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::manifest::Manifest;
use crate::error::CacheError;
use crate::{debug, warn};

#[derive(Default)]
struct WriteState {
    /// Manifest changed since the last write.
    queued: bool,
    /// A timer task is alive.
    scheduled: bool,
}

struct WriterInner {
    path: PathBuf,
    debounce: Duration,
    manifest: Arc<RwLock<Manifest>>,
    state: Mutex<WriteState>,
    io: tokio::sync::Mutex<()>,
    writes: AtomicUsize,
}

#[derive(Clone)]
pub struct ManifestWriter {
    inner: Arc<WriterInner>,
}

impl ManifestWriter {
    pub fn new(path: PathBuf, manifest: Arc<RwLock<Manifest>>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                path,
                debounce,
                manifest,
                state: Mutex::new(WriteState::default()),
                io: tokio::sync::Mutex::new(()),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Request a manifest write. Must be called within a tokio runtime.
    pub fn queue(&self) {
        let mut state = self.inner.state.lock();
        state.queued = true;
        if state.scheduled {
            return;
        }
        state.scheduled = true;
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run().await });
    }

    /// Write the manifest now if a write is pending.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let pending = std::mem::take(&mut self.inner.state.lock().queued);
        if pending {
            self.inner.write_now().await?;
        }
        Ok(())
    }

    /// Number of completed writes.
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::Acquire)
    }
}

impl WriterInner {
    async fn run(&self) {
        loop {
            tokio::time::sleep(self.debounce).await;
            {
                let mut state = self.state.lock();
                if !state.queued {
                    state.scheduled = false;
                    return;
                }
                state.queued = false;
            }
            if let Err(e) = self.write_now().await {
                warn!("cache"; "failed to write manifest `{}`: {}", self.path.display(), e);
            }
        }
    }

    async fn write_now(&self) -> Result<(), CacheError> {
        let _io = self.io.lock().await;
        let json = self.manifest.read().to_json()?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| CacheError::io(&self.path, e))?;
        self.writes.fetch_add(1, Ordering::AcqRel);
        debug!("cache"; "manifest saved");
        Ok(())
    }
}
