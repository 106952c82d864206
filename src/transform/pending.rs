//! In-flight request registry.
//!
//! Maps a cache key to the shared future of the request currently computing
//! it. Each entry carries a sequence number so a finishing request only
//! removes its own entry, never one that superseded it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, Shared};

use crate::core::Timestamp;
use crate::error::TransformError;
use crate::graph::TransformResult;

pub type TransformOutcome = Result<Arc<TransformResult>, TransformError>;
pub type SharedTransform = Shared<BoxFuture<'static, TransformOutcome>>;

struct PendingRequest {
    seq: u64,
    timestamp: Timestamp,
    future: SharedTransform,
}

/// How a request was attached to the registry.
pub enum Joined {
    /// An existing, still valid request was reused.
    Existing(SharedTransform),
    /// A new request was registered (possibly replacing a stale one).
    Started(SharedTransform),
}

impl Joined {
    pub fn into_shared(self) -> SharedTransform {
        match self {
            Self::Existing(f) | Self::Started(f) => f,
        }
    }
}

#[derive(Default)]
pub struct PendingRegistry {
    entries: DashMap<String, PendingRequest>,
    next_seq: AtomicU64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the sequence number of a request about to start.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Join the pending request for `key`, or register a new one.
    ///
    /// An existing request is reused only if it started after the module's
    /// last invalidation (`None`: module unknown, always reusable). A stale
    /// entry is dropped from the registry without cancelling its work.
    pub fn join_or_start(
        &self,
        key: &str,
        last_invalidation: Option<Timestamp>,
        seq: u64,
        timestamp: Timestamp,
        start: impl FnOnce() -> SharedTransform,
    ) -> Joined {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let pending = entry.get();
                let fresh = last_invalidation.is_none_or(|inv| pending.timestamp > inv);
                if fresh {
                    return Joined::Existing(pending.future.clone());
                }
                crate::debug!("transform"; "abort stale request {}", key);
                let future = start();
                entry.insert(PendingRequest {
                    seq,
                    timestamp,
                    future: future.clone(),
                });
                Joined::Started(future)
            }
            Entry::Vacant(entry) => {
                let future = start();
                entry.insert(PendingRequest {
                    seq,
                    timestamp,
                    future: future.clone(),
                });
                Joined::Started(future)
            }
        }
    }

    /// Remove the entry for `key` if it still belongs to request `seq`.
    pub fn remove(&self, key: &str, seq: u64) -> bool {
        self.entries.remove_if(key, |_, pending| pending.seq == seq).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
