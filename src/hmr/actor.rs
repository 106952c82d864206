//! HMR Actor
//!
//! Drains the file-change feed, coalesces bursts and hands settled changes
//! to the [`HmrEngine`] strictly one at a time.
//!
//! ```text
//! FileChange feed → Debouncer (pure timing) → HmrEngine → payload channels
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::debounce::Debouncer;
use super::engine::HmrEngine;
use super::event::FileChange;

pub struct HmrActor {
    rx: mpsc::Receiver<FileChange>,
    engine: Arc<HmrEngine>,
    debouncer: Debouncer,
}

impl HmrActor {
    pub fn new(rx: mpsc::Receiver<FileChange>, engine: Arc<HmrEngine>, window: Duration) -> Self {
        Self {
            rx,
            engine,
            debouncer: Debouncer::new(window),
        }
    }

    /// Run the actor event loop until the feed closes.
    ///
    /// Changes still pending when the feed closes are handled before exit.
    pub async fn run(self) {
        let Self {
            mut rx,
            engine,
            mut debouncer,
        } = self;

        loop {
            tokio::select! {
                biased;
                change = rx.recv() => match change {
                    Some(change) => debouncer.add(change),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if let Some(changes) = debouncer.take_if_ready() {
                        dispatch(&engine, changes).await;
                    }
                }
            }
        }

        if let Some(changes) = debouncer.take_all() {
            dispatch(&engine, changes).await;
        }
        crate::debug!("hmr"; "file-change feed closed");
    }
}

async fn dispatch(engine: &HmrEngine, changes: Vec<FileChange>) {
    for change in changes {
        engine.handle_file_change(&change).await;
    }
}
