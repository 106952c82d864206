use std::path::PathBuf;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::event::{ChangeKind, FileChange};

/// Pure debouncer: only handles timing and event deduplication.
pub(super) struct Debouncer {
    window: Duration,
    /// Path → ChangeKind (dedup is free via HashMap key uniqueness)
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    pub(super) last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(window: Duration) -> Self {
        Self {
            window,
            changes: FxHashMap::default(),
            last_event: None,
        }
    }

    /// Add a change, applying dedup rules:
    /// - Remove + Create/Modify → Create/Modify (file was restored)
    /// - Modify + Remove → Remove (file was deleted)
    /// - Create + Remove → nothing (file never mattered)
    /// - otherwise the first event wins
    pub(super) fn add(&mut self, change: FileChange) {
        let FileChange { path, kind } = change;
        self.last_event = Some(Instant::now());

        let Some(&existing) = self.changes.get(&path) else {
            crate::debug!("hmr"; "event {}: {}", kind.label(), path.display());
            self.changes.insert(path, kind);
            return;
        };

        match (existing, kind) {
            (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                crate::debug!("hmr"; "restore removed->{}: {}", kind.label(), path.display());
                self.changes.insert(path, kind);
            }
            (ChangeKind::Modified, ChangeKind::Removed) => {
                crate::debug!("hmr"; "upgrade modified->removed: {}", path.display());
                self.changes.insert(path, ChangeKind::Removed);
            }
            (ChangeKind::Created, ChangeKind::Removed) => {
                crate::debug!("hmr"; "discard created+removed: {}", path.display());
                self.changes.remove(&path);
            }
            _ => {}
        }
    }

    /// Take pending changes once the window has elapsed, sorted by path.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<FileChange>> {
        if !self.is_ready() {
            return None;
        }
        self.take_all()
    }

    /// Take pending changes regardless of timing.
    pub(super) fn take_all(&mut self) -> Option<Vec<FileChange>> {
        self.last_event = None;
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return None;
        }
        let mut changes: Vec<_> = changes
            .into_iter()
            .map(|(path, kind)| FileChange { path, kind })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        last_event.elapsed() >= self.window && !self.changes.is_empty()
    }

    /// Precise sleep duration until next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };
        self.window
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, kind: ChangeKind) -> FileChange {
        FileChange::new(path, kind)
    }

    #[test]
    fn test_debouncer_empty() {
        let debouncer = Debouncer::new(Duration::ZERO);
        assert!(!debouncer.is_ready());
        assert_eq!(debouncer.sleep_duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_state_transitions() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        debouncer.add(change("/a.ts", ChangeKind::Removed));
        debouncer.add(change("/a.ts", ChangeKind::Created));
        debouncer.add(change("/b.ts", ChangeKind::Modified));
        debouncer.add(change("/b.ts", ChangeKind::Removed));
        debouncer.add(change("/c.ts", ChangeKind::Created));
        debouncer.add(change("/c.ts", ChangeKind::Removed));
        debouncer.add(change("/d.ts", ChangeKind::Created));
        debouncer.add(change("/d.ts", ChangeKind::Modified));

        let changes = debouncer.take_if_ready().unwrap();
        assert_eq!(
            changes,
            vec![
                change("/a.ts", ChangeKind::Created),
                change("/b.ts", ChangeKind::Removed),
                change("/d.ts", ChangeKind::Created),
            ]
        );
        assert!(debouncer.take_if_ready().is_none());
    }

    #[test]
    fn test_window_delays_readiness() {
        let mut debouncer = Debouncer::new(Duration::from_secs(60));
        debouncer.add(change("/a.ts", ChangeKind::Modified));
        assert!(!debouncer.is_ready());
        assert!(debouncer.take_if_ready().is_none());
        assert!(debouncer.sleep_duration() > Duration::from_secs(50));
        assert_eq!(debouncer.take_all().unwrap().len(), 1);
    }
}
