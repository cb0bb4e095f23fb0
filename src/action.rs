//! Pending sync actions and their observable progress.

use crate::manifest::ManagedFileRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Fetch the server's copy of the file
    Update,
    /// Local copy already matches the manifest
    Ignore,
}

/// One unit of pending work against a single managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub target: ManagedFileRef,
    pub kind: ActionKind,
}

impl ActionEntry {
    pub fn update(target: ManagedFileRef) -> Self {
        Self {
            target,
            kind: ActionKind::Update,
        }
    }

    pub fn ignore(target: ManagedFileRef) -> Self {
        Self {
            target,
            kind: ActionKind::Ignore,
        }
    }

    pub fn needs_transfer(&self) -> bool {
        self.kind == ActionKind::Update
    }
}

/// Progress of one in-flight [`ActionEntry`].
///
/// `progress` reads [`ActionProgress::UNSTARTED`] until the first chunk
/// arrives, then a fraction in `[0.0, 1.0]`. Once `complete` is set the value
/// is pinned at `1.0` and the struct no longer changes.
#[derive(Debug, Clone)]
pub struct ActionProgress {
    progress: f64,
    path: String,
    complete: bool,
    entry: ActionEntry,
}

impl ActionProgress {
    /// Sentinel for "size known, nothing received yet".
    pub const UNSTARTED: f64 = -1.0;

    pub fn new(entry: ActionEntry) -> Self {
        Self {
            progress: Self::UNSTARTED,
            path: entry.target.path().to_string(),
            complete: false,
            entry,
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_started(&self) -> bool {
        self.progress >= 0.0
    }

    pub fn entry(&self) -> &ActionEntry {
        &self.entry
    }

    pub fn set_progress(&mut self, fraction: f64) {
        debug_assert!(!self.complete, "progress update after completion");
        if self.complete {
            return;
        }
        self.progress = fraction.clamp(0.0, 1.0);
    }

    pub fn mark_complete(&mut self) {
        debug_assert!(!self.complete, "action completed twice");
        self.progress = 1.0;
        self.complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ActionEntry {
        ActionEntry::update(ManagedFileRef::new("mods/foo.jar").unwrap())
    }

    #[test]
    fn test_new_progress_is_unstarted() {
        let progress = ActionProgress::new(entry());
        assert_eq!(progress.progress(), ActionProgress::UNSTARTED);
        assert!(!progress.is_started());
        assert!(!progress.is_complete());
        assert_eq!(progress.path(), "mods/foo.jar");
    }

    #[test]
    fn test_set_progress_clamps() {
        let mut progress = ActionProgress::new(entry());
        progress.set_progress(0.25);
        assert!(progress.is_started());
        assert_eq!(progress.progress(), 0.25);
        progress.set_progress(1.5);
        assert_eq!(progress.progress(), 1.0);
    }

    #[test]
    fn test_mark_complete_pins_progress() {
        let mut progress = ActionProgress::new(entry());
        progress.mark_complete();
        assert!(progress.is_complete());
        assert_eq!(progress.progress(), 1.0);
    }

    #[test]
    fn test_needs_transfer() {
        assert!(entry().needs_transfer());
        let skip = ActionEntry::ignore(ManagedFileRef::new("mods/foo.jar").unwrap());
        assert!(!skip.needs_transfer());
    }
}
