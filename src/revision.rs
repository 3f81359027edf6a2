//! Revision history: grouped undo/redo over the change log.
//!
//! Grounded on `PieceChain.c`'s `Revision`/`revision_*` functions. The
//! original threads revisions through the same intrusive list as
//! everything else; since revisions are only ever appended or truncated
//! from the tail (never spliced mid-list), a plain `Vec` does the same job
//! without needing the arena machinery in `intrusive.rs`.

use crate::span::Change;

/// One committed edit group: every [`Change`] applied between two
/// `commit()` calls, undone or redone as a unit.
#[derive(Debug, Clone, Default)]
pub(crate) struct Revision {
    pub(crate) changes: Vec<Change>,
}

impl Revision {
    fn new() -> Self {
        Revision {
            changes: Vec::new(),
        }
    }
}

/// The append-only log of committed revisions, plus the changes staged for
/// the revision currently being built (see `chain.rs`'s `commit`).
///
/// `cursor` points one past the most recently applied revision: undo moves
/// it back, redo moves it forward. Committing a new revision while `cursor`
/// is behind the end discards everything after it — the original's
/// `revision_purge`, applied here whenever a fresh edit follows an undo.
#[derive(Debug, Default)]
pub(crate) struct RevisionLog {
    revisions: Vec<Revision>,
    cursor: usize,
}

impl RevisionLog {
    pub(crate) fn new() -> Self {
        RevisionLog {
            revisions: Vec::new(),
            cursor: 0,
        }
    }

    pub(crate) fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub(crate) fn can_redo(&self) -> bool {
        self.cursor < self.revisions.len()
    }

    /// Appends `revision` as the new head, purging any redo history beyond
    /// the current cursor first. No-op if `revision` has no changes.
    pub(crate) fn push(&mut self, revision: Revision) {
        if revision.changes.is_empty() {
            return;
        }
        self.revisions.truncate(self.cursor);
        self.revisions.push(revision);
        self.cursor = self.revisions.len();
    }

    /// Moves the cursor back one revision and returns its changes in
    /// reverse-application order (last change first), each already
    /// inverted so the caller can feed them straight to `span_swap`.
    pub(crate) fn undo(&mut self) -> Option<Vec<Change>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        let changes = self.revisions[self.cursor]
            .changes
            .iter()
            .rev()
            .map(Change::inverted)
            .collect();
        Some(changes)
    }

    /// Moves the cursor forward one revision and returns its changes in
    /// original application order.
    pub(crate) fn redo(&mut self) -> Option<Vec<Change>> {
        if !self.can_redo() {
            return None;
        }
        let changes = self.revisions[self.cursor].changes.clone();
        self.cursor += 1;
        Some(changes)
    }

    /// The number of revisions fully applied right now; used as the
    /// "revision id" callers can compare against to learn whether anything
    /// changed since a checkpoint.
    pub(crate) fn position(&self) -> u64 {
        self.cursor as u64
    }

    /// Removes and returns every revision beyond the cursor, i.e. the redo
    /// history a fresh edit is about to invalidate. The pieces referenced by
    /// their replacement spans are the caller's responsibility to free
    /// (`chain.rs`'s redo-history purge).
    pub(crate) fn drain_redo(&mut self) -> Vec<Revision> {
        self.revisions.split_off(self.cursor)
    }
}

/// Accumulates the changes of a revision still being built, between
/// `begin` and the next `commit`.
#[derive(Debug, Default)]
pub(crate) struct PendingRevision {
    changes: Vec<Change>,
}

impl PendingRevision {
    pub(crate) fn new() -> Self {
        PendingRevision {
            changes: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The change most recently pushed, if any — the cache fast path
    /// patches its `replacement.len` in place instead of recording a new
    /// change (matching `cache_insert`/`cache_delete` mutating
    /// `list_last(&file->pending_changes, Change, list)` directly).
    pub(crate) fn last_mut(&mut self) -> Option<&mut Change> {
        self.changes.last_mut()
    }

    /// Drains the pending changes into a new [`Revision`], ready to push
    /// onto the log.
    pub(crate) fn take(&mut self) -> Revision {
        Revision {
            changes: std::mem::take(&mut self.changes),
        }
    }
}
