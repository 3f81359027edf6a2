//! The last-piece cache: the fast path that collapses a burst of small
//! consecutive edits into a single piece/change instead of allocating one
//! of each per keystroke.
//!
//! Grounded on `PieceChain.c`'s `cache_put`/`cache_insert`/`cache_delete`.
//! The cache holds at most one piece id: the piece created by the most
//! recent *slow-path* edit. It is only eligible for extension while that
//! piece's bytes still end exactly at the tail of the tail heap block — the
//! moment any other edit lands elsewhere, or `commit` runs, the cache is
//! cleared.

use log::trace;

use crate::piece::PieceId;

#[derive(Debug, Default)]
pub(crate) struct Cache {
    piece: Option<PieceId>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Cache { piece: None }
    }

    pub(crate) fn get(&self) -> Option<PieceId> {
        self.piece
    }

    pub(crate) fn set(&mut self, piece: PieceId) {
        trace!("cache now points at a freshly created piece");
        self.piece = Some(piece);
    }

    /// Invalidated by `commit`, matching `cache_put(file, NULL)`.
    pub(crate) fn invalidate(&mut self) {
        if self.piece.take().is_some() {
            trace!("cache invalidated");
        }
    }

    /// Is `piece` the current cache occupant?
    pub(crate) fn is(&self, piece: PieceId) -> bool {
        self.piece == Some(piece)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::intrusive::Id;

    #[test]
    fn set_then_is_matches_only_that_piece() {
        let mut cache = Cache::new();
        let a = Id::for_test(1);
        let b = Id::for_test(2);
        cache.set(a);
        assert!(cache.is(a));
        assert!(!cache.is(b));
    }

    #[test]
    fn invalidate_clears() {
        let mut cache = Cache::new();
        let a = Id::for_test(1);
        cache.set(a);
        cache.invalidate();
        assert!(!cache.is(a));
        assert_eq!(cache.get(), None);
    }
}
