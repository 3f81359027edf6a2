//! Pieces: immutable `(block, offset, length)` descriptors, and the arena
//! that threads them into the currently active chain.
//!
//! Grounded on `PieceChain.c`'s `Piece`/`piece_alloc`/`piece_free`/
//! `piece_find`/`span_swap`, with `sanedit-buffer`'s `Piece` (in
//! `piece_tree/tree/piece.rs`) as the shape reference for the descriptor
//! itself (`kind`/`pos`/`len` there map to `block`/`pos`/`len` here).

use crate::block::BlockId;
use crate::error::{Error, Result};
use crate::intrusive::{Chain, Id};
use crate::span::Span;

pub(crate) type PieceId = Id;

/// An immutable byte-range descriptor: `len` bytes starting at `pos` inside
/// block `block`. A piece's own `prev`/`next` chain links (stored in the
/// arena, not here) are set once when the piece is created and are never
/// mutated again except when this exact piece is chosen as a span endpoint
/// once more — which is what makes undo correct: the pointers are still
/// valid when a piece is reattached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Piece {
    pub(crate) block: BlockId,
    pub(crate) pos: u64,
    pub(crate) len: u64,
}

impl Piece {
    pub(crate) fn new(block: BlockId, pos: u64, len: u64) -> Self {
        Piece { block, pos, len }
    }
}

/// A placeholder occupying the chain's sentinel slot. Never read through the
/// public API; only `prev`/`next` on the sentinel id are meaningful.
const SENTINEL_PIECE: Piece = Piece {
    block: BlockId::ZERO,
    pos: 0,
    len: 0,
};

impl BlockId {
    /// Used only to give the sentinel piece a valid-looking but never
    /// dereferenced block id.
    pub(crate) const ZERO: BlockId = BlockId::new(0);
}

/// The arena backing the currently active piece chain, plus every piece
/// still reachable from a retained revision but currently unlinked from the
/// active chain. Mirrors `file->all_pieces` (for teardown) and `file->pieces`
/// (the active chain) at once: everything in the arena *is* "all pieces",
/// and the chain links encode which of them are currently active.
#[derive(Debug)]
pub(crate) struct PieceArena {
    chain: Chain<Piece>,
}

impl PieceArena {
    pub(crate) fn new() -> Self {
        PieceArena {
            chain: Chain::new(SENTINEL_PIECE),
        }
    }

    pub(crate) fn sentinel() -> PieceId {
        Chain::<Piece>::sentinel()
    }

    pub(crate) fn is_chain_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub(crate) fn piece(&self, id: PieceId) -> Piece {
        *self.chain.get(id)
    }

    pub(crate) fn prev_link(&self, id: PieceId) -> PieceId {
        self.chain.prev(id)
    }

    pub(crate) fn next_link(&self, id: PieceId) -> PieceId {
        self.chain.next(id)
    }

    pub(crate) fn set_prev_link(&mut self, id: PieceId, prev: PieceId) {
        self.chain.set_prev(id, prev);
    }

    pub(crate) fn set_next_link(&mut self, id: PieceId, next: PieceId) {
        self.chain.set_next(id, next);
    }

    /// Allocates a new piece. Its own `prev`/`next` links must be set by the
    /// caller before it is spliced into the chain via [`span_swap`].
    ///
    /// Infallible: callers that are about to allocate one or more pieces for
    /// a single edit must call [`Self::reserve`] for the worst-case count
    /// first, so that every `alloc` in that edit is guaranteed to find room
    /// without growing the arena.
    pub(crate) fn alloc(&mut self, piece: Piece) -> PieceId {
        self.chain.insert(piece)
    }

    /// Reserves room for `additional` pieces that do not come from a freed
    /// slot, so that the `additional` calls to [`Self::alloc`] that follow
    /// cannot fail partway through an edit. This is the one allocation seam
    /// an edit can actually fail at; everything `alloc` itself does past
    /// this point is infallible pointer bookkeeping.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        self.chain
            .try_reserve(additional)
            .map_err(|_| Error::OutOfMemory)
    }

    /// Physically frees a piece no longer reachable from any retained
    /// revision. Only the redo-purge calls this.
    pub(crate) fn free(&mut self, id: PieceId) {
        self.chain.remove(id);
    }

    pub(crate) fn first_active(&self) -> Option<PieceId> {
        self.chain.first()
    }

    pub(crate) fn last_active(&self) -> Option<PieceId> {
        self.chain.last()
    }

    /// Finds the piece containing absolute offset `abs` in the active
    /// chain, and the offset local to that piece. A linear walk, matching
    /// `piece_find` in the original; the spec's design notes call out a
    /// tree/rope as a drop-in, equal-contract replacement should this ever
    /// need to be faster.
    pub(crate) fn find(&self, abs: u64) -> Option<(PieceId, u64)> {
        let mut pos = 0u64;
        for (id, piece) in self.chain.iter() {
            if abs < pos + piece.len {
                return Some((id, abs - pos));
            }
            pos += piece.len;
        }
        None
    }

    pub(crate) fn iter_active(&self) -> impl Iterator<Item = (PieceId, Piece)> + '_ {
        self.chain.iter().map(|(id, p)| (id, *p))
    }

    /// Grows or shrinks a piece's length in place. Only ever called by the
    /// cache fast path (`chain.rs`), which is the sole place a piece is
    /// mutated after creation.
    pub(crate) fn set_len(&mut self, id: PieceId, len: u64) {
        self.chain.get_mut(id).len = len;
    }

    /// Sums the lengths of every piece from `span.start` to `span.end`
    /// inclusive, walking the pieces' own stored `next` links rather than
    /// the active chain — this must be callable both before a splice (while
    /// the span is still part of the active chain) and, for a previously
    /// detached span, after one.
    pub(crate) fn span_len(&self, start: PieceId, end: PieceId) -> u64 {
        let mut total = 0u64;
        let mut cur = start;
        loop {
            total += self.piece(cur).len;
            if cur == end {
                break;
            }
            cur = self.next_link(cur);
        }
        total
    }

    /// Collects every piece id in `span`, in chain order, by walking the
    /// pieces' own stored `next` links. Used by redo-history purge to free
    /// pieces that are no longer reachable from any retained revision.
    pub(crate) fn span_piece_ids(&self, span: &Span) -> Vec<PieceId> {
        let mut ids = Vec::new();
        if let (Some(start), Some(end)) = (span.start, span.end) {
            let mut cur = start;
            loop {
                ids.push(cur);
                if cur == end {
                    break;
                }
                cur = self.next_link(cur);
            }
        }
        ids
    }

    /// The pointer surgery at the heart of every edit: detaches `original`
    /// from the active chain and attaches `replacement` in its place (or
    /// vice versa, for undo/redo). Reads the hinge directly off the span
    /// endpoints' own stored links — never off `Span` itself — exactly as
    /// `span_swap` does in the original, which is why a piece can be
    /// reattached correctly however long after it was detached.
    pub(crate) fn span_swap(&mut self, original: &Span, replacement: &Span) {
        match (original.is_empty(), replacement.is_empty()) {
            (true, true) => {}
            (true, false) => {
                let rs = replacement.start.unwrap();
                let re = replacement.end.unwrap();
                let before = self.prev_link(rs);
                let after = self.next_link(re);
                self.set_next_link(before, rs);
                self.set_prev_link(after, re);
            }
            (false, true) => {
                let os = original.start.unwrap();
                let oe = original.end.unwrap();
                let before = self.prev_link(os);
                let after = self.next_link(oe);
                self.set_next_link(before, after);
                self.set_prev_link(after, before);
            }
            (false, false) => {
                let os = original.start.unwrap();
                let oe = original.end.unwrap();
                let rs = replacement.start.unwrap();
                let re = replacement.end.unwrap();
                let before = self.prev_link(os);
                let after = self.next_link(oe);
                self.set_next_link(before, rs);
                self.set_prev_link(after, re);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::BlockId;

    fn piece(pos: u64, len: u64) -> Piece {
        Piece::new(BlockId::ZERO, pos, len)
    }

    #[test]
    fn find_walks_linear_offsets() {
        let mut arena = PieceArena::new();
        let a = arena.alloc(piece(0, 3));
        let b = arena.alloc(piece(3, 2));
        let root = PieceArena::sentinel();

        arena.set_prev_link(a, root);
        arena.set_next_link(a, b);
        arena.set_prev_link(b, a);
        arena.set_next_link(b, root);
        arena.set_next_link(root, a);
        arena.set_prev_link(root, b);

        assert_eq!(arena.find(0), Some((a, 0)));
        assert_eq!(arena.find(2), Some((a, 2)));
        assert_eq!(arena.find(3), Some((b, 0)));
        assert_eq!(arena.find(4), Some((b, 1)));
        assert_eq!(arena.find(5), None);
    }

    #[test]
    fn reserve_reports_out_of_memory_instead_of_aborting() {
        let mut arena = PieceArena::new();
        let err = arena.reserve(usize::MAX).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory));
    }

    #[test]
    fn span_swap_insertion_into_empty_chain() {
        use crate::span::Span;

        let mut arena = PieceArena::new();
        let root = PieceArena::sentinel();
        let p = arena.alloc(piece(0, 5));
        arena.set_prev_link(p, root);
        arena.set_next_link(p, root);

        let original = Span::empty();
        let replacement = Span::single(p, 5);
        arena.span_swap(&original, &replacement);

        assert_eq!(arena.first_active(), Some(p));
        assert_eq!(arena.last_active(), Some(p));
    }

    #[test]
    fn span_swap_then_undo_restores_chain() {
        use crate::span::Span;

        let mut arena = PieceArena::new();
        let root = PieceArena::sentinel();
        let p1 = arena.alloc(piece(0, 3));
        arena.set_prev_link(p1, root);
        arena.set_next_link(p1, root);
        arena.span_swap(&Span::empty(), &Span::single(p1, 3));

        // Insert p2 after p1.
        let p2 = arena.alloc(piece(3, 2));
        arena.set_prev_link(p2, p1);
        arena.set_next_link(p2, root);
        arena.span_swap(&Span::empty(), &Span::single(p2, 2));

        assert_eq!(
            arena.iter_active().map(|(id, _)| id).collect::<Vec<_>>(),
            vec![p1, p2]
        );

        // Undo: swap p2's replacement span back out.
        arena.span_swap(&Span::single(p2, 2), &Span::empty());
        assert_eq!(arena.last_active(), Some(p1));

        // Redo: swap it back in using its own (untouched) links.
        arena.span_swap(&Span::empty(), &Span::single(p2, 2));
        assert_eq!(
            arena.iter_active().map(|(id, _)| id).collect::<Vec<_>>(),
            vec![p1, p2]
        );
    }
}
