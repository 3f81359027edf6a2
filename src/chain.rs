//! `PieceChain`: the public root type tying together the block manager,
//! piece arena, revision log and last-piece cache into the insert / delete
//! / replace / commit / undo / redo / read_byte / visit / iter / save
//! surface.
//!
//! Grounded on `PieceChain.c`'s `piece_chain_*` family of functions for the
//! algorithm, and on `sanedit-buffer`'s `piece_tree.rs` for the public-API
//! shape and doc-comment register (method names, `&mut self` mutators,
//! `Result`-returning constructors).

use std::path::Path;

use log::{debug, trace};

use crate::block::{mmap_file, BlockManager};
use crate::cache::Cache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::piece::{Piece, PieceArena, PieceId};
use crate::revision::{PendingRevision, RevisionLog};
use crate::save::{self, SaveMode};
use crate::span::{Change, Span};
use crate::visit::{self, Iter};

/// An in-memory piece-chain buffer with grouped undo/redo.
///
/// A `PieceChain` owns every byte it was ever given: bytes inserted by the
/// caller live in append-only heap blocks, and (if opened from a file) the
/// original file's bytes live in a read-only memory mapping. Edits never
/// copy or shift the bulk of the buffer — they splice small, immutable
/// piece descriptors into an ordered chain.
#[derive(Debug)]
pub struct PieceChain {
    pieces: PieceArena,
    blocks: BlockManager,
    revisions: RevisionLog,
    pending: PendingRevision,
    cache: Cache,
    size: u64,
    dirty: bool,
    last_error: Option<Error>,
    config: Config,
}

impl PieceChain {
    /// Opens a new piece chain. `path = None` yields an empty buffer with a
    /// sealed initial (empty) revision. `path = Some(p)` memory-maps `p`
    /// read-only and installs one piece covering the whole mapping,
    /// committed as the initial revision; opening does not mark the
    /// buffer dirty.
    pub fn open(path: Option<&Path>, config: Config) -> Result<Self> {
        let mut chain = PieceChain {
            pieces: PieceArena::new(),
            blocks: BlockManager::new(),
            revisions: RevisionLog::new(),
            pending: PendingRevision::new(),
            cache: Cache::new(),
            size: 0,
            dirty: false,
            last_error: None,
            config,
        };

        if let Some(path) = path {
            if let Some(mmap) = mmap_file(path)? {
                let len = mmap.len() as u64;
                let block = chain.blocks.push_mmap(mmap);
                chain.pieces.reserve(1)?;
                let piece = chain.pieces.alloc(Piece::new(block, 0, len));
                let root = PieceArena::sentinel();
                chain.pieces.set_prev_link(piece, root);
                chain.pieces.set_next_link(piece, root);

                let original = Span::empty();
                let replacement = Span::single(piece, len);
                chain.pieces.span_swap(&original, &replacement);
                chain.pending.push(Change::new(original, replacement, 0));
                chain.size = len;
                chain.commit()?;
                debug!("opened {} ({} bytes, mmap-backed)", path.display(), len);
            } else {
                debug!("opened {} (empty file)", path.display());
            }
        }

        Ok(chain)
    }

    /// Total buffer length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `true` iff the buffer has no content.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// `true` iff at least one insert/delete/replace has happened since the
    /// last successful [`Self::save`], or since creation if never saved.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// The most recent error recorded by a fallible operation, if any.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    fn fail(&mut self, err: Error) -> Error {
        trace!("operation failed: {err}");
        self.last_error = Some(err.clone());
        err
    }

    /// Returns the piece (if any) and local offset at `offset`, treating
    /// `offset == size` as "insert at the end of the tail piece" and an
    /// empty chain as "no piece yet" — the two special cases `piece_find`
    /// in the original handles explicitly before falling back to a linear
    /// walk.
    fn locate_insert(&self, offset: u64) -> (Option<PieceId>, u64) {
        if self.pieces.is_chain_empty() {
            return (None, 0);
        }
        if offset == self.size {
            let last = self
                .pieces
                .last_active()
                .expect("non-empty chain has a last piece");
            let len = self.pieces.piece(last).len;
            return (Some(last), len);
        }
        self.pieces
            .find(offset)
            .map(|(id, local)| (Some(id), local))
            .expect("offset < size within a non-empty chain always finds a piece")
    }

    /// On a fresh (non-cache-hit) edit, any retained redo history becomes
    /// permanently unreachable; its replacement-span pieces are freed here.
    /// The original-span pieces of a purged revision stay alive — they are
    /// still referenced by the revision (or initial state) before it.
    fn purge_redo_history(&mut self) {
        for revision in self.revisions.drain_redo() {
            for change in revision.changes {
                for id in self.pieces.span_piece_ids(&change.replacement) {
                    self.pieces.free(id);
                }
            }
        }
    }

    /// Attempts to extend `piece` in place with `bytes` inserted at its
    /// local offset `local`. Succeeds only if `piece` is the current cache
    /// occupant and its backing (necessarily tail, necessarily heap) block
    /// has room. On success, patches the piece's length, the buffer size,
    /// and the most recently pending change's replacement length — no new
    /// piece or change is recorded.
    fn try_cache_insert(&mut self, piece_id: PieceId, local: u64, bytes: &[u8]) -> bool {
        if !self.cache.is(piece_id) {
            return false;
        }
        let piece = self.pieces.piece(piece_id);
        if !self.blocks.heap(piece.block).can_fit(bytes.len()) {
            return false;
        }

        let at = (piece.pos + local) as usize;
        self.blocks.heap_mut(piece.block).splice_insert(at, bytes);
        self.pieces.set_len(piece_id, piece.len + bytes.len() as u64);
        self.size += bytes.len() as u64;
        if let Some(change) = self.pending.last_mut() {
            change.replacement.len += bytes.len() as u64;
        }
        trace!("cache fast-path insert of {} bytes", bytes.len());
        true
    }

    /// Attempts to delete `len` bytes starting at local offset `local`
    /// inside `piece`, in place. Succeeds only if `piece` is the cache
    /// occupant and the whole deleted range lies within it.
    fn try_cache_delete(&mut self, piece_id: PieceId, local: u64, len: u64) -> bool {
        if !self.cache.is(piece_id) {
            return false;
        }
        let piece = self.pieces.piece(piece_id);
        if piece.len - local < len {
            return false;
        }

        let at = (piece.pos + local) as usize;
        self.blocks.heap_mut(piece.block).splice_delete(at, len as usize);
        self.pieces.set_len(piece_id, piece.len - len);
        self.size -= len;
        if let Some(change) = self.pending.last_mut() {
            change.replacement.len -= len;
        }
        trace!("cache fast-path delete of {len} bytes");
        true
    }

    /// Inserts `bytes` at `offset`. A no-op if `bytes` is empty.
    pub fn insert(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if offset > self.size {
            return Err(self.fail(Error::BadOffset {
                offset,
                size: self.size,
            }));
        }

        let (piece_opt, local) = self.locate_insert(offset);
        self.purge_redo_history();
        let len = bytes.len() as u64;

        if let Some(piece_id) = piece_opt {
            if self.try_cache_insert(piece_id, local, bytes) {
                self.dirty = true;
                return Ok(());
            }
            if local == 0 && self.pieces.first_active() != Some(piece_id) {
                let prev = self.pieces.prev_link(piece_id);
                let prev_len = self.pieces.piece(prev).len;
                if self.try_cache_insert(prev, prev_len, bytes) {
                    self.dirty = true;
                    return Ok(());
                }
            }
        }

        // Reserve arena capacity for the worst case (a mid-piece split needs
        // three new pieces) before writing a single byte anywhere, so a
        // failure here leaves `blocks`/`pieces`/`size`/`dirty` untouched.
        if let Err(e) = self.pieces.reserve(3) {
            return Err(self.fail(e));
        }
        let (block, pos) = match self.blocks.append_heap(bytes, self.config.min_block_bytes) {
            Ok(v) => v,
            Err(e) => return Err(self.fail(e)),
        };
        let root = PieceArena::sentinel();

        let (original, replacement, new_piece) = match piece_opt {
            None => {
                let p = self.pieces.alloc(Piece::new(block, pos, len));
                self.pieces.set_prev_link(p, root);
                self.pieces.set_next_link(p, root);
                (Span::empty(), Span::single(p, len), p)
            }
            Some(piece_id) => {
                let piece = self.pieces.piece(piece_id);
                if local == 0 || local == piece.len {
                    let p = self.pieces.alloc(Piece::new(block, pos, len));
                    if local == 0 {
                        let prev = self.pieces.prev_link(piece_id);
                        self.pieces.set_prev_link(p, prev);
                        self.pieces.set_next_link(p, piece_id);
                    } else {
                        let next = self.pieces.next_link(piece_id);
                        self.pieces.set_prev_link(p, piece_id);
                        self.pieces.set_next_link(p, next);
                    }
                    (Span::empty(), Span::single(p, len), p)
                } else {
                    let before = self
                        .pieces
                        .alloc(Piece::new(piece.block, piece.pos, local));
                    let middle = self.pieces.alloc(Piece::new(block, pos, len));
                    let after = self.pieces.alloc(Piece::new(
                        piece.block,
                        piece.pos + local,
                        piece.len - local,
                    ));

                    let prev = self.pieces.prev_link(piece_id);
                    let next = self.pieces.next_link(piece_id);
                    self.pieces.set_prev_link(before, prev);
                    self.pieces.set_next_link(before, middle);
                    self.pieces.set_prev_link(middle, before);
                    self.pieces.set_next_link(middle, after);
                    self.pieces.set_prev_link(after, middle);
                    self.pieces.set_next_link(after, next);

                    (
                        Span::single(piece_id, piece.len),
                        Span::new(before, after, piece.len + len),
                        middle,
                    )
                }
            }
        };

        self.pieces.span_swap(&original, &replacement);
        self.cache.set(new_piece);
        self.pending.push(Change::new(original, replacement, offset));
        self.size += len;
        self.dirty = true;
        Ok(())
    }

    /// Deletes up to `len` bytes starting at `offset`. The range is
    /// clamped to [`Self::size`]; a no-op if the clamped range is empty.
    pub fn delete(&mut self, offset: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        if offset > self.size {
            return Err(self.fail(Error::BadOffset {
                offset,
                size: self.size,
            }));
        }

        let end = offset.saturating_add(len).min(self.size);
        if end == offset {
            return Ok(());
        }
        let len = end - offset;

        let (start_piece, start_local) = self
            .pieces
            .find(offset)
            .expect("offset < size always finds a piece");
        let (end_piece, end_local) = match self.pieces.find(end) {
            Some(v) => v,
            None => {
                let last = self
                    .pieces
                    .last_active()
                    .expect("non-empty chain has a last piece");
                (last, self.pieces.piece(last).len)
            }
        };

        self.purge_redo_history();

        if self.try_cache_delete(start_piece, start_local, len) {
            self.dirty = true;
            return Ok(());
        }

        let original_len = self.pieces.span_len(start_piece, end_piece);
        let start_piece_data = self.pieces.piece(start_piece);
        let end_piece_data = self.pieces.piece(end_piece);
        let split_start = start_local != 0;
        let split_end = end_local != end_piece_data.len;

        let before = self.pieces.prev_link(start_piece);
        let after = self.pieces.next_link(end_piece);

        // Reserve for the worst case (both ends split) before allocating
        // either replacement piece, so a failure here leaves `pieces`/
        // `size`/`dirty` untouched.
        if let Err(e) = self.pieces.reserve(2) {
            return Err(self.fail(e));
        }

        let mut new_start = None;
        let mut new_end = None;

        if split_start {
            let p = self.pieces.alloc(Piece::new(
                start_piece_data.block,
                start_piece_data.pos,
                start_local,
            ));
            self.pieces.set_prev_link(p, before);
            self.pieces.set_next_link(p, after);
            new_start = Some(p);
        }
        if split_end {
            let p = self.pieces.alloc(Piece::new(
                end_piece_data.block,
                end_piece_data.pos + end_local,
                end_piece_data.len - end_local,
            ));
            self.pieces.set_prev_link(p, before);
            self.pieces.set_next_link(p, after);
            if let Some(ns) = new_start {
                self.pieces.set_next_link(ns, p);
                self.pieces.set_prev_link(p, ns);
            }
            new_end = Some(p);
        }

        let (repl_start, repl_end) = match (new_start, new_end) {
            (None, None) => (None, None),
            (Some(s), None) => (Some(s), Some(s)),
            (None, Some(e)) => (Some(e), Some(e)),
            (Some(s), Some(e)) => (Some(s), Some(e)),
        };

        let original = Span::new(start_piece, end_piece, original_len);
        let replacement = match repl_start {
            None => Span::empty(),
            Some(s) => Span::new(s, repl_end.unwrap(), original_len - len),
        };

        self.pieces.span_swap(&original, &replacement);
        self.pending.push(Change::new(original, replacement, offset));
        self.size -= len;
        self.dirty = true;
        Ok(())
    }

    /// Replaces the `bytes.len()` bytes starting at `offset` with `bytes`:
    /// a convenience shortcut equivalent to `delete(offset, bytes.len())`
    /// immediately followed by `insert(offset, bytes)`, recorded as two
    /// separate changes within whatever revision is currently pending.
    pub fn replace(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.delete(offset, bytes.len() as u64)?;
        self.insert(offset, bytes)
    }

    /// Seals every change applied since the last commit into a new
    /// revision and invalidates the cache. A no-op (but still invalidates
    /// the cache) when nothing is pending.
    pub fn commit(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let revision = self.pending.take();
            self.revisions.push(revision);
        }
        self.cache.invalidate();
        Ok(())
    }

    /// Commits any pending changes, then reverts the most recently applied
    /// revision. Returns `Ok(None)` if there is nothing to undo, otherwise
    /// the position of the last-reverted change in that revision (the
    /// position of the *first* change the revision originally recorded,
    /// since changes are reverted in reverse order — see spec §4.5/§9).
    pub fn undo(&mut self) -> Result<Option<u64>> {
        self.commit()?;
        let Some(changes) = self.revisions.undo() else {
            return Ok(None);
        };

        let mut pos = None;
        for change in changes {
            self.pieces.span_swap(&change.original, &change.replacement);
            self.size = self.size + change.replacement.len - change.original.len;
            pos = Some(change.position);
        }
        debug!("undo -> position {pos:?}");
        Ok(pos)
    }

    /// Commits any pending changes, then reapplies the next revision in
    /// forward order. Returns `Ok(None)` if there is nothing to redo.
    pub fn redo(&mut self) -> Result<Option<u64>> {
        self.commit()?;
        let Some(changes) = self.revisions.redo() else {
            return Ok(None);
        };

        let mut pos = None;
        for change in changes {
            self.pieces.span_swap(&change.original, &change.replacement);
            self.size = self.size + change.replacement.len - change.original.len;
            pos = Some(change.position);
        }
        debug!("redo -> position {pos:?}");
        Ok(pos)
    }

    /// Reads the single byte at `offset`.
    pub fn read_byte(&self, offset: u64) -> Result<u8> {
        let (id, local) = self
            .pieces
            .find(offset)
            .ok_or(Error::BadOffset {
                offset,
                size: self.size,
            })?;
        let piece = self.pieces.piece(id);
        Ok(self.blocks.slice(piece.block, piece.pos + local, 1)[0])
    }

    /// Streams `[start, start+len)`, invoking `f(absolute_offset, slice)`
    /// for each contiguous run of bytes. Stops early if `f` returns
    /// `false`.
    pub fn visit(&self, start: u64, len: u64, f: impl FnMut(u64, &[u8]) -> bool) {
        visit::visit(&self.pieces, &self.blocks, self.size, start, len, f)
    }

    /// A resumable, cloneable cursor over `[start, start+len)`.
    pub fn iter(&self, start: u64, len: u64) -> Iter<'_> {
        Iter::new(&self.pieces, &self.blocks, self.size, start, len)
    }

    /// Streams the whole buffer to `path` per `mode`, clearing
    /// [`Self::dirty`] on success.
    pub fn save(&mut self, path: &Path, mode: SaveMode) -> Result<()> {
        let pieces = &self.pieces;
        let blocks = &self.blocks;
        let size = self.size;

        let result = save::save(path, mode, |sink| {
            let mut write_err = None;
            visit::visit(pieces, blocks, size, 0, size, |_, slice| {
                if let Err(e) = std::io::Write::write_all(sink, slice) {
                    write_err = Some(Error::IoWrite(e));
                    return false;
                }
                true
            });
            match write_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        });

        match result {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}
