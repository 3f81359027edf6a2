//! Byte arenas that piece data points into.
//!
//! Grounded on `PieceChain.c`'s `Block`/`block_alloc`/`block_alloc_mmap`/
//! `block_append`/`block_can_fit`. A [`Block`] is either a read-only mapping
//! of a file (`MmapBlock`) or an append-only heap buffer (`HeapBlock`); both
//! kinds track a fixed `capacity` and a monotonically growing `used` cursor,
//! except that the cache fast path (`cache.rs`) is allowed to shift bytes
//! within — and shrink — the `used` region of the *last* heap block only.

use std::fs::File;
use std::path::Path;

use log::trace;
use memmap2::Mmap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BlockId(u32);

impl BlockId {
    pub(crate) const fn new(id: u32) -> Self {
        BlockId(id)
    }
}

/// A heap-allocated, append-only arena. `data` is allocated once at
/// `capacity` and never resized; `used` is the number of bytes written so
/// far, except for the transient cache-splice mutation described in
/// `cache.rs`.
#[derive(Debug)]
pub(crate) struct HeapBlock {
    data: Box<[u8]>,
    used: usize,
}

impl HeapBlock {
    /// Reserves exactly `capacity` bytes before touching any of them, so a
    /// failure here never leaves a partially-sized block behind. Unlike
    /// `vec![0u8; capacity]`, which aborts the process on allocation
    /// failure, `try_reserve_exact` hands the failure back as an
    /// `Error::OutOfMemory` a caller can recover from.
    fn new(capacity: usize) -> Result<Self> {
        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        data.resize(capacity, 0);
        Ok(HeapBlock {
            data: data.into_boxed_slice(),
            used: 0,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn can_fit(&self, len: usize) -> bool {
        self.capacity() - self.used >= len
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Appends `bytes` to the tail of the used region. Caller must have
    /// checked `can_fit` first.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> usize {
        let pos = self.used;
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
        self.used += bytes.len();
        pos
    }

    /// Shifts `[at, used)` right by `bytes.len()` and writes `bytes` at
    /// `at`, growing `used` by `bytes.len()`. Used only by the cache insert
    /// fast path, and only on the tail block.
    pub(crate) fn splice_insert(&mut self, at: usize, bytes: &[u8]) {
        let old_used = self.used;
        self.data.copy_within(at..old_used, at + bytes.len());
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
        self.used += bytes.len();
    }

    /// Removes `len` bytes starting at `at`, shifting `[at + len, used)`
    /// left. Used only by the cache delete fast path, and only on the tail
    /// block.
    pub(crate) fn splice_delete(&mut self, at: usize, len: usize) {
        let old_used = self.used;
        self.data.copy_within(at + len..old_used, at);
        self.used -= len;
    }
}

/// A read-only mapping of a file, `PROT_READ | MAP_PRIVATE`. `capacity ==
/// used` always, and neither shrinks nor grows after creation.
#[derive(Debug)]
pub(crate) struct MmapBlock {
    mmap: Mmap,
}

impl MmapBlock {
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub(crate) fn len(&self) -> usize {
        self.mmap.len()
    }
}

#[derive(Debug)]
pub(crate) enum Block {
    Heap(HeapBlock),
    Mmap(MmapBlock),
}

impl Block {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Block::Heap(b) => b.as_slice(),
            Block::Mmap(b) => b.as_slice(),
        }
    }

    pub(crate) fn as_heap(&self) -> Option<&HeapBlock> {
        match self {
            Block::Heap(b) => Some(b),
            Block::Mmap(_) => None,
        }
    }

    pub(crate) fn as_heap_mut(&mut self) -> Option<&mut HeapBlock> {
        match self {
            Block::Heap(b) => Some(b),
            Block::Mmap(_) => None,
        }
    }
}

/// Owns every block ever allocated for a piece chain. Blocks are only ever
/// appended to this list and are freed in bulk on teardown (via `Drop`),
/// matching `all_blocks` in the original design — a block's bytes may be
/// referenced by pieces across many revisions, so it must outlive every
/// piece that points into it, which a `Vec` that is never shrunk guarantees.
#[derive(Debug, Default)]
pub(crate) struct BlockManager {
    blocks: Vec<Block>,
}

impl BlockManager {
    pub(crate) fn new() -> Self {
        BlockManager { blocks: Vec::new() }
    }

    pub(crate) fn get(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub(crate) fn slice(&self, id: BlockId, pos: u64, len: u64) -> &[u8] {
        let bytes = self.get(id).as_slice();
        &bytes[pos as usize..(pos + len) as usize]
    }

    /// The id of the last allocated block, if it is heap-backed (mmap
    /// blocks are never reused as an append target).
    pub(crate) fn tail_heap_block(&self) -> Option<BlockId> {
        match self.blocks.last() {
            Some(Block::Heap(_)) => Some(BlockId((self.blocks.len() - 1) as u32)),
            _ => None,
        }
    }

    pub(crate) fn heap_mut(&mut self, id: BlockId) -> &mut HeapBlock {
        self.blocks[id.0 as usize]
            .as_heap_mut()
            .expect("block is not heap-backed")
    }

    pub(crate) fn heap(&self, id: BlockId) -> &HeapBlock {
        self.get(id).as_heap().expect("block is not heap-backed")
    }

    /// Appends `bytes` into a heap block, reusing the tail block if it has
    /// room, otherwise allocating a new one sized `max(bytes.len(),
    /// min_block_bytes)`. Returns the destination block and the offset the
    /// data was written at.
    ///
    /// The new-block path builds and fills `block` completely before it is
    /// pushed into `self.blocks` — if `HeapBlock::new` fails, this manager's
    /// state is untouched.
    pub(crate) fn append_heap(
        &mut self,
        bytes: &[u8],
        min_block_bytes: usize,
    ) -> Result<(BlockId, u64)> {
        if let Some(id) = self.tail_heap_block() {
            if self.heap(id).can_fit(bytes.len()) {
                let pos = self.heap_mut(id).append(bytes);
                return Ok((id, pos as u64));
            }
        }

        let capacity = bytes.len().max(min_block_bytes);
        trace!("allocating new heap block of {capacity} bytes");
        let mut block = HeapBlock::new(capacity)?;
        let pos = block.append(bytes);
        self.blocks.push(Block::Heap(block));
        Ok((BlockId((self.blocks.len() - 1) as u32), pos as u64))
    }

    pub(crate) fn push_mmap(&mut self, mmap: Mmap) -> BlockId {
        self.blocks.push(Block::Mmap(MmapBlock { mmap }));
        BlockId((self.blocks.len() - 1) as u32)
    }
}

/// Determines the byte length to map for `file`: `st_size` for a regular
/// file, the `BLKGETSIZE64` ioctl for a block device, and an error for
/// anything else (pipe, socket, directory, ...), exactly as the original's
/// `fstat`/`S_ISBLK`/`S_ISREG` dance in `piece_chain_open`.
fn file_len(file: &File) -> Result<u64> {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::io::AsRawFd;

    let meta = file.metadata().map_err(Error::IoStat)?;
    let file_type = meta.file_type();
    if file_type.is_block_device() {
        #[cfg(target_os = "linux")]
        {
            let mut size: u64 = 0;
            // SAFETY: `fd` is a valid, open file descriptor for `file`'s
            // lifetime; `BLKGETSIZE64` writes exactly `size_of::<u64>()`
            // bytes into `size`, which we own.
            let res =
                unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size as *mut u64) };
            if res < 0 {
                return Err(Error::IoStat(std::io::Error::last_os_error()));
            }
            Ok(size)
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(Error::IoStat(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "block device sizing is only supported on linux",
            )))
        }
    } else if file_type.is_file() {
        Ok(meta.len())
    } else {
        Err(Error::IoStat(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "only regular files and block devices can be opened",
        )))
    }
}

// `BLKGETSIZE64` is a Linux-specific ioctl request number; `libc` does not
// expose it as a named constant (unlike e.g. `BLKSSZGET`), so it is defined
// here the way the original's C header (`<linux/fs.h>`) does: `_IOR(0x12,
// 114, size_t)`.
#[cfg(target_os = "linux")]
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

/// Maps `path` read-only, `MAP_PRIVATE`, the way `block_alloc_mmap` does in
/// the original. Returns `Ok(None)` for an empty file (mapping a
/// zero-length file is an error on most platforms and an empty file needs
/// no backing block at all).
pub(crate) fn mmap_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).map_err(Error::IoOpen)?;
    let len = file_len(&file)?;
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: the file is opened read-only and the mapping is private, so
    // concurrent writers to the underlying file (by another process) can at
    // worst cause us to observe stale or torn data, never unmapped memory;
    // we never hold a `&mut` to the mapping.
    let mmap = unsafe { Mmap::map(&file) }.map_err(Error::IoMmap)?;
    Ok(Some(mmap))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn heap_block_append_and_splice() {
        let mut b = HeapBlock::new(16).unwrap();
        assert_eq!(b.append(b"abc"), 0);
        assert_eq!(b.as_slice(), b"abc");

        b.splice_insert(1, b"XY");
        assert_eq!(b.as_slice(), b"aXYbc");

        b.splice_delete(1, 2);
        assert_eq!(b.as_slice(), b"abc");
    }

    #[test]
    fn can_fit_respects_capacity() {
        let mut b = HeapBlock::new(4).unwrap();
        assert!(b.can_fit(4));
        assert!(!b.can_fit(5));
        b.append(b"ab");
        assert!(b.can_fit(2));
        assert!(!b.can_fit(3));
    }

    #[test]
    fn manager_reuses_tail_block_when_it_fits() {
        let mut mgr = BlockManager::new();
        let (id1, pos1) = mgr.append_heap(b"hello", 1024).unwrap();
        let (id2, pos2) = mgr.append_heap(b" world", 1024).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(pos1, 0);
        assert_eq!(pos2, 5);
    }

    #[test]
    fn new_block_reports_out_of_memory_instead_of_aborting() {
        // `try_reserve_exact` rejects a request this large as a capacity
        // overflow before ever asking the allocator for memory, so this is
        // deterministic and doesn't actually try to allocate `usize::MAX`
        // bytes.
        let err = HeapBlock::new(usize::MAX).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory));
    }

    #[test]
    fn manager_allocates_new_block_when_full() {
        let mut mgr = BlockManager::new();
        mgr.append_heap(b"abcd", 4).unwrap();
        let (id2, _) = mgr.append_heap(b"e", 4).unwrap();
        assert_eq!(id2, BlockId(1));
    }
}
