/// Tunables for a [`crate::PieceChain`].
///
/// The original C implementation hardcodes `MEM_BLOCK_SIZE` (1 MiB) as the
/// minimum size of a newly allocated heap block. This crate exposes the same
/// default but lets callers override it, the way `sanedit-buffer` turns its
/// own `FILE_BACKED_MAX_PIECE_SIZE` constant into a named, documented value
/// rather than a literal sprinkled through the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Minimum size, in bytes, of a newly allocated heap block. A single
    /// large insertion may still allocate a bigger block to fit the data.
    pub min_block_bytes: usize,
}

/// 1 MiB, matching the canonical default from the original design.
pub const DEFAULT_MIN_BLOCK_BYTES: usize = 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Config {
            min_block_bytes: DEFAULT_MIN_BLOCK_BYTES,
        }
    }
}
