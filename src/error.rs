use std::io;

use thiserror::Error;

/// Errors surfaced by a [`crate::PieceChain`].
///
/// This mirrors the error taxonomy of the original piece chain design:
/// every variant that can be caused by a failing syscall carries the
/// underlying [`io::Error`] so callers can still inspect `errno`/`kind()`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("out of memory")]
    OutOfMemory,

    #[error("offset {offset} out of range (buffer size is {size})")]
    BadOffset { offset: u64, size: u64 },

    #[error("failed to open file: {0}")]
    IoOpen(#[source] io::Error),

    #[error("failed to stat file: {0}")]
    IoStat(#[source] io::Error),

    #[error("failed to mmap file: {0}")]
    IoMmap(#[source] io::Error),

    #[error("failed to write file: {0}")]
    IoWrite(#[source] io::Error),

    #[error("failed to fsync file: {0}")]
    IoFsync(#[source] io::Error),

    #[error("failed to rename file: {0}")]
    IoRename(#[source] io::Error),

    #[error("save target is not a regular file with a single hard link")]
    IoUnsupportedTarget,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Clone for Error {
    /// `io::Error` is not `Clone`, so the underlying error is rebuilt from
    /// its `kind()` — this loses the OS error message text but keeps the
    /// classification, which is all [`crate::PieceChain::last_error`]
    /// promises to preserve across a borrow.
    fn clone(&self) -> Self {
        match self {
            Error::OutOfMemory => Error::OutOfMemory,
            Error::BadOffset { offset, size } => Error::BadOffset {
                offset: *offset,
                size: *size,
            },
            Error::IoUnsupportedTarget => Error::IoUnsupportedTarget,
            Error::IoOpen(e) => Error::IoOpen(io::Error::from(e.kind())),
            Error::IoStat(e) => Error::IoStat(io::Error::from(e.kind())),
            Error::IoMmap(e) => Error::IoMmap(io::Error::from(e.kind())),
            Error::IoWrite(e) => Error::IoWrite(io::Error::from(e.kind())),
            Error::IoFsync(e) => Error::IoFsync(io::Error::from(e.kind())),
            Error::IoRename(e) => Error::IoRename(io::Error::from(e.kind())),
        }
    }
}
