//! An in-memory piece-chain buffer with grouped undo/redo, backed by
//! memory-mapped or heap-allocated byte blocks.
//!
//! The buffer never copies or shifts the bulk of its contents on edit:
//! inserting, deleting or replacing bytes at an offset splices small,
//! immutable piece descriptors into an ordered chain, while the bytes
//! themselves live in append-only heap blocks or a read-only `mmap` of the
//! original file. A linear sequence of committed revisions supports
//! unlimited, grouped undo/redo by swapping spans of pieces back into or
//! out of the active chain.
//!
//! ```
//! use piecechain::{Config, PieceChain};
//!
//! let mut buf = PieceChain::open(None, Config::default()).unwrap();
//! buf.insert(0, b"hello").unwrap();
//! buf.insert(5, b" world").unwrap();
//! buf.commit().unwrap();
//!
//! assert_eq!(buf.size(), 11);
//! buf.undo().unwrap();
//! assert_eq!(buf.size(), 0);
//! ```

mod block;
mod cache;
mod chain;
mod config;
mod error;
mod intrusive;
mod piece;
mod revision;
mod save;
mod span;
mod visit;

pub use chain::PieceChain;
pub use config::Config;
pub use error::{Error, Result};
pub use save::SaveMode;
pub use visit::Iter;
