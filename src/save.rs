//! The save collaborator: streams the buffer's contents to a path, either
//! atomically (write-temp, fsync, rename) or in place.
//!
//! Grounded on `PieceChain.c`'s `piece_chain_save_atomic`/
//! `piece_chain_save_inplace`/`piece_chain_save`. This is plumbing the core
//! spec treats as an external collaborator it only feeds via `visit`; no
//! pack crate wraps this particular flow, so it is built directly against
//! `std::fs` and `std::os::unix::fs::{MetadataExt, PermissionsExt}`, the way
//! the original is built directly against raw syscalls.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};

/// Mirrors `enum PieceChainSaveMode` from the original design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Write to a temp file beside `path`, fsync it, then rename over the
    /// target, then fsync the parent directory. Refuses to run if the
    /// target exists and is not a regular file with exactly one hard link.
    Atomic,
    /// Open-or-create `path`, write, fsync, close. Simpler but leaves a
    /// window where a reader can observe a partially written file.
    Inplace,
    /// Try [`SaveMode::Atomic`]; on failure fall back to
    /// [`SaveMode::Inplace`].
    Auto,
}

/// Streams `visit_all(sink)` to `path` per `mode`. `visit_all` is expected
/// to call `sink.write_all` once per contiguous piece slice, exactly the
/// shape `write_to_fd_visitor` has in the original.
pub(crate) fn save(
    path: &Path,
    mode: SaveMode,
    visit_all: impl Fn(&mut dyn Write) -> Result<()>,
) -> Result<()> {
    match mode {
        SaveMode::Atomic => save_atomic(path, &visit_all),
        SaveMode::Inplace => save_inplace(path, &visit_all),
        SaveMode::Auto => match save_atomic(path, &visit_all) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("atomic save of {} failed ({err}), falling back to in-place", path.display());
                save_inplace(path, &visit_all)
            }
        },
    }
}

fn save_atomic(path: &Path, visit_all: &impl Fn(&mut dyn Write) -> Result<()>) -> Result<()> {
    let existing = fs::metadata(path).ok();
    if let Some(meta) = &existing {
        if !meta.is_file() || meta.nlink() > 1 {
            return Err(Error::IoUnsupportedTarget);
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push("~~save");
    let tmp_path = Path::new(&tmp_name);

    let mode_bits = existing.as_ref().map(|m| m.permissions().mode()).unwrap_or(0o666);
    let mut tmp = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode_bits)
        .open(tmp_path)
        .map_err(Error::IoOpen)?;

    if let Some(meta) = &existing {
        // Best-effort owner/group copy, mirroring the original's fchown
        // calls; failure here is not fatal for a single-user desktop editor
        // use case and the original itself treats EPERM (non-root) calls
        // as a hard error only because it runs as the invoking user, so we
        // surface the same failure rather than silently ignore it.
        if let Err(err) = chown_like(&tmp, meta) {
            let _ = fs::remove_file(tmp_path);
            return Err(Error::IoOpen(err));
        }
    }

    if let Err(err) = visit_all(&mut tmp) {
        let _ = fs::remove_file(tmp_path);
        return Err(err);
    }

    tmp.sync_all().map_err(|e| {
        let _ = fs::remove_file(tmp_path);
        Error::IoFsync(e)
    })?;
    drop(tmp);

    fs::rename(tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(tmp_path);
        Error::IoRename(e)
    })?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Ok(dirfile) = File::open(dir) {
            let _ = dirfile.sync_all();
        }
    }

    debug!("saved {} atomically", path.display());
    Ok(())
}

fn save_inplace(path: &Path, visit_all: &impl Fn(&mut dyn Write) -> Result<()>) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .map_err(Error::IoOpen)?;
    visit_all(&mut file)?;
    file.sync_all().map_err(Error::IoFsync)?;
    debug!("saved {} in place", path.display());
    Ok(())
}

#[cfg(unix)]
fn chown_like(file: &File, meta: &fs::Metadata) -> std::result::Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let uid = meta.uid();
    let gid = meta.gid();
    // SAFETY: `fd` is a valid, open file descriptor owned by `file` for the
    // duration of this call; `fchown` only reads `fd`/`uid`/`gid`.
    let res = unsafe { libc::fchown(fd, uid, gid) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
