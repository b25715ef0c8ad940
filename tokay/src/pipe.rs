//! Named-pipe plumbing shared by the serialiser and the response reader.
//!
//! Both VFd pipes are opened read-write even though each side only ever
//! reads or writes one of them: holding the opposite handle open keeps a
//! transient peer disconnect from surfacing as EOF on the read side and
//! keeps the open itself from blocking until a peer shows up.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tokio::fs::{File, OpenOptions};

/// Creation mode for pipes the bridge makes itself.
const FIFO_MODE: libc::mode_t = 0o660;

/// Create `path` as a FIFO with mode 0660 if nothing exists there yet.
///
/// Parent directories are created as needed. An existing file is left
/// untouched; [`open_rw`] will fail later if it is not actually a pipe.
pub fn ensure_fifo(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pipe path contains NUL"))?;

    // Safety: cpath is a valid NUL-terminated path for the duration of the call.
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), FIFO_MODE) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // lost a create race; the other creator wins
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(err);
        }
    }

    Ok(())
}

/// Open an existing pipe with both read and write access.
pub async fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path).await
}
