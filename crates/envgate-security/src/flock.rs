// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Advisory file locking for the approval store's write path.

use std::fs::File;
use std::io;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Acquire an exclusive `flock` on `file`, blocking until it is available.
///
/// - **What is protected**: the record directory and the ledger of one store.
/// - **Who can mutate**: only the holder of the exclusive lock.
/// - **Release**: closing the descriptor (dropping the `File`).
///
/// On non-Unix platforms this is a no-op.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn acquire_exclusive_blocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` comes from a live `std::fs::File` borrowed for the whole
    // call, and `LOCK_EX` is a valid `flock` operation.
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
    if rc == 0 {
        return Ok(());
    }
    Err(io::Error::last_os_error())
}

#[cfg(not(unix))]
pub fn acquire_exclusive_blocking(_: &File) -> io::Result<()> {
    Ok(())
}
