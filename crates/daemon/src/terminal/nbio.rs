// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-blocking fd plumbing for the PTY backend: the master side of a
//! session's terminal, registered with the tokio reactor so reads and
//! writes are readiness-driven instead of busy-polling.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tokio::io::unix::AsyncFd;

struct MasterFd(OwnedFd);

impl AsRawFd for MasterFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for MasterFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

/// A PTY master owned by the session's runner task. All I/O goes through
/// readiness guards; a `WouldBlock` re-arms the guard rather than spinning.
pub struct AsyncMaster {
    inner: AsyncFd<MasterFd>,
}

impl AsyncMaster {
    /// Take ownership of a master fd, flip it to non-blocking mode, and
    /// register it with the reactor.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        let flags = fcntl(&fd, FcntlArg::F_GETFL).map_err(io_err)?;
        let flags = OFlag::from_bits_truncate(flags);
        fcntl(&fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
        Ok(Self { inner: AsyncFd::new(MasterFd(fd))? })
    }

    /// One chunk of terminal output, however much the kernel has buffered.
    /// `Ok(0)` means the slave side hung up.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|afd| nix::unistd::read(afd.get_ref(), buf).map_err(io_err)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write the whole buffer, resuming across short writes.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < data.len() {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|afd| nix::unistd::write(afd.get_ref(), &data[written..]).map_err(io_err)) {
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}

impl AsRawFd for AsyncMaster {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

fn io_err(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}
