// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session backends: a native PTY spawned via `forkpty`+`execvp`, with a
//! piped-process fallback when PTY allocation fails.

use std::ffi::CString;
use std::future::Future;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, Pid};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::nbio::AsyncMaster;
use crate::domain::TransportMode;

/// A session backend's exit, as observed by the reaper.
#[derive(Debug, Clone, Copy)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// A running session backend: PTY or pipe. `run` owns the backend for the
/// whole session lifetime and multiplexes output, input, and resize
/// requests internally, since `resize` needs `&mut self` access to the PTY
/// fd that only the owning task holds once spawned.
pub trait Backend: Send + 'static {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<Bytes>,
        resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>;

    fn child_pid(&self) -> Option<u32>;
}

/// Native PTY backend.
pub struct NativePty {
    master: AsyncMaster,
    child_pid: Pid,
}

impl NativePty {
    #[allow(unsafe_code)]
    pub fn spawn(command: &[String], cwd: &Path, cols: u16, rows: u16) -> anyhow::Result<Self> {
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty's child side is partially initialized until exec.
        match unsafe { forkpty(&winsize, None) }? {
            ForkptyResult::Child => {
                std::env::set_var("TERM", "xterm-256color");
                let _ = std::env::set_current_dir(cwd);
                let c_args: Vec<CString> = command.iter().map(|s| CString::new(s.as_bytes())).collect::<Result<_, _>>()?;
                execvp(&c_args[0], &c_args)?;
                unreachable!();
            }
            ForkptyResult::Parent { child, master } => {
                let master = AsyncMaster::new(master)?;
                Ok(Self { master, child_pid: child })
            }
        }
    }

    #[allow(unsafe_code)]
    fn apply_resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: TIOCSWINSZ is a well-defined ioctl on a valid PTY master fd.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            anyhow::bail!("TIOCSWINSZ ioctl failed: {}", std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Backend for NativePty {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        let pid = self.child_pid;
        Box::pin(async move {
            let mut buf = vec![0u8; 8192];
            let mut input_closed = false;

            loop {
                tokio::select! {
                    result = self.master.read_chunk(&mut buf) => {
                        match result {
                            Ok(0) => break,
                            Ok(n) => {
                                if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    input = input_rx.recv(), if !input_closed => {
                        match input {
                            Some(data) => self.master.write_all(&data).await?,
                            None => input_closed = true,
                        }
                    }
                    Some((cols, rows)) = resize_rx.recv() => {
                        let _ = self.apply_resize(cols, rows);
                    }
                }
            }

            let status = tokio::task::spawn_blocking(move || wait_for_exit(pid)).await??;
            Ok(status)
        })
    }

    fn child_pid(&self) -> Option<u32> {
        Some(self.child_pid.as_raw() as u32)
    }
}

impl Drop for NativePty {
    fn drop(&mut self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }
}

fn wait_for_exit(pid: Pid) -> anyhow::Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus { code: Some(code), signal: None }),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ExitStatus { code: None, signal: Some(sig as i32) }),
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => anyhow::bail!("waitpid failed: {e}"),
        }
    }
}

/// Piped-process fallback used when `forkpty` fails: no real terminal, so
/// the manager synthesizes a `$ <input>` echo since the child gives none.
/// `resize` is a no-op (consumed and discarded), per the pipe-transport
/// contract.
pub struct PipeBackend {
    child: Child,
}

impl PipeBackend {
    pub fn spawn(command: &[String], cwd: &Path) -> anyhow::Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| anyhow::anyhow!("empty terminal command"))?;
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Self { child })
    }
}

impl Backend for PipeBackend {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        Box::pin(async move {
            let mut stdout = self.child.stdout.take().ok_or_else(|| anyhow::anyhow!("pipe child missing stdout"))?;
            let mut stderr = self.child.stderr.take().ok_or_else(|| anyhow::anyhow!("pipe child missing stderr"))?;
            let mut stdin = self.child.stdin.take().ok_or_else(|| anyhow::anyhow!("pipe child missing stdin"))?;

            // stderr is merged into the same output stream; a pipe session
            // has no terminal to separate the two anyway.
            let reader = {
                let output_tx = output_tx.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    loop {
                        match stdout.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                })
            };
            let err_reader = {
                let output_tx = output_tx.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    loop {
                        match stderr.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if output_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                })
            };

            let writer = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        input = input_rx.recv() => {
                            match input {
                                Some(data) => {
                                    let echo = format!("$ {}", String::from_utf8_lossy(&data));
                                    let _ = output_tx.send(Bytes::from(echo)).await;
                                    if stdin.write_all(&data).await.is_err() {
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }
                        // resize is a no-op for pipe transport; drain so senders never block
                        _ = resize_rx.recv() => {}
                    }
                }
            });

            let status = self.child.wait().await?;
            // The writer blocks on the session's input channel, which stays
            // open for the session's lifetime; reap it rather than await it.
            writer.abort();
            let _ = reader.await;
            let _ = err_reader.await;
            Ok(ExitStatus { code: status.code(), signal: None })
        })
    }

    fn child_pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Spawn a session backend, attempting PTY first and falling back to a
/// plain pipe on any `forkpty`/`execvp` failure.
pub fn spawn_backend(command: &[String], cwd: &Path, cols: u16, rows: u16) -> anyhow::Result<(Box<dyn Backend>, TransportMode)> {
    match NativePty::spawn(command, cwd, cols, rows) {
        Ok(pty) => Ok((Box::new(pty), TransportMode::Pty)),
        Err(err) => {
            tracing::warn!(error = %err, "pty spawn failed, falling back to pipe transport");
            let pipe = PipeBackend::spawn(command, cwd)?;
            Ok((Box::new(pipe), TransportMode::Pipe))
        }
    }
}
