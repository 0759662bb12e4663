//! Descriptor-level capture of standard output and standard error.
//!
//! A [`StreamRedirect`] swaps descriptor 1 or 2 for the write end of a pipe,
//! while a dedicated drain thread copies everything arriving on the read end
//! into memory. Draining runs concurrently with the caller's action, so large
//! outputs never block on a full pipe buffer.
//!
//! The descriptor is process-wide state: only one capture per stream may be
//! active at a time. Tests that capture the same stream must not run in
//! parallel (mark them `#[serial]`), or should write to a
//! [`SharedBuffer`](super::SharedBuffer) instead.
//!
//! Inside `#[test]` functions the `print!` family is intercepted by the test
//! harness (unless `--nocapture` is given) and never reaches the descriptor.
//! Write through `std::io::stdout()`/`std::io::stderr()` or from child
//! processes to have output captured.
//!
//! There is no timeout: an action that never returns, or a child process that
//! keeps the inherited descriptor open after the action, hangs the capture.
//!
//! If the action panics, the redirection is still undone while unwinding and
//! the drain thread is joined; the partial output is discarded.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};

use super::types::{CaptureState, CapturedOutput, StdioStream};
use crate::error_handling::types::CaptureError;

/// Number of redirections currently installed per stream.
static ACTIVE_REDIRECTS: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];

type DrainHandle = JoinHandle<io::Result<Vec<u8>>>;

/// One redirected stream: the saved original descriptor, the drain worker
/// that owns the pipe's read end, and the worker's accumulated bytes.
#[derive(Debug)]
pub struct StreamRedirect {
    stream: StdioStream,
    saved: Option<OwnedFd>,
    drain: Option<DrainHandle>,
    state: CaptureState,
}

impl StreamRedirect {
    /// Redirects `stream` into a fresh pipe and starts draining it.
    pub fn begin(stream: StdioStream) -> Result<Self, CaptureError> {
        let target = target_fd(stream);
        let (read_end, write_end) = create_pipe().map_err(CaptureError::PipeFailed)?;
        let saved = dup_cloexec(target).map_err(CaptureError::RedirectFailed)?;
        let drain = spawn_drain(stream, read_end).map_err(CaptureError::PipeFailed)?;

        let mut redirect = StreamRedirect {
            stream,
            saved: Some(saved),
            drain: Some(drain),
            state: CaptureState::Idle,
        };

        if ACTIVE_REDIRECTS[stream.index()].fetch_add(1, Ordering::SeqCst) > 0 {
            warn!(
                "[{}] capture started while another capture of the same stream is active",
                stream
            );
        }

        flush_std(stream);
        if let Err(e) = dup2(write_end.as_raw_fd(), target) {
            ACTIVE_REDIRECTS[stream.index()].fetch_sub(1, Ordering::SeqCst);
            // Dropping our write end gives the drain worker its EOF.
            drop(write_end);
            redirect.state = CaptureState::Draining;
            let _ = redirect.join_drain();
            return Err(CaptureError::RedirectFailed(e));
        }
        // The target descriptor now holds the only write end of the pipe.
        drop(write_end);
        redirect.state = CaptureState::Redirecting;
        Ok(redirect)
    }

    pub fn stream(&self) -> StdioStream {
        self.stream
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Puts the original descriptor back, which closes the last write end of
    /// the pipe. Calling it again is a no-op.
    pub fn restore(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Redirecting {
            return Ok(());
        }
        flush_std(self.stream);
        self.state = CaptureState::Draining;
        ACTIVE_REDIRECTS[self.stream.index()].fetch_sub(1, Ordering::SeqCst);

        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        if let Err(e) = dup2(saved.as_raw_fd(), target_fd(self.stream)) {
            // The pipe is still installed, so the worker would never see EOF.
            self.drain = None;
            return Err(CaptureError::RedirectFailed(e));
        }
        Ok(())
    }

    /// Restores the stream, waits for the drain worker and returns every
    /// byte written while the redirection was installed.
    pub fn finish(mut self) -> Result<Vec<u8>, CaptureError> {
        self.restore()?;
        self.join_drain()
    }

    fn join_drain(&mut self) -> Result<Vec<u8>, CaptureError> {
        let Some(handle) = self.drain.take() else {
            self.state = CaptureState::Restored;
            return Ok(Vec::new());
        };
        let joined = handle.join();
        self.state = CaptureState::Restored;
        match joined {
            Ok(Ok(bytes)) => {
                trace!("[{}] drained {} captured bytes", self.stream, bytes.len());
                Ok(bytes)
            }
            Ok(Err(e)) => Err(CaptureError::DrainFailed(e)),
            Err(payload) => Err(CaptureError::DrainPanicked(panic_message(&*payload))),
        }
    }
}

impl Drop for StreamRedirect {
    fn drop(&mut self) {
        if self.state == CaptureState::Redirecting {
            let _ = self.restore();
            debug!("[{}] capture restored during unwind", self.stream);
        }
        if self.drain.is_some() {
            let _ = self.join_drain();
        }
    }
}

/// Runs `f` with `stream` redirected and returns its result together with
/// the captured bytes.
pub fn try_capture<F, R>(stream: StdioStream, f: F) -> Result<(R, Vec<u8>), CaptureError>
where
    F: FnOnce() -> R,
{
    let redirect = StreamRedirect::begin(stream)?;
    let value = f();
    let bytes = redirect.finish()?;
    Ok((value, bytes))
}

/// Runs `f` with both streams redirected. Both drain workers are started
/// before `f` runs and both write ends are closed before either is joined.
pub fn try_capture_stdout_and_stderr<F, R>(f: F) -> Result<(R, CapturedOutput), CaptureError>
where
    F: FnOnce() -> R,
{
    let mut stdout = StreamRedirect::begin(StdioStream::Stdout)?;
    let mut stderr = StreamRedirect::begin(StdioStream::Stderr)?;

    let value = f();

    let restored_out = stdout.restore();
    let restored_err = stderr.restore();
    restored_out?;
    restored_err?;

    let out = stdout.finish();
    let err = stderr.finish();
    Ok((
        value,
        CapturedOutput {
            stdout: out?,
            stderr: err?,
        },
    ))
}

/// Captures raw bytes written to `stream` by `f`. Panics if the capture
/// cannot be set up or drained.
pub fn capture_bytes<F: FnOnce()>(stream: StdioStream, f: F) -> Vec<u8> {
    match try_capture(stream, f) {
        Ok(((), bytes)) => bytes,
        Err(e) => panic!("failed to capture {}: {}", stream, e),
    }
}

/// Captures text written to `stream` by `f`. Invalid UTF-8 is replaced;
/// use [`capture_bytes`] for binary output.
pub fn capture<F: FnOnce()>(stream: StdioStream, f: F) -> String {
    String::from_utf8_lossy(&capture_bytes(stream, f)).into_owned()
}

pub fn capture_stdout<F: FnOnce()>(f: F) -> String {
    capture(StdioStream::Stdout, f)
}

pub fn capture_stderr<F: FnOnce()>(f: F) -> String {
    capture(StdioStream::Stderr, f)
}

pub fn capture_stdout_bytes<F: FnOnce()>(f: F) -> Vec<u8> {
    capture_bytes(StdioStream::Stdout, f)
}

pub fn capture_stderr_bytes<F: FnOnce()>(f: F) -> Vec<u8> {
    capture_bytes(StdioStream::Stderr, f)
}

/// Captures both streams and returns `(stdout, stderr)` as text.
pub fn capture_stdout_and_stderr<F: FnOnce()>(f: F) -> (String, String) {
    let output = capture_stdout_and_stderr_bytes(f);
    (output.stdout_string(), output.stderr_string())
}

pub fn capture_stdout_and_stderr_bytes<F: FnOnce()>(f: F) -> CapturedOutput {
    match try_capture_stdout_and_stderr(f) {
        Ok(((), output)) => output,
        Err(e) => panic!("failed to capture stdout and stderr: {}", e),
    }
}

fn target_fd(stream: StdioStream) -> RawFd {
    match stream {
        StdioStream::Stdout => libc::STDOUT_FILENO,
        StdioStream::Stderr => libc::STDERR_FILENO,
    }
}

/// Pushes out anything the standard library still buffers for `stream`, so
/// it lands on whichever destination the descriptor currently points at.
fn flush_std(stream: StdioStream) {
    let _ = match stream {
        StdioStream::Stdout => io::stdout().flush(),
        StdioStream::Stderr => io::stderr().flush(),
    };
}

fn spawn_drain(stream: StdioStream, read_end: OwnedFd) -> io::Result<DrainHandle> {
    thread::Builder::new()
        .name(format!("capture-{}", stream))
        .spawn(move || {
            let mut reader = File::from(read_end);
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(buf)
        })
}

fn create_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    // SAFETY: `fds` is a valid buffer for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) succeeded, both descriptors are open and owned by us.
    let (read_end, write_end) =
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_cloexec(read_end.as_raw_fd())?;
    set_cloexec(write_end.as_raw_fd())?;
    Ok((read_end, write_end))
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no pointers involved.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: duplicating a standard descriptor; the result is checked below.
    let duplicate = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if duplicate < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `duplicate` is a freshly opened descriptor nobody else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(duplicate) })
}

fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: both descriptors are valid for the duration of the call.
        if unsafe { libc::dup2(src, dst) } >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::panic;

    fn write_out(bytes: &[u8]) {
        let mut out = io::stdout();
        out.write_all(bytes).unwrap();
        out.flush().unwrap();
    }

    fn write_err(bytes: &[u8]) {
        io::stderr().write_all(bytes).unwrap();
    }

    /// (device, inode) of whatever the descriptor currently refers to.
    fn fd_identity(fd: RawFd) -> (u64, u64) {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::fstat(fd, &mut st) }, 0);
        (st.st_dev as u64, st.st_ino as u64)
    }

    #[test]
    #[serial]
    fn captures_exact_stdout_text() {
        let out = capture_stdout(|| write_out(b"hello, capture\n"));
        assert_eq!(out, "hello, capture\n");
    }

    #[test]
    #[serial]
    fn captures_exact_stderr_text() {
        let err = capture_stderr(|| write_err(b"something went wrong\n"));
        assert_eq!(err, "something went wrong\n");
    }

    #[test]
    #[serial]
    fn preserves_write_order() {
        let out = capture_stdout(|| {
            write_out(b"first ");
            write_out(b"second");
        });
        assert_eq!(out, "first second");
    }

    #[test]
    #[serial]
    fn empty_action_yields_empty_string() {
        assert_eq!(capture_stdout(|| {}), "");
        assert_eq!(capture_stderr(|| {}), "");
    }

    #[test]
    #[serial]
    fn unflushed_partial_line_is_captured() {
        let out = capture_stdout(|| {
            io::stdout().write_all(b"no newline here").unwrap();
        });
        assert_eq!(out, "no newline here");
    }

    #[test]
    #[serial]
    fn large_payload_is_not_truncated() {
        let payload = "x".repeat(100_000);
        let out = capture_stdout(|| {
            write_out(payload.as_bytes());
            write_out(b"\n");
        });
        assert_eq!(out.len(), 100_001);
        assert_eq!(out, format!("{}\n", payload));
    }

    #[test]
    #[serial]
    fn binary_output_round_trips() {
        let data: Vec<u8> = vec![0x00, 0x01, 0xff, 0xfe, b'\n', 0x00, 0x80, 0x7f];
        let out = capture_stdout_bytes(|| write_out(&data));
        assert_eq!(out, data);
    }

    #[test]
    #[serial]
    fn concurrent_writers_all_land() {
        let out = capture_stdout(|| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    thread::spawn(move || {
                        let line = format!("writer {} done\n", i);
                        io::stdout().write_all(line.as_bytes()).unwrap();
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
        for i in 0..8 {
            assert!(out.contains(&format!("writer {} done\n", i)), "missing writer {}", i);
        }
    }

    #[test]
    #[serial]
    fn dual_capture_keeps_streams_apart() {
        let (out, err) = capture_stdout_and_stderr(|| {
            write_out(b"to stdout\n");
            write_err(b"to stderr\n");
        });
        assert_eq!(out, "to stdout\n");
        assert_eq!(err, "to stderr\n");
    }

    #[test]
    #[serial]
    fn dual_capture_only_stdout() {
        let (out, err) = capture_stdout_and_stderr(|| write_out(b"only out"));
        assert_eq!(out, "only out");
        assert_eq!(err, "");
    }

    #[test]
    #[serial]
    fn dual_capture_only_stderr() {
        let (out, err) = capture_stdout_and_stderr(|| write_err(b"only err"));
        assert_eq!(out, "");
        assert_eq!(err, "only err");
    }

    #[test]
    #[serial]
    fn dual_capture_large_payloads_on_both_streams() {
        let big = vec![b'y'; 256 * 1024];
        let output = capture_stdout_and_stderr_bytes(|| {
            write_out(&big);
            write_err(&big);
        });
        assert_eq!(output.stdout.len(), big.len());
        assert_eq!(output.stderr, big);
    }

    #[test]
    #[serial]
    fn try_capture_returns_action_value() {
        let (value, bytes) = try_capture(StdioStream::Stdout, || {
            write_out(b"42");
            42
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(bytes, b"42");
    }

    #[test]
    #[serial]
    fn child_process_output_is_captured() {
        let out = capture_stdout(|| {
            let status = std::process::Command::new("sh")
                .arg("-c")
                .arg("printf 'from child'")
                .status()
                .unwrap();
            assert!(status.success());
        });
        assert_eq!(out, "from child");
    }

    #[test]
    #[serial]
    fn stream_is_restored_after_capture() {
        let before = fd_identity(libc::STDOUT_FILENO);
        let _ = capture_stdout(|| write_out(b"inside"));
        assert_eq!(fd_identity(libc::STDOUT_FILENO), before);

        let (_, _) = capture_stdout_and_stderr(|| {});
        assert_eq!(fd_identity(libc::STDOUT_FILENO), before);
    }

    #[test]
    #[serial]
    fn consecutive_captures_do_not_leak_into_each_other() {
        let first = capture_stdout(|| write_out(b"one"));
        let second = capture_stdout(|| write_out(b"two"));
        assert_eq!(first, "one");
        assert_eq!(second, "two");
    }

    #[test]
    #[serial]
    fn panicking_action_still_restores_stream() {
        let before = fd_identity(libc::STDOUT_FILENO);
        let result = panic::catch_unwind(|| {
            capture_stdout(|| {
                write_out(b"lost");
                panic!("action failed");
            })
        });
        assert!(result.is_err());
        assert_eq!(fd_identity(libc::STDOUT_FILENO), before);

        let out = capture_stdout(|| write_out(b"after panic"));
        assert_eq!(out, "after panic");
    }

    #[test]
    #[serial]
    fn handle_walks_through_states() {
        let mut redirect = StreamRedirect::begin(StdioStream::Stdout).unwrap();
        assert_eq!(redirect.state(), CaptureState::Redirecting);
        assert_eq!(redirect.stream(), StdioStream::Stdout);
        write_out(b"state");
        redirect.restore().unwrap();
        assert_eq!(redirect.state(), CaptureState::Draining);
        redirect.restore().unwrap();
        assert_eq!(redirect.finish().unwrap(), b"state");
    }
}
