//! Process-tree supervision for the external downloader.
//!
//! The child is started as the leader of a fresh process group (a new
//! console process group on Windows). Every helper it launches, such as an
//! ffmpeg remux, inherits that group, so the group id is the complete set of
//! processes this task owns and terminating it is a single group signal.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, Command};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};

/// Interval between liveness checks while waiting for a group to exit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A spawned process and everything it spawns
pub(crate) struct ProcessTree {
    child: Child,
    /// Process id of the leader, which is also the process group id
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
}

impl ProcessTree {
    /// Spawn `command` in its own process group with piped stdio
    ///
    /// Returns the tree and a stream of output lines, stdout and stderr
    /// interleaved in arrival order.
    pub(crate) fn spawn(
        mut command: Command,
    ) -> io::Result<(Self, impl Stream<Item = io::Result<String>> + Unpin + Send)> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout pipe missing"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr pipe missing"))?;

        let stdout = SplitStream::new(tokio::io::AsyncBufReadExt::split(BufReader::new(stdout), b'\n'));
        let stderr = SplitStream::new(tokio::io::AsyncBufReadExt::split(BufReader::new(stderr), b'\n'));
        let lines = stdout.merge(stderr).map(|segment| {
            segment.map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .trim_end_matches(['\r', '\n'])
                    .to_string()
            })
        });

        tracing::debug!(pid = ?pid, "spawned external downloader");
        Ok((Self { child, pid, stdin }, lines))
    }

    /// Wait for the leader to exit
    pub(crate) async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await;
        self.stdin.take();
        status
    }

    /// Terminate the whole tree
    ///
    /// Sends a graceful termination request to every process in the group,
    /// waits up to `grace` for the group to disappear, then force-kills
    /// whatever is left, including the leader.
    pub(crate) async fn terminate(&mut self, grace: Duration) {
        // Closing stdin first lets well-behaved tools notice the hangup
        self.stdin.take();

        let Some(pid) = self.pid else {
            // Already reaped; nothing left to signal
            let _ = self.child.wait().await;
            return;
        };

        signal_group(pid, Signal::Terminate).await;

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let leader_exited = matches!(self.child.try_wait(), Ok(Some(_)));
            if leader_exited && !group_alive(pid) {
                tracing::debug!(pid, "process tree exited after termination request");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        tracing::warn!(pid, grace = ?grace, "process tree still running after grace period, killing");
        signal_group(pid, Signal::Kill).await;
        if let Err(e) = self.child.kill().await {
            tracing::debug!(pid, error = %e, "leader already gone");
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
async fn signal_group(pgid: u32, signal: Signal) {
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = i32::try_from(pgid) else {
        return;
    };

    // SAFETY: kill(2) with a negative pid signals the process group; it takes plain
    // integers and touches no memory. ESRCH (group already gone) is expected and ignored.
    let rc = unsafe { libc::kill(-pgid, signo) };
    if rc != 0 {
        tracing::debug!(pgid, ?signal, error = %io::Error::last_os_error(), "group signal not delivered");
    }
}

#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    let Ok(pgid) = i32::try_from(pgid) else {
        return false;
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    unsafe { libc::kill(-pgid, 0) == 0 }
}

#[cfg(windows)]
async fn signal_group(pid: u32, signal: Signal) {
    let pid = pid.to_string();
    let mut args = vec!["/PID", pid.as_str(), "/T"];
    if matches!(signal, Signal::Kill) {
        args.push("/F");
    }
    let result = Command::new("taskkill")
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::debug!(pid = %pid, ?signal, error = %e, "taskkill failed");
    }
}

#[cfg(windows)]
fn group_alive(_pid: u32) -> bool {
    // taskkill /T addresses descendants by parentage; once the leader is reaped there
    // is no group left to query
    false
}

#[cfg(not(any(unix, windows)))]
async fn signal_group(_pid: u32, _signal: Signal) {}

#[cfg(not(any(unix, windows)))]
fn group_alive(_pid: u32) -> bool {
    false
}
