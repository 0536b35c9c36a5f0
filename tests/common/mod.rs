//! Common test utilities for fetch-dl integration tests

#![allow(dead_code)]

use fetch_dl::{Config, DownloadPool, Event, EventReceiver, ToolsConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for any single wait in these tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Receive every event until the channel closes
///
/// Panics if the task does not finish within [`TEST_TIMEOUT`].
pub async fn collect_events(mut events: EventReceiver) -> Vec<Event> {
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout(TEST_TIMEOUT, events.recv()).await {
            Ok(Some(event)) => out.push(event),
            Ok(None) => return out,
            Err(_) => panic!("timed out waiting for events; received so far: {out:?}"),
        }
    }
}

/// Receive events until one matches `predicate`, returning it
pub async fn wait_for_event<F>(events: &mut EventReceiver, mut predicate: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    let wait = async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return event;
            }
        }
        panic!("event channel closed before the expected event arrived");
    };
    tokio::time::timeout(TEST_TIMEOUT, wait)
        .await
        .expect("timed out waiting for event")
}

/// Assert the ordering contract
///
/// Started appears at most once and only first (HTTP tasks that fail or are
/// cancelled while connecting never start), and exactly one terminal event
/// closes the sequence.
pub fn assert_well_formed(events: &[Event]) {
    let started: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Started { .. }))
        .map(|(i, _)| i)
        .collect();
    assert!(
        started.is_empty() || started == [0],
        "Started must appear at most once, first: {events:?}"
    );
    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1, "expected exactly one terminal event: {events:?}");
    assert!(
        events.last().is_some_and(Event::is_terminal),
        "terminal event must be last: {events:?}"
    );
}

/// The terminal event of a finished task
pub fn terminal(events: &[Event]) -> &Event {
    events.last().expect("no events received")
}

/// Pool whose tool lookup never leaves `dir` or touches the network
pub fn isolated_config(dir: &Path) -> Config {
    Config {
        tools: ToolsConfig {
            bundled_dir: dir.join("bundled"),
            bin_dir: dir.join("bin"),
            search_path: false,
            auto_fetch: false,
            title_timeout: Duration::from_secs(5),
            kill_grace_period: Duration::from_millis(500),
            ..ToolsConfig::default()
        },
        ..Config::default()
    }
}

/// Pool using the given executable as the external downloader
pub fn pool_with_tool(dir: &Path, tool: PathBuf) -> DownloadPool {
    let mut config = isolated_config(dir);
    config.tools.ytdlp_path = Some(tool);
    DownloadPool::new(config).expect("valid config")
}

/// Write an executable shell script impersonating the external downloader
///
/// The script sees the same arguments the real tool would. `$out` holds the
/// output template with `%(ext)s` replaced by `ext`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, ext: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--get-title" ]; then
  echo 'Fake: Title?'
  exit 0
fi
prev=""
template=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then template="$a"; fi
  prev="$a"
done
out=$(printf '%s' "$template" | sed 's/%(ext)s/{ext}/')
{body}
"#
    );

    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, script).expect("write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod fake tool");
    path
}

/// Whether a process is still running (zombies count as exited)
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        return stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X");
    }
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Poll `path` until it holds a pid
pub async fn read_pid_file(path: &Path) -> u32 {
    for _ in 0..250 {
        if let Ok(text) = std::fs::read_to_string(path)
            && let Ok(pid) = text.trim().parse()
        {
            return pid;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pid file {} never appeared", path.display());
}
