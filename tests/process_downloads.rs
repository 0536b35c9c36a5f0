//! Media downloads through a fake external downloader
#![cfg(unix)]
// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{
    TEST_TIMEOUT, assert_well_formed, collect_events, fake_tool, isolated_config, pid_alive,
    pool_with_tool, read_pid_file, terminal, wait_for_event,
};
use fetch_dl::{DownloadPool, DownloadRequest, Event, Failure, MediaFormat, TaskState};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MEDIA_URL: &str = "https://www.youtube.com/watch?v=abc123";

fn percents(events: &[Event]) -> Vec<Option<u8>> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::PercentProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn media_url_is_routed_to_the_external_tool() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        dir.path(),
        "mp4",
        r#"echo "[youtube] abc123: Downloading webpage"
echo "[download]  10.0% of 1.00MiB at 1.00MiB/s"
echo "[download]  55.5% of 1.00MiB at 1.00MiB/s" 1>&2
echo "[download] 100% of 1.00MiB"
printf media > "$out""#,
    );
    let out_dir = dir.path().join("videos");

    let (handle, events) = pool_with_tool(dir.path(), tool)
        .submit(DownloadRequest::media(MEDIA_URL, &out_dir, MediaFormat::Video).with_base_name("clip"))
        .unwrap();
    let events = collect_events(events).await;

    assert_well_formed(&events);
    let expected = out_dir.join("clip.mp4");
    assert_eq!(terminal(&events), &Event::Completed { path: expected.clone() });
    assert_eq!(std::fs::read_to_string(&expected).unwrap(), "media");
    assert!(handle.is_completed_successfully());

    let mut seen = percents(&events);
    seen.sort();
    assert_eq!(seen, vec![None, Some(10), Some(56), Some(100)]);
    assert!(!events.iter().any(|e| matches!(e, Event::TitleExtracted { .. })));
}

#[tokio::test]
async fn missing_base_name_uses_the_sanitized_title() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(dir.path(), "mp3", r#"printf audio > "$out""#);

    let (_handle, events) = pool_with_tool(dir.path(), tool)
        .submit_media(DownloadRequest::media(MEDIA_URL, dir.path(), MediaFormat::Audio).with_base_name("   "))
        .unwrap();
    let events = collect_events(events).await;

    assert_well_formed(&events);
    assert!(events.contains(&Event::TitleExtracted {
        title: "Fake_ Title_".into()
    }));
    let expected = dir.path().join("Fake_ Title_.mp3");
    assert_eq!(terminal(&events), &Event::Completed { path: expected.clone() });
    assert!(expected.exists());
}

#[tokio::test]
async fn nonzero_exit_is_reported_with_its_code() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(dir.path(), "mp4", "echo 'ERROR: Video unavailable' 1>&2; exit 2");

    let (handle, events) = pool_with_tool(dir.path(), tool)
        .submit(DownloadRequest::media(MEDIA_URL, dir.path(), MediaFormat::Video).with_base_name("x"))
        .unwrap();
    let events = collect_events(events).await;

    assert_well_formed(&events);
    match terminal(&events) {
        Event::Failed { failure } => {
            assert_eq!(failure, &Failure::ProcessExited { code: Some(2) });
            assert_eq!(failure.to_string(), "process exited with code 2");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(events.contains(&Event::PercentProgress {
        percent: None,
        line: "ERROR: Video unavailable".into()
    }));
    assert_eq!(handle.state(), TaskState::Failed);
}

#[tokio::test]
async fn cancel_kills_the_tree_and_removes_partials() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("helper.pid");
    let tool = fake_tool(
        dir.path(),
        "mp4",
        &format!(
            r#"printf partial > "$out.part"
printf fragment > "${{out%.mp4}}.f137.mp4.part"
printf audio > "${{out%.mp4}}.f251.webm"
sleep 30 &
echo $! > {}
echo "[download]  12.5% of 10.00MiB"
wait"#,
            pid_file.display()
        ),
    );
    let out_dir = dir.path().join("out");

    let (handle, mut events) = pool_with_tool(dir.path(), tool)
        .submit(DownloadRequest::media(MEDIA_URL, &out_dir, MediaFormat::Video).with_base_name("movie"))
        .unwrap();

    wait_for_event(&mut events, |e| {
        matches!(e, Event::PercentProgress { percent: Some(13), .. })
    })
    .await;
    let helper = read_pid_file(&pid_file).await;
    assert!(pid_alive(helper));

    tokio::time::timeout(TEST_TIMEOUT, handle.cancel()).await.unwrap();

    assert_eq!(handle.state(), TaskState::Cancelled);
    assert!(!out_dir.join("movie.mp4.part").exists());
    assert!(!out_dir.join("movie.f137.mp4.part").exists());
    assert!(!out_dir.join("movie.f251.webm").exists());
    assert!(!out_dir.join("movie.mp4").exists());

    let rest = collect_events(events).await;
    assert_eq!(terminal(&rest), &Event::Cancelled { partial_path: None });
    assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);

    for _ in 0..100 {
        if !pid_alive(helper) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!pid_alive(helper), "helper process outlived cancellation");
}

#[tokio::test]
async fn cancel_during_title_lookup_stops_before_spawning() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("downloaded");
    let tool = fake_tool(dir.path(), "mp4", &format!("touch {}", marker.display()));
    // Title lookups hang; the download branch would create the marker
    let slow_title = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--get-title\" ]; then sleep 30; fi\nexec {} \"$@\"\n",
        tool.display()
    );
    let wrapper = dir.path().join("slow-title-yt-dlp");
    std::fs::write(&wrapper, slow_title).unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&wrapper, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let mut config = isolated_config(dir.path());
    config.tools.ytdlp_path = Some(wrapper);
    config.tools.title_timeout = Duration::from_secs(20);
    let pool = DownloadPool::new(config).unwrap();

    let (handle, events) = pool
        .submit(DownloadRequest::media(MEDIA_URL, dir.path(), MediaFormat::Video))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    tokio::time::timeout(TEST_TIMEOUT, handle.cancel()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    let events = collect_events(events).await;
    assert_eq!(terminal(&events), &Event::Cancelled { partial_path: None });
    assert!(!marker.exists());
}

#[tokio::test]
async fn missing_executable_is_tool_not_found() {
    let dir = TempDir::new().unwrap();
    let pool = pool_with_tool(dir.path(), dir.path().join("no-such-yt-dlp"));

    let (_handle, events) = pool
        .submit(DownloadRequest::media(MEDIA_URL, dir.path(), MediaFormat::Video).with_base_name("x"))
        .unwrap();
    let events = collect_events(events).await;

    assert!(matches!(
        terminal(&events),
        Event::Failed {
            failure: Failure::ToolNotFound { .. }
        }
    ));
}

#[tokio::test]
async fn unresolvable_tool_is_tool_not_found() {
    let dir = TempDir::new().unwrap();
    let pool = DownloadPool::new(isolated_config(dir.path())).unwrap();

    let (_handle, events) = pool
        .submit(DownloadRequest::media(MEDIA_URL, dir.path(), MediaFormat::Audio))
        .unwrap();
    let events = collect_events(events).await;

    match terminal(&events) {
        Event::Failed {
            failure: Failure::ToolNotFound { tool, .. },
        } => assert_eq!(tool, "yt-dlp"),
        other => panic!("expected ToolNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_tears_down_running_media_downloads() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(dir.path(), "mp4", "echo '[download]   1.0%'; sleep 30");
    let pool = pool_with_tool(dir.path(), tool);

    let (handle, mut events) = pool
        .submit(DownloadRequest::media(MEDIA_URL, dir.path(), MediaFormat::Video).with_base_name("x"))
        .unwrap();
    wait_for_event(&mut events, |e| matches!(e, Event::PercentProgress { .. })).await;
    assert_eq!(pool.in_flight(), 1);

    tokio::time::timeout(TEST_TIMEOUT, pool.shutdown()).await.unwrap();

    assert_eq!(handle.state(), TaskState::Cancelled);
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn explicit_base_name_cannot_escape_the_output_dir() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(dir.path(), "mp4", r#"printf media > "$out""#);
    let out_dir = dir.path().join("videos");

    let (_handle, events) = pool_with_tool(dir.path(), tool)
        .submit(
            DownloadRequest::media(MEDIA_URL, &out_dir, MediaFormat::Video)
                .with_base_name("../escaped: name?"),
        )
        .unwrap();
    let events = collect_events(events).await;

    let expected = out_dir.join(".._escaped_ name_.mp4");
    assert_eq!(terminal(&events), &Event::Completed { path: expected.clone() });
    assert!(expected.is_file());
    assert!(!dir.path().join("escaped: name?.mp4").exists());
}

#[tokio::test]
async fn cancelled_task_does_not_duplicate_the_tool_fetch() {
    let staging = TempDir::new().unwrap();
    let script = std::fs::read(fake_tool(staging.path(), "mp4", r#"printf media > "$out""#)).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/yt-dlp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(script)
                .set_delay(Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = isolated_config(dir.path());
    config.tools.auto_fetch = true;
    config.tools.fetch_url = format!("{}/yt-dlp", server.uri());
    let installed = config.tools.bin_dir.join("yt-dlp");
    let pool = DownloadPool::new(config).unwrap();

    let (first, first_events) = pool
        .submit(DownloadRequest::media(MEDIA_URL, dir.path().join("a"), MediaFormat::Video).with_base_name("a"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    tokio::time::timeout(TEST_TIMEOUT, first.cancel()).await.unwrap();
    assert_eq!(first.state(), TaskState::Cancelled);
    assert_eq!(
        terminal(&collect_events(first_events).await),
        &Event::Cancelled { partial_path: None }
    );

    let (second, second_events) = pool
        .submit(DownloadRequest::media(MEDIA_URL, dir.path().join("b"), MediaFormat::Video).with_base_name("b"))
        .unwrap();
    let events = collect_events(second_events).await;

    assert_eq!(
        terminal(&events),
        &Event::Completed {
            path: dir.path().join("b").join("b.mp4")
        }
    );
    assert!(second.is_completed_successfully());
    assert!(installed.is_file());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
