//! Full-pipeline test: a push delivery in, switch commands out.
//!
//! Exercises the ingress handler, the delivery pipeline, the watcher
//! loop, real command triggers, and the persisted last-alarm record
//! together.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::Request;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use alarmwatch_daemon::config::Settings;
use alarmwatch_daemon::ingress::{IngressState, router};
use alarmwatch_daemon::watch::{
    AlarmTimer, CommandTrigger, LastAlarmStore, PIPELINE_CAPACITY, Watcher,
};
use alarmwatch_daemon::wire::{Alarm, SCHEMA_ENCODING_ATTRIBUTE, Timestamp};

struct Fixture {
    dir: PathBuf,
    log: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("alarmwatch-e2e-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let log = dir.join("switch.log");
        Self { dir, log }
    }

    /// An executable script appending `word` to the switch log.
    fn switch_script(&self, word: &str) -> PathBuf {
        let path = self.dir.join(format!("switch-{word}.sh"));
        fs::write(
            &path,
            format!("#!/bin/sh\necho {word} >> {}\n", self.log.display()),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn switch_count(&self, word: &str) -> usize {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .filter(|line| *line == word)
            .count()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn push_body(alarm: &Alarm, subscription: &str) -> String {
    serde_json::json!({
        "message": {
            "data": BASE64.encode(serde_json::to_vec(alarm).unwrap()),
            "attributes": { SCHEMA_ENCODING_ATTRIBUTE: "JSON" },
            "messageId": "e2e-1",
        },
        "subscription": subscription,
    })
    .to_string()
}

fn settings(fixture: &Fixture, last_alarm_file: &Path) -> Settings {
    Settings {
        subscription_name: "alarms".into(),
        project_id: Some("monitor-test".into()),
        linger_time: Duration::from_millis(500),
        switch_on_cmd: fixture.switch_script("on").display().to_string(),
        switch_off_cmd: fixture.switch_script("off").display().to_string(),
        command_timeout: Duration::from_secs(5),
        last_alarm_file: Some(last_alarm_file.to_path_buf()),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
    }
}

#[tokio::test]
async fn alarm_delivery_switches_on_persists_and_expires() {
    let fixture = Fixture::new();
    let last_alarm_file = fixture.dir.join("last-alarm");
    let settings = settings(&fixture, &last_alarm_file);

    let store = LastAlarmStore::new(settings.last_alarm_file.clone());
    assert_eq!(store.load(), OffsetDateTime::UNIX_EPOCH);

    let timer = AlarmTimer::new(settings.linger_time, store.load())
        .with_store(Box::new(move |t| store.store(t)));
    let switch_on = CommandTrigger::new(settings.switch_on_cmd.as_str(), settings.command_timeout);
    let switch_off =
        CommandTrigger::new(settings.switch_off_cmd.as_str(), settings.command_timeout);

    let (tx, rx) = mpsc::channel(PIPELINE_CAPACITY);
    // Keep the pipeline open after the router (and its sender) is
    // consumed by `oneshot`, so the watcher can reach the standby
    // deadline instead of exiting on pipeline closure.
    let keepalive = tx.clone();
    let shutdown = CancellationToken::new();
    let watcher_task = tokio::spawn(
        Watcher::new(rx, timer, switch_on, switch_off).run(shutdown.clone()),
    );

    let app = router(IngressState::new(settings, tx, shutdown.clone()));

    // Alarm time 1-2s ahead at whole-second granularity: the linger
    // window closes between 1.5s and 2.5s from now.
    let alarm_seconds = OffsetDateTime::now_utc().unix_timestamp() + 2;
    let alarm = Alarm {
        id: 1,
        updated: Some(Timestamp {
            seconds: alarm_seconds,
        }),
        ..Alarm::default()
    };

    let response = app
        .oneshot(
            Request::post("/push")
                .header("content-type", "application/json")
                .body(Body::from(push_body(
                    &alarm,
                    "projects/monitor-test/subscriptions/alarms",
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), http::StatusCode::NO_CONTENT);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fixture.switch_count("on"), 1);
    assert_eq!(fixture.switch_count("off"), 0);

    let persisted = fs::read_to_string(&last_alarm_file).unwrap();
    let persisted = OffsetDateTime::parse(persisted.trim(), &Rfc3339).unwrap();
    assert_eq!(persisted.unix_timestamp(), alarm_seconds);

    tokio::time::sleep(Duration::from_millis(3200)).await;
    assert_eq!(fixture.switch_count("on"), 1);
    assert_eq!(fixture.switch_count("off"), 1);

    drop(keepalive);
    shutdown.cancel();
    watcher_task.await.unwrap();
}
