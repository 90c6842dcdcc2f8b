//! alarmwatchd: the alarm-driven standby switch daemon.
//!
//! Wires the push-delivery ingress to the watcher: alarms keep the
//! switch on, and the configured linger time after the last alarm
//! switches it off again.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use alarmwatch_daemon::config::Settings;
use alarmwatch_daemon::ingress::{self, IngressState};
use alarmwatch_daemon::watch::{
    AlarmTimer, CommandTrigger, LastAlarmStore, PIPELINE_CAPACITY, Watcher,
};

#[tokio::main]
async fn main() -> Result<()> {
    alarmwatch_daemon::tracing::init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let store = LastAlarmStore::new(settings.last_alarm_file.clone());
    let last_update = store.load();
    let timer = AlarmTimer::new(settings.linger_time, last_update)
        .with_store(Box::new(move |t| store.store(t)));

    let switch_on = CommandTrigger::new(settings.switch_on_cmd.as_str(), settings.command_timeout);
    let switch_off =
        CommandTrigger::new(settings.switch_off_cmd.as_str(), settings.command_timeout);

    let (pipeline_tx, pipeline_rx) = mpsc::channel(PIPELINE_CAPACITY);
    let shutdown = CancellationToken::new();

    let watcher = Watcher::new(pipeline_rx, timer, switch_on, switch_off);
    let watcher_task = tokio::spawn(watcher.run(shutdown.clone()));

    let listener = TcpListener::bind(settings.listen_addr)
        .await
        .with_context(|| format!("could not bind {}", settings.listen_addr))?;
    info!(
        addr = %settings.listen_addr,
        subscription = %settings.subscription_name,
        "listening for alarm deliveries"
    );

    let state = IngressState::new(settings, pipeline_tx, shutdown.clone());
    let server_task = tokio::spawn(ingress::serve(listener, state, shutdown.clone()));

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
    info!("shutdown requested");

    shutdown.cancel();
    if let Err(err) = server_task.await.context("joining ingress task")? {
        error!(%err, "ingress server error");
    }
    watcher_task.await.context("joining watcher task")?;
    info!("shutdown complete");

    Ok(())
}
