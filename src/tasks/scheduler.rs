use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::tasks::maintenance;

const NOTIFICATION_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweep_every = Duration::from_secs(state.settings().exam().expired_attempt_sweep_seconds);
    let handles = vec![
        tokio::spawn(expire_attempts_loop(state.clone(), sweep_every, shutdown_rx.clone())),
        tokio::spawn(prune_notifications_loop(state.clone(), shutdown_rx.clone())),
    ];

    tracing::info!(sweep_seconds = sweep_every.as_secs(), "Worker started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn expire_attempts_loop(
    state: AppState,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::auto_submit_expired_attempts(&state).await {
                    tracing::error!(error = %err, "auto_submit_expired_attempts failed");
                }
            }
        }
    }
}

async fn prune_notifications_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(NOTIFICATION_PRUNE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::prune_read_notifications(&state).await {
                    tracing::error!(error = %err, "prune_read_notifications failed");
                }
            }
        }
    }
}
