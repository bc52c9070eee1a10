//! Periodic background sweeps: auto-switchover, chat cleanup, the
//! playlist track cap, and viewer-counter reconciliation.
//!
//! Each sweep runs under a deadline equal to its period; an overrunning
//! pass is abandoned and the next tick skipped rather than queued.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use freshwax_core::bootstrap::Services;

const SWITCHOVER_PERIOD: Duration = Duration::from_secs(30);
const CLEANUP_PERIOD: Duration = Duration::from_secs(60);
const PLAYLIST_PERIOD: Duration = Duration::from_secs(5);
const RECONCILE_PERIOD: Duration = Duration::from_secs(60);

pub fn spawn_background_tasks(
    services: Services,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_loop("switchover", SWITCHOVER_PERIOD, cancel.clone(), {
            let services = services.clone();
            move || {
                let services = services.clone();
                async move { services.session.tick().await.map(|()| ()) }
            }
        }),
        spawn_loop("chat-cleanup", CLEANUP_PERIOD, cancel.clone(), {
            let services = services.clone();
            move || {
                let services = services.clone();
                async move { services.cleanup.run_due().await.map(|_| ()) }
            }
        }),
        spawn_loop("playlist-cap", PLAYLIST_PERIOD, cancel.clone(), {
            let services = services.clone();
            move || {
                let services = services.clone();
                async move { services.playlist.enforce_track_cap().await.map(|_| ()) }
            }
        }),
        spawn_loop("viewer-reconcile", RECONCILE_PERIOD, cancel, {
            let services = services.clone();
            move || {
                let services = services.clone();
                async move {
                    if let Some(live) = services.session.current_live().await? {
                        services
                            .reactions
                            .reconcile_viewers(&live.slot.id)
                            .await?;
                    }
                    Ok(())
                }
            }
        }),
    ]
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut work: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = freshwax_core::Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(task = name, "background task stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match tokio::time::timeout(period, work()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => warn!(task = name, error = %err, "sweep failed"),
                        Err(_) => warn!(task = name, "sweep overran its period, skipping"),
                    }
                }
            }
        }
    })
}
