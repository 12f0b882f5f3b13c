//! Periodic transport status polling

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Player, PlayerInner};

/// Poll the engine every `interval` until the player is dropped
pub(super) fn spawn_status_poller(player: Weak<PlayerInner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(inner) = player.upgrade() else {
                break;
            };
            Player { inner }.sync_status().await;
        }

        tracing::debug!("Status poller stopped");
    })
}
