use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::domain::ports::{OrderStore, OrderStoreArc};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Server-side enforcement of the charge validity window.
///
/// The client countdown is cosmetic; this task applies the guarded
/// `pending_payment -> expired` transition, so an expiry can never race a
/// concurrent confirmation into an illegal overwrite.
pub struct ExpirySweeper {
    orders: OrderStoreArc,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(orders: OrderStoreArc, interval: Duration) -> Self {
        Self { orders, interval }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.orders.expire_overdue(Utc::now()).await {
                        Ok(expired) if !expired.is_empty() => {
                            info!(count = expired.len(), "expired overdue orders");
                        }
                        Ok(_) => {}
                        Err(err) => error!(%err, "expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}
