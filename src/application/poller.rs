use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{OrderStore, OrderStoreArc};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Time between status reads.
    pub interval: Duration,
    /// Wall-clock countdown, independent of the polling cadence.
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed,
    Expired,
    Cancelled,
}

/// One-time client-side reactions to a polling session.
pub trait ConfirmationHooks: Send {
    /// Fired once when the order is first observed settled: navigate to the
    /// confirmation view, emit the client-side purchase event.
    fn on_confirmed(&mut self, order: &Order);

    /// Fired when the countdown elapses without a settlement. Surfaces the
    /// expired UX state only; it never mutates the order.
    fn on_expired(&mut self);
}

/// The client-side confirmation observer: a cooperative polling loop that
/// reads order state on a fixed interval and reacts exactly once.
///
/// Session state (the fired flag, the timers) lives inside `watch`, scoped
/// to one call; nothing is shared between polling sessions.
pub struct ConfirmationPoller {
    orders: OrderStoreArc,
    config: PollerConfig,
}

impl ConfirmationPoller {
    pub fn new(orders: OrderStoreArc, config: PollerConfig) -> Self {
        Self { orders, config }
    }

    pub async fn watch(
        &self,
        order_id: OrderId,
        mut cancel: watch::Receiver<bool>,
        hooks: &mut dyn ConfirmationHooks,
    ) -> PollOutcome {
        let deadline = time::Instant::now() + self.config.timeout;
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fired = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.orders.get(order_id).await {
                        Ok(Some(order)) if order.is_settled() => {
                            if !fired {
                                fired = true;
                                hooks.on_confirmed(&order);
                            }
                            return PollOutcome::Confirmed;
                        }
                        Ok(_) => {}
                        // Transport errors are never fatal to the session;
                        // the next tick simply retries.
                        Err(err) => debug!(%order_id, %err, "poll failed, retrying next tick"),
                    }
                }
                _ = time::sleep_until(deadline) => {
                    hooks.on_expired();
                    return PollOutcome::Expired;
                }
                changed = cancel.changed() => {
                    // Unmount: the sender flipped the flag or went away.
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }
    }
}
