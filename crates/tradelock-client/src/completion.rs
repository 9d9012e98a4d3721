//! Cross-view "trade completed" broadcast.
//!
//! Any component that learns a trade finished (another view, a global
//! notification) publishes its id on the bus. Sessions subscribe on mount and
//! drop the subscription on unmount, so there is no ambient listener.

use tokio::sync::broadcast;
use tracing::debug;
use tradelock_core::TradeId;

/// Default buffered completions per subscriber.
const DEFAULT_CAPACITY: usize = 16;

/// Broadcast of completed trade ids.
#[derive(Debug, Clone)]
pub struct CompletionBus {
    tx: broadcast::Sender<TradeId>,
}

impl Default for CompletionBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CompletionBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce that `trade_id` completed. Returns the number of subscribers
    /// that will see it.
    pub fn publish(&self, trade_id: TradeId) -> usize {
        let receivers = self.tx.send(trade_id.clone()).unwrap_or(0);
        debug!(%trade_id, receivers, "Trade completion published");
        receivers
    }

    /// Subscribe to completions of one trade.
    #[must_use]
    pub fn subscribe(&self, trade_id: TradeId) -> CompletionSubscription {
        CompletionSubscription {
            trade_id,
            rx: self.tx.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Subscription filtered to a single trade id.
#[derive(Debug)]
pub struct CompletionSubscription {
    trade_id: TradeId,
    rx: broadcast::Receiver<TradeId>,
}

impl CompletionSubscription {
    /// Wait until the subscribed trade is announced as completed.
    ///
    /// Returns false if the bus was dropped. Lagging is tolerated: missed
    /// announcements for other trades are irrelevant, and a missed one for
    /// this trade is recovered by polling.
    pub async fn completed(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(id) if id == self.trade_id => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Completion subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }

    #[must_use]
    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(s: &str) -> TradeId {
        TradeId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_subscription_filters_other_trades() {
        let bus = CompletionBus::default();
        let mut sub = bus.subscribe(id("t1"));

        bus.publish(id("t2"));
        bus.publish(id("t1"));

        let done = tokio::time::timeout(Duration::from_secs(1), sub.completed())
            .await
            .unwrap();
        assert!(done);
    }

    #[test]
    fn test_completed_pending_until_matching_trade() {
        let bus = CompletionBus::default();
        let mut sub = bus.subscribe(id("t1"));
        let mut done = tokio_test::task::spawn(sub.completed());

        tokio_test::assert_pending!(done.poll());
        bus.publish(id("t2"));
        assert!(done.is_woken());
        tokio_test::assert_pending!(done.poll());

        bus.publish(id("t1"));
        assert!(tokio_test::assert_ready!(done.poll()));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unregisters() {
        let bus = CompletionBus::default();
        let sub = bus.subscribe(id("t1"));
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(id("t1")), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_returns_false() {
        let bus = CompletionBus::default();
        let mut sub = bus.subscribe(id("t1"));
        drop(bus);
        assert!(!sub.completed().await);
    }
}
