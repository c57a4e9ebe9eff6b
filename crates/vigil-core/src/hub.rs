use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::AnomalyResult;

/// Per-subscriber channel capacity
const SUBSCRIBER_BUFFER: usize = 256;

/// Real-time fan-out hub for detector results
///
/// Subscribers register and deregister at any time. Delivery uses a
/// non-blocking `try_send`: a subscriber whose channel is full or closed
/// is removed rather than allowed to stall the ingest path. Per-subscriber
/// delivery order matches ingest order.
#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: RwLock<Vec<Subscriber>>,
}

#[derive(Debug)]
struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<AnomalyResult>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a new subscriber and return its id and event stream
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<AnomalyResult>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.subscribers.write().await.push(Subscriber { id, tx });
        debug!(subscriber_id = %id, "Subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber explicitly
    pub async fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().await.retain(|s| s.id != id);
        debug!(subscriber_id = %id, "Subscriber removed");
    }

    /// Fan a result out to every subscriber, dropping the slow or closed ones
    pub async fn broadcast(&self, result: &AnomalyResult) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| match s.tx.try_send(result.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber_id = %s.id, "Subscriber channel full, dropping subscriber");
                metrics::counter!("vigil_broadcast_dropped_subscribers_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber_id = %s.id, "Subscriber channel closed, removing");
                false
            }
        });
    }

    /// Number of active subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Severity, SystemStatus};
    use chrono::Utc;

    fn sample_result() -> AnomalyResult {
        AnomalyResult {
            sensor_id: "S1".to_string(),
            sensor_type: "temperature".to_string(),
            current_value: 42.0,
            unit: "C".to_string(),
            mean: 40.0,
            std_dev: 1.0,
            z_score: 2.0,
            threshold: 2.0,
            timestamp: Utc::now(),
            is_anomaly: false,
            severity: Severity::Normal,
            system_status: SystemStatus::Active,
            window_size: 30,
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn delivers_in_ingest_order() {
        let hub = BroadcastHub::new();
        let (_id, mut rx) = hub.subscribe().await;

        for value in [1.0, 2.0, 3.0] {
            let mut result = sample_result();
            result.current_value = value;
            hub.broadcast(&result).await;
        }

        assert_eq!(rx.recv().await.unwrap().current_value, 1.0);
        assert_eq!(rx.recv().await.unwrap().current_value, 2.0);
        assert_eq!(rx.recv().await.unwrap().current_value, 3.0);
    }

    #[tokio::test]
    async fn closed_subscriber_is_removed() {
        let hub = BroadcastHub::new();
        let (_id, rx) = hub.subscribe().await;
        assert_eq!(hub.subscriber_count().await, 1);

        drop(rx);
        hub.broadcast(&sample_result()).await;
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn full_subscriber_is_dropped_without_blocking() {
        let hub = BroadcastHub::new();
        let (_id, _rx) = hub.subscribe().await;

        // Saturate the channel, then one more broadcast must evict
        for _ in 0..=SUBSCRIBER_BUFFER {
            hub.broadcast(&sample_result()).await;
        }
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_target() {
        let hub = BroadcastHub::new();
        let (a, _rx_a) = hub.subscribe().await;
        let (_b, _rx_b) = hub.subscribe().await;

        hub.unsubscribe(a).await;
        assert_eq!(hub.subscriber_count().await, 1);
    }
}
