//! Progress stream
//!
//! Publishing never waits: events go into a bounded broadcast channel and
//! are dropped when nobody is listening. Slow subscribers skip ahead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::job::JobStage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub stage: JobStage,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

impl ProgressEvent {
    pub fn new(job_id: Uuid, stage: JobStage, detail: impl Into<String>) -> Self {
        Self {
            job_id,
            stage,
            timestamp: Utc::now(),
            detail: detail.into(),
        }
    }
}

#[derive(Clone)]
pub struct ProgressBroadcaster {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget.
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn test_publish_without_subscribers() {
        let progress = ProgressBroadcaster::new(4);
        progress.publish(ProgressEvent::new(Uuid::new_v4(), JobStage::Created, ""));
        assert_eq!(progress.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_without_blocking() {
        let progress = ProgressBroadcaster::new(2);
        let mut rx = progress.subscribe();
        let id = Uuid::new_v4();

        for stage in [
            JobStage::Created,
            JobStage::FetchingSource,
            JobStage::ExtractingMetadata,
            JobStage::BuildingDescription,
        ] {
            progress.publish(ProgressEvent::new(id, stage, ""));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap().stage, JobStage::ExtractingMetadata);
        assert_eq!(rx.recv().await.unwrap().stage, JobStage::BuildingDescription);
    }
}
