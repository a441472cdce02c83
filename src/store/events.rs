//! Contract store change feed.
//!
//! Every mutating operation emits one event on a broadcast channel, in
//! mutation order, while the store's write lock is still held. Loose
//! consumers (dashboards) tolerate lag; the persistence adapter drains
//! through its own bounded channel and must never skip events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{ReviewStatus, VerificationStatus};

/// Topic a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTopic {
    Ingest,
    Review,
    Verification,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Ingested {
        version: u32,
    },
    StatusChanged {
        from: ReviewStatus,
        to: ReviewStatus,
    },
    VerificationChanged {
        status: VerificationStatus,
    },
}

impl ChangeKind {
    pub fn topic(&self) -> ChangeTopic {
        match self {
            Self::Ingested { .. } => ChangeTopic::Ingest,
            Self::StatusChanged { .. } => ChangeTopic::Review,
            Self::VerificationChanged { .. } => ChangeTopic::Verification,
        }
    }
}

/// One change-feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub topic: ChangeTopic,
    pub contract_id: String,
    pub product_group: String,
    pub kind: ChangeKind,
    pub at: DateTime<Utc>,
}

/// Broadcast hub for store events. Sized generously; a lagged loose
/// subscriber sees `RecvError::Lagged`, never a blocked writer.
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, contract_id: &str, product_group: &str, kind: ChangeKind) {
        let event = ChangeEvent {
            topic: kind.topic(),
            contract_id: contract_id.to_string(),
            product_group: product_group.to_string(),
            kind,
            at: Utc::now(),
        };
        // Zero receivers is fine; the feed is fire-and-forget here.
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
