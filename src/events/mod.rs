use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit events emitted by every mutating operation. Consumers append them to
/// the audit log; the services themselves never write audit rows directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Marking events
    MarkingCreated(Uuid),
    MarkingExtended {
        marking_id: Uuid,
        new_expires_at: DateTime<Utc>,
    },
    MarkingCancelled(Uuid),
    MarkingConverted {
        marking_id: Uuid,
        peminjaman_id: Uuid,
    },
    MarkingsExpired {
        count: u64,
    },

    // Peminjaman lifecycle events
    PeminjamanSubmitted {
        peminjaman_id: Uuid,
        owner_id: Uuid,
        conflict_group: Option<String>,
    },
    PeminjamanApproved(Uuid),
    PeminjamanRejected {
        peminjaman_id: Uuid,
        reason: String,
    },
    PeminjamanCancelled {
        peminjaman_id: Uuid,
        actor_id: Uuid,
    },

    // Approval workflow events
    ApprovalDecided {
        step_id: Uuid,
        peminjaman_id: Uuid,
        actor_id: Uuid,
        decision: String,
        overridden: bool,
        out_of_order: bool,
    },

    // Custody events
    UnitsAssigned {
        peminjaman_id: Uuid,
        assignments: u64,
    },
    PickupValidated {
        peminjaman_id: Uuid,
        actor_id: Uuid,
    },
    ReturnValidated {
        peminjaman_id: Uuid,
        actor_id: Uuid,
        damaged_or_lost: u64,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Builds a sender/receiver pair with a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

/// Drains the event channel, logging each event. Runs until every sender is
/// dropped. Slow consumers only backpressure producers at the channel bound;
/// nothing here can fail a mutating operation after commit.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = %payload, "audit event"),
            Err(e) => warn!(error = %e, ?event, "failed to serialize audit event"),
        }
    }
    info!("Event channel closed; audit consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive() {
        let (sender, mut rx) = EventSender::channel(8);
        sender.send(Event::MarkingCreated(Uuid::new_v4())).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, Event::MarkingCreated(_)));
    }

    #[test]
    fn events_serialize() {
        let event = Event::ApprovalDecided {
            step_id: Uuid::new_v4(),
            peminjaman_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            decision: "approved".into(),
            overridden: true,
            out_of_order: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ApprovalDecided"));
    }
}
