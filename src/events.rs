use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Domain events emitted after an operation's transaction commits. The
/// receiving end (reporting, notifications) lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ProductCreated {
        product_id: i64,
    },
    ProductRemoved {
        product_id: i64,
        hard_deleted: bool,
    },
    StockAdjusted {
        product_id: i64,
        delta: i64,
        new_stock: i64,
    },
    BatchClosed {
        closing_id: i64,
        origin_file: String,
        items_processed: u64,
    },
    ShrinkageRequested {
        request_id: i64,
        product_id: i64,
        applied_immediately: bool,
    },
    ShrinkageApproved {
        request_id: i64,
        product_id: i64,
        quantity: i64,
    },
    ShrinkageRejected {
        request_id: i64,
    },
    ActionReverted {
        audit_id: i64,
        action: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}
