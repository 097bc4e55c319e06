//! In-memory record of the side effects performed by the API.
//!
//! The ledger is what the guard protects: every accepted order or upload lands
//! here exactly once, so it doubles as the observable proof that duplicates
//! never reached a handler.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use derive_more::Debug;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// An accepted order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An accepted upload; only its size is kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub id: u64,
    pub content_type: Option<String>,
    pub size: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Shared handle to the ledger; clones refer to the same records.
#[derive(Clone, Debug, Default)]
#[debug("Ledger")]
pub struct Ledger {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    orders: RwLock<Vec<Order>>,
    uploads: RwLock<Vec<Upload>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[instrument(name = "Ledger::record_order", skip(self))]
    pub async fn record_order(&self, item: String, quantity: u32) -> Order {
        let order = Order {
            id: self.next_id(),
            item,
            quantity,
            created_at: OffsetDateTime::now_utc(),
        };
        self.inner.orders.write().await.push(order.clone());
        debug!(id = order.id, "ledger.order.recorded");
        order
    }

    #[instrument(name = "Ledger::record_upload", skip(self))]
    pub async fn record_upload(&self, content_type: Option<String>, size: usize) -> Upload {
        let upload = Upload {
            id: self.next_id(),
            content_type,
            size,
            created_at: OffsetDateTime::now_utc(),
        };
        self.inner.uploads.write().await.push(upload.clone());
        debug!(id = upload.id, "ledger.upload.recorded");
        upload
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.inner.orders.read().await.clone()
    }

    pub async fn uploads(&self) -> Vec<Upload> {
        self.inner.uploads.read().await.clone()
    }
}
