use crate::domain::payment::PaymentOutcome;
use crate::domain::ports::{OrderSink, PromotionStore, RedeemTxn, StoreError};
use crate::domain::promotion::{Collection, PromoCode, PromotionRecord};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// A thread-safe in-memory promotion store.
///
/// The write lock is held for the full read-modify-write of
/// `run_transaction`, which makes every transaction serializable with respect
/// to all others. Stricter than the per-record contract requires, but
/// correct, and plenty for tests and single-node deployments. A document-store
/// adapter would map its native transaction conflicts onto
/// [`StoreError::Conflict`] instead.
#[derive(Default, Clone)]
pub struct InMemoryPromotionStore {
    records: Arc<RwLock<HashMap<(Collection, String), PromotionRecord>>>,
}

impl InMemoryPromotionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record, keyed by its canonical code. Management-surface writes
    /// are out of scope for the core, so this is the only way records appear.
    pub async fn insert(&self, collection: Collection, record: PromotionRecord) {
        let key = (collection, record.code.as_str().to_string());
        self.records.write().await.insert(key, record);
    }
}

#[async_trait]
impl PromotionStore for InMemoryPromotionStore {
    async fn get(
        &self,
        collection: Collection,
        code: &PromoCode,
    ) -> std::result::Result<Option<PromotionRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(collection, code.as_str().to_string())).cloned())
    }

    async fn run_transaction(
        &self,
        collection: Collection,
        code: &PromoCode,
        txn: RedeemTxn,
    ) -> std::result::Result<PromotionRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&(collection, code.as_str().to_string()))
            .ok_or(StoreError::NotFound)?;

        let mut staged = record.clone();
        txn(&mut staged).map_err(StoreError::Aborted)?;
        *record = staged.clone();
        Ok(staged)
    }
}

/// Order sink for the running binary: the order component lives elsewhere in
/// the product, so the core only emits an audit line per outcome.
#[derive(Default)]
pub struct LoggingOrderSink;

#[async_trait]
impl OrderSink for LoggingOrderSink {
    async fn apply_payment_outcome(
        &self,
        order_id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<()> {
        match outcome {
            PaymentOutcome::Success { amount, .. } => {
                info!(order_id, %amount, "payment confirmed");
            }
            PaymentOutcome::Failed { response_code, .. } => {
                info!(order_id, response_code, "payment failed");
            }
            PaymentOutcome::InvalidSignature => {
                // Never forwarded; the verifier short-circuits first.
            }
        }
        Ok(())
    }
}

/// Order sink that records every forwarded outcome, for assertions in tests.
#[derive(Default, Clone)]
pub struct RecordingOrderSink {
    outcomes: Arc<Mutex<Vec<(String, PaymentOutcome)>>>,
}

impl RecordingOrderSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outcomes(&self) -> Vec<(String, PaymentOutcome)> {
        self.outcomes.lock().await.clone()
    }
}

#[async_trait]
impl OrderSink for RecordingOrderSink {
    async fn apply_payment_outcome(
        &self,
        order_id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<()> {
        self.outcomes
            .lock()
            .await
            .push((order_id.to_string(), outcome.clone()));
        Ok(())
    }
}
