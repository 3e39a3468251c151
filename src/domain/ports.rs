use super::payment::PaymentOutcome;
use super::promotion::{Collection, PromoCode, PromotionRecord};
use crate::error::PromoError;
use async_trait::async_trait;
use thiserror::Error;

/// Failure modes of the transactional promotion store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("promotion record not found")]
    NotFound,
    /// The transaction lost a race and may be retried by the caller.
    #[error("transaction conflict")]
    Conflict,
    /// The transaction closure refused the write; nothing was committed.
    #[error("{0}")]
    Aborted(PromoError),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read-modify-write body executed inside a store transaction. Returning an
/// error aborts the transaction without committing.
pub type RedeemTxn = Box<dyn FnOnce(&mut PromotionRecord) -> Result<(), PromoError> + Send>;

/// Port over the document store holding promotion records.
///
/// `run_transaction` must be serializable with respect to other transactions
/// on the same `(collection, code)` record; transactions on distinct records
/// must not block each other. Implementations signal retryable races with
/// [`StoreError::Conflict`].
#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn get(
        &self,
        collection: Collection,
        code: &PromoCode,
    ) -> Result<Option<PromotionRecord>, StoreError>;

    /// Runs `txn` against the current record state and commits the mutated
    /// record, returning it as committed.
    async fn run_transaction(
        &self,
        collection: Collection,
        code: &PromoCode,
        txn: RedeemTxn,
    ) -> Result<PromotionRecord, StoreError>;
}

pub type PromotionStoreBox = Box<dyn PromotionStore>;

/// Port to the external order component, which owns order-state transitions
/// and their idempotency. The core forwards each verified outcome exactly
/// once per callback invocation.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn apply_payment_outcome(
        &self,
        order_id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<(), PromoError>;
}

pub type OrderSinkBox = Box<dyn OrderSink>;
