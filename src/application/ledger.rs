use crate::domain::ports::{PromotionStoreBox, StoreError};
use crate::domain::promotion::{Collection, PromoCode, PromotionRecord};
use crate::error::{PromoError, Result};
use chrono::Utc;
use tracing::{debug, info};

/// Upper bound on transaction attempts before a conflict surfaces as an
/// internal error.
const MAX_TXN_ATTEMPTS: u32 = 5;

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    /// The record as committed by the redemption transaction.
    pub promotion: PromotionRecord,
    /// Whether this call drove the code from enabled to disabled.
    pub was_disabled: bool,
}

/// Owns all mutation of promotion records.
///
/// `PromotionLedger` is the only component allowed to write `usage_count` or
/// `is_enabled`. Each redemption is a serializable read-modify-write scoped to
/// a single record, retried a bounded number of times on store conflicts.
pub struct PromotionLedger {
    store: PromotionStoreBox,
}

impl PromotionLedger {
    pub fn new(store: PromotionStoreBox) -> Self {
        Self { store }
    }

    /// Redeems one usage of `code` from the given collection.
    ///
    /// Restaurant-scoped collections require a matching `restaurant_id`; a
    /// mismatch reads as not found so callers cannot probe codes across
    /// restaurants.
    pub async fn redeem(
        &self,
        collection: Collection,
        code: &str,
        restaurant_id: Option<&str>,
    ) -> Result<Redemption> {
        let code = PromoCode::new(code)?;
        if collection == Collection::Restaurant && restaurant_id.is_none() {
            return Err(PromoError::validation(
                "restaurantId is required for restaurant promotions",
            ));
        }

        let current = self
            .store
            .get(collection, &code)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| PromoError::not_found("promotion code not found"))?;

        if collection == Collection::Restaurant
            && current.restaurant_id.as_deref() != restaurant_id
        {
            return Err(PromoError::not_found("promotion code not found"));
        }

        // Fail fast on the stale read; the transaction re-checks below.
        current.ensure_redeemable(Utc::now())?;

        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let now = Utc::now();
            let result = self
                .store
                .run_transaction(collection, &code, Box::new(move |rec| {
                    rec.redeem_at(now).map(|_| ())
                }))
                .await;

            match result {
                Ok(promotion) => {
                    let was_disabled = !promotion.is_enabled;
                    if was_disabled {
                        info!(code = %promotion.code, usage = promotion.usage_count, "promotion reached usage limit, disabled");
                    } else {
                        info!(code = %promotion.code, usage = promotion.usage_count, "promotion redeemed");
                    }
                    return Ok(Redemption {
                        promotion,
                        was_disabled,
                    });
                }
                Err(StoreError::Conflict) => {
                    debug!(code = %code, attempt, "redemption transaction conflict, retrying");
                }
                Err(StoreError::NotFound) => {
                    return Err(PromoError::not_found("promotion code not found"));
                }
                Err(StoreError::Aborted(err)) => return Err(err),
                Err(StoreError::Backend(msg)) => {
                    return Err(PromoError::internal(format!("promotion store failed: {msg}")));
                }
            }
        }

        Err(PromoError::internal(
            "redemption transaction retries exhausted",
        ))
    }
}

fn store_failure(err: StoreError) -> PromoError {
    match err {
        StoreError::NotFound => PromoError::not_found("promotion code not found"),
        other => PromoError::internal(format!("promotion store failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryPromotionStore;
    use chrono::TimeDelta;

    async fn seeded(record: PromotionRecord, collection: Collection) -> PromotionLedger {
        let store = InMemoryPromotionStore::new();
        store.insert(collection, record).await;
        PromotionLedger::new(Box::new(store))
    }

    fn global_record(code: &str, usage_count: u32, usage_limit: u32) -> PromotionRecord {
        PromotionRecord {
            code: PromoCode::new(code).unwrap(),
            restaurant_id: None,
            discount_percentage: 10,
            usage_count,
            usage_limit,
            is_enabled: true,
            expires_at: Utc::now() + TimeDelta::hours(1),
        }
    }

    #[tokio::test]
    async fn test_redeem_unknown_code() {
        let ledger = seeded(global_record("TEN", 0, 5), Collection::Global).await;
        let err = ledger
            .redeem(Collection::Global, "MISSING", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_redeem_is_case_insensitive() {
        let ledger = seeded(global_record("TEN", 0, 5), Collection::Global).await;
        let redemption = ledger.redeem(Collection::Global, "ten", None).await.unwrap();
        assert_eq!(redemption.promotion.usage_count, 1);
        assert!(!redemption.was_disabled);
    }

    #[tokio::test]
    async fn test_redeem_disables_on_last_use() {
        let ledger = seeded(global_record("TEN", 4, 5), Collection::Global).await;
        let redemption = ledger.redeem(Collection::Global, "TEN", None).await.unwrap();
        assert!(redemption.was_disabled);
        assert_eq!(redemption.promotion.usage_count, 5);
        assert!(!redemption.promotion.is_enabled);

        let err = ledger
            .redeem(Collection::Global, "TEN", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::State(_)));
    }

    #[tokio::test]
    async fn test_redeem_rejects_expired_code() {
        let mut rec = global_record("OLD", 0, 5);
        rec.expires_at = Utc::now() - TimeDelta::seconds(1);
        let ledger = seeded(rec, Collection::Global).await;
        let err = ledger
            .redeem(Collection::Global, "OLD", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::State(_)));
    }

    #[tokio::test]
    async fn test_restaurant_scope_requires_matching_id() {
        let mut rec = global_record("LOCAL", 0, 5);
        rec.restaurant_id = Some("r001".to_string());
        let ledger = seeded(rec, Collection::Restaurant).await;

        let err = ledger
            .redeem(Collection::Restaurant, "LOCAL", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::Validation(_)));

        let err = ledger
            .redeem(Collection::Restaurant, "LOCAL", Some("r999"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::NotFound(_)));

        let redemption = ledger
            .redeem(Collection::Restaurant, "LOCAL", Some("r001"))
            .await
            .unwrap();
        assert_eq!(redemption.promotion.usage_count, 1);
    }
}
