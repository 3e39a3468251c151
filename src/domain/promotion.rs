use crate::error::PromoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel usage limit for codes created without an explicit cap.
pub const UNLIMITED: u32 = u32::MAX;

/// A canonicalized promotion code.
///
/// Codes are matched case-insensitively, so they are stored upper-cased and
/// trimmed. Construction rejects empty input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct PromoCode(String);

impl PromoCode {
    pub fn new(raw: &str) -> Result<Self, PromoError> {
        let canonical = raw.trim().to_uppercase();
        if canonical.is_empty() {
            return Err(PromoError::validation("promotion code must not be empty"));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PromoCode {
    type Error = PromoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PromoCode> for String {
    fn from(code: PromoCode) -> Self {
        code.0
    }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two promotion collections the store knows about. Any other
/// discriminator supplied by a caller is a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "promotions")]
    Global,
    #[serde(rename = "promotions_restaurant")]
    Restaurant,
}

impl FromStr for Collection {
    type Err = PromoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "promotions" => Ok(Self::Global),
            "promotions_restaurant" => Ok(Self::Restaurant),
            other => Err(PromoError::validation(format!(
                "unknown promotion collection: {other}"
            ))),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("promotions"),
            Self::Restaurant => f.write_str("promotions_restaurant"),
        }
    }
}

/// A discount-code document as stored by the promotion ledger.
///
/// The backing document store supplies `expiresAt` either as epoch
/// milliseconds or as an RFC 3339 string; both are normalized to a single
/// `DateTime<Utc>` here, at the adapter boundary, so the ledger only ever sees
/// one instant type.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRecord {
    pub code: PromoCode,
    /// Restaurant the code is bound to; `None` for store-wide codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    pub discount_percentage: u8,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default = "default_usage_limit")]
    pub usage_limit: u32,
    pub is_enabled: bool,
    #[serde(deserialize_with = "deserialize_instant")]
    pub expires_at: DateTime<Utc>,
}

fn default_usage_limit() -> u32 {
    UNLIMITED
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum InstantRepr {
        Millis(i64),
        Iso(String),
    }

    match InstantRepr::deserialize(deserializer)? {
        InstantRepr::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        InstantRepr::Iso(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
    }
}

impl PromotionRecord {
    /// A code expiring exactly now is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Rejects redemption of a disabled or expired code.
    pub fn ensure_redeemable(&self, now: DateTime<Utc>) -> Result<(), PromoError> {
        if !self.is_enabled {
            return Err(PromoError::state("promotion code is disabled"));
        }
        if self.is_expired(now) {
            return Err(PromoError::state("promotion code has expired"));
        }
        Ok(())
    }

    /// Applies one redemption to this record.
    ///
    /// This is the body of the ledger's store transaction: it re-checks
    /// enabled/expiry/limit against the in-transaction state, increments the
    /// usage counter, and disables the code in the same step when the limit is
    /// reached. The limit check is authoritative even if `is_enabled` was left
    /// true by a manual data edit. Returns whether this call caused the
    /// disable transition.
    pub fn redeem_at(&mut self, now: DateTime<Utc>) -> Result<bool, PromoError> {
        self.ensure_redeemable(now)?;
        if self.usage_count >= self.usage_limit {
            return Err(PromoError::state("promotion code is disabled"));
        }

        self.usage_count += 1;
        if self.usage_count >= self.usage_limit {
            self.is_enabled = false;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
