use crate::error::PromoError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;

/// Scale factor between major currency units and the gateway's minor units.
pub const MINOR_UNIT_SCALE: i64 = 100;

/// A checkout request in the gateway's wire representation.
///
/// Built transiently per checkout and never persisted; order/payment status
/// lives with the external order component.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub order_id: String,
    /// Amount in the gateway's smallest currency unit (major units x 100).
    pub amount_minor: i64,
    pub bank_code: Option<String>,
    pub locale: Option<String>,
    pub client_ip: String,
}

impl PaymentIntent {
    /// Converts a major-unit amount into a minor-unit intent.
    ///
    /// The amount must be positive and must scale to a whole number of minor
    /// units; anything else is a validation error rather than a silent
    /// rounding.
    pub fn new(
        order_id: impl Into<String>,
        amount_major: Decimal,
        bank_code: Option<String>,
        locale: Option<String>,
        client_ip: impl Into<String>,
    ) -> Result<Self, PromoError> {
        let order_id = order_id.into();
        if order_id.trim().is_empty() {
            return Err(PromoError::validation("order id must not be empty"));
        }
        if amount_major <= Decimal::ZERO {
            return Err(PromoError::validation("amount must be positive"));
        }
        let minor = amount_major * Decimal::from(MINOR_UNIT_SCALE);
        if minor.fract() != Decimal::ZERO {
            return Err(PromoError::validation(
                "amount has more precision than the gateway's minor unit",
            ));
        }
        let amount_minor = minor
            .to_i64()
            .ok_or_else(|| PromoError::validation("amount out of range"))?;

        Ok(Self {
            order_id,
            amount_minor,
            bank_code,
            locale,
            client_ip: client_ip.into(),
        })
    }
}

/// Raw parameter set of an inbound gateway callback, keyed for canonical
/// (lexicographic) iteration order.
pub type CallbackParams = BTreeMap<String, String>;

/// Terminal classification of a verified payment callback.
///
/// `InvalidSignature` carries nothing: an unauthenticated callback must not
/// leak any of its claimed fields downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Success {
        order_id: String,
        /// De-scaled amount in major units.
        amount: Decimal,
    },
    Failed {
        order_id: String,
        /// Raw gateway response code, preserved for diagnostics.
        response_code: String,
    },
    InvalidSignature,
}
