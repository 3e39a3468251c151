use crate::domain::payment::{CallbackParams, PaymentIntent, PaymentOutcome};
use crate::error::{PromoError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Gateway response code signalling a successful payment.
pub const RESPONSE_SUCCESS: &str = "00";

/// Signature field appended to outbound requests and expected on callbacks.
pub const PARAM_SECURE_HASH: &str = "secure_hash";

/// Fixed order-type tag the gateway requires on every checkout.
const ORDER_TYPE: &str = "food";

/// Timestamp format mandated by the gateway's wire protocol.
const CREATE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Static configuration for the payment gateway integration.
///
/// Host and secret are startup preconditions: an instance with either empty
/// never constructs, so per-request code can assume they are present.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Absolute checkout URL on the gateway host.
    pub host: String,
    /// Shared HMAC secret agreed with the gateway.
    pub secret: String,
    pub merchant_code: String,
    /// Where the gateway redirects the payer after checkout.
    pub return_url: String,
    /// Locale used when the caller does not supply one.
    pub default_locale: String,
}

impl GatewayConfig {
    fn validate(&self) -> Result<()> {
        if self.secret.trim().is_empty() {
            return Err(PromoError::internal("gateway secret is not configured"));
        }
        if self.host.trim().is_empty() {
            return Err(PromoError::internal("gateway host is not configured"));
        }
        Url::parse(&self.host)
            .map_err(|e| PromoError::internal(format!("gateway host is not a valid URL: {e}")))?;
        Ok(())
    }
}

/// Builds signed checkout redirects and verifies signed callbacks.
///
/// Both operations are pure over the configuration: no state, no IO, safe to
/// call from any number of request handlers concurrently.
pub struct PaymentGateway {
    config: GatewayConfig,
}

impl PaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Assembles the mandated parameter set for `intent`, signs it, and
    /// returns the absolute redirect URL the client should be sent to.
    pub fn build_checkout_redirect(
        &self,
        intent: &PaymentIntent,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let mut params: BTreeMap<&str, String> = BTreeMap::new();
        params.insert("amount", intent.amount_minor.to_string());
        // Left empty when unspecified so the gateway prompts the payer.
        params.insert("bank_code", intent.bank_code.clone().unwrap_or_default());
        params.insert("create_date", now.format(CREATE_DATE_FORMAT).to_string());
        params.insert("ip_addr", intent.client_ip.clone());
        params.insert(
            "locale",
            intent
                .locale
                .clone()
                .unwrap_or_else(|| self.config.default_locale.clone()),
        );
        params.insert("merchant_code", self.config.merchant_code.clone());
        params.insert("order_type", ORDER_TYPE.to_string());
        params.insert("return_url", self.config.return_url.clone());
        params.insert("txn_ref", intent.order_id.clone());

        let canonical = canonical_query(params.iter().map(|(k, v)| (*k, v.as_str())));
        let signature = self.signature_over(&canonical)?;

        let mut url = Url::parse(&self.config.host)
            .map_err(|e| PromoError::internal(format!("gateway host is not a valid URL: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair(PARAM_SECURE_HASH, &signature);

        Ok(url.into())
    }

    /// Classifies an inbound gateway callback.
    ///
    /// Total over its input: any malformed or unauthentic parameter set maps
    /// to `InvalidSignature`, never to an error. The signature is recomputed
    /// over every parameter except the signature field itself and compared in
    /// constant time.
    pub fn verify(&self, params: &CallbackParams) -> PaymentOutcome {
        let Some(supplied) = params.get(PARAM_SECURE_HASH) else {
            warn!("gateway callback without signature field");
            return PaymentOutcome::InvalidSignature;
        };
        let Ok(supplied) = hex::decode(supplied) else {
            warn!("gateway callback signature is not valid hex");
            return PaymentOutcome::InvalidSignature;
        };

        let canonical = canonical_query(
            params
                .iter()
                .filter(|(k, _)| k.as_str() != PARAM_SECURE_HASH)
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let Ok(mac) = self.mac(&canonical) else {
            return PaymentOutcome::InvalidSignature;
        };
        if mac.verify_slice(&supplied).is_err() {
            warn!("gateway callback signature mismatch");
            return PaymentOutcome::InvalidSignature;
        }

        // Authenticated from here on; still treat missing or unparseable
        // mandatory fields as an unusable callback.
        let Some(order_id) = params.get("txn_ref") else {
            return PaymentOutcome::InvalidSignature;
        };
        let Some(response_code) = params.get("response_code") else {
            return PaymentOutcome::InvalidSignature;
        };
        let Some(amount_minor) = params.get("amount").and_then(|v| v.parse::<i64>().ok()) else {
            return PaymentOutcome::InvalidSignature;
        };

        if response_code == RESPONSE_SUCCESS {
            PaymentOutcome::Success {
                order_id: order_id.clone(),
                amount: Decimal::new(amount_minor, 2).normalize(),
            }
        } else {
            PaymentOutcome::Failed {
                order_id: order_id.clone(),
                response_code: response_code.clone(),
            }
        }
    }

    /// Signs an arbitrary parameter set with the shared secret, using the
    /// gateway's canonical ordering rule. Any `secure_hash` entry already
    /// present is excluded from the signed payload.
    pub fn sign(&self, params: &CallbackParams) -> Result<String> {
        let canonical = canonical_query(
            params
                .iter()
                .filter(|(k, _)| k.as_str() != PARAM_SECURE_HASH)
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        self.signature_over(&canonical)
    }

    fn signature_over(&self, canonical: &str) -> Result<String> {
        Ok(hex::encode(self.mac(canonical)?.finalize().into_bytes()))
    }

    fn mac(&self, canonical: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .map_err(|e| PromoError::internal(format!("hmac init failed: {e}")))?;
        mac.update(canonical.as_bytes());
        Ok(mac)
    }
}

/// Canonical ordering rule: lexicographic key order, percent-encoded `k=v`
/// pairs joined with `&`. Callers must feed pairs already sorted.
fn canonical_query<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gateway() -> PaymentGateway {
        PaymentGateway::new(GatewayConfig {
            host: "https://pay.example.com/checkout".to_string(),
            secret: "test-secret".to_string(),
            merchant_code: "FOODCO".to_string(),
            return_url: "https://shop.example.com/payment/return".to_string(),
            default_locale: "en".to_string(),
        })
        .unwrap()
    }

    fn intent() -> PaymentIntent {
        PaymentIntent::new("order-42", dec!(150000), None, None, "203.0.113.7").unwrap()
    }

    #[test]
    fn test_rejects_blank_secret() {
        let result = PaymentGateway::new(GatewayConfig {
            host: "https://pay.example.com/checkout".to_string(),
            secret: "  ".to_string(),
            merchant_code: "FOODCO".to_string(),
            return_url: "https://shop.example.com/return".to_string(),
            default_locale: "en".to_string(),
        });
        assert!(matches!(result, Err(PromoError::Internal(_))));
    }

    #[test]
    fn test_rejects_malformed_host() {
        let result = PaymentGateway::new(GatewayConfig {
            host: "not a url".to_string(),
            secret: "test-secret".to_string(),
            merchant_code: "FOODCO".to_string(),
            return_url: "https://shop.example.com/return".to_string(),
            default_locale: "en".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_redirect_carries_mandated_params() {
        let url = gateway()
            .build_checkout_redirect(&intent(), Utc::now())
            .unwrap();
        let url = Url::parse(&url).unwrap();
        assert_eq!(url.host_str(), Some("pay.example.com"));

        let pairs: CallbackParams = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs.get("amount").unwrap(), "15000000");
        assert_eq!(pairs.get("txn_ref").unwrap(), "order-42");
        assert_eq!(pairs.get("order_type").unwrap(), "food");
        assert_eq!(pairs.get("locale").unwrap(), "en");
        assert_eq!(pairs.get("bank_code").unwrap(), "");
        assert!(pairs.contains_key(PARAM_SECURE_HASH));
    }

    #[test]
    fn test_builder_signature_matches_canonical_recomputation() {
        let gw = gateway();
        let url = gw.build_checkout_redirect(&intent(), Utc::now()).unwrap();
        let url = Url::parse(&url).unwrap();
        let params: CallbackParams = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let supplied = params.get(PARAM_SECURE_HASH).unwrap();
        assert_eq!(supplied, &gw.sign(&params).unwrap());
    }

    #[test]
    fn test_verify_success_descales_amount() {
        let gw = gateway();
        let outcome = gw.verify(&signed_callback(&gw, "order-42", 15_000_000, "00"));
        assert_eq!(
            outcome,
            PaymentOutcome::Success {
                order_id: "order-42".to_string(),
                amount: dec!(150000),
            }
        );
    }

    #[test]
    fn test_verify_preserves_failure_code() {
        let gw = gateway();
        let outcome = gw.verify(&signed_callback(&gw, "order-42", 15_000_000, "24"));
        assert_eq!(
            outcome,
            PaymentOutcome::Failed {
                order_id: "order-42".to_string(),
                response_code: "24".to_string(),
            }
        );
    }

    #[test]
    fn test_verify_rejects_single_character_tamper() {
        let gw = gateway();
        let mut params = signed_callback(&gw, "order-42", 15_000_000, "00");
        params.insert("txn_ref".to_string(), "order-43".to_string());
        assert_eq!(gw.verify(&params), PaymentOutcome::InvalidSignature);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let gw = gateway();
        let other = PaymentGateway::new(GatewayConfig {
            host: "https://pay.example.com/checkout".to_string(),
            secret: "other-secret".to_string(),
            merchant_code: "FOODCO".to_string(),
            return_url: "https://shop.example.com/return".to_string(),
            default_locale: "en".to_string(),
        })
        .unwrap();
        let params = signed_callback(&other, "order-42", 15_000_000, "00");
        assert_eq!(gw.verify(&params), PaymentOutcome::InvalidSignature);
    }

    #[test]
    fn test_verify_rejects_missing_or_garbage_signature() {
        let gw = gateway();
        let mut params = CallbackParams::new();
        params.insert("txn_ref".to_string(), "order-42".to_string());
        assert_eq!(gw.verify(&params), PaymentOutcome::InvalidSignature);

        params.insert(PARAM_SECURE_HASH.to_string(), "zz-not-hex".to_string());
        assert_eq!(gw.verify(&params), PaymentOutcome::InvalidSignature);

        assert_eq!(
            gw.verify(&CallbackParams::new()),
            PaymentOutcome::InvalidSignature
        );
    }

    /// Builds a correctly signed callback parameter set, as the gateway would.
    fn signed_callback(
        gw: &PaymentGateway,
        order_id: &str,
        amount_minor: i64,
        response_code: &str,
    ) -> CallbackParams {
        let mut params = CallbackParams::new();
        params.insert("txn_ref".to_string(), order_id.to_string());
        params.insert("amount".to_string(), amount_minor.to_string());
        params.insert("response_code".to_string(), response_code.to_string());
        let signature = gw.sign(&params).unwrap();
        params.insert(PARAM_SECURE_HASH.to_string(), signature);
        params
    }
}
