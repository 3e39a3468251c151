use crate::application::gateway::{PaymentGateway, RESPONSE_SUCCESS};
use crate::application::ledger::PromotionLedger;
use crate::domain::payment::{CallbackParams, PaymentIntent, PaymentOutcome};
use crate::domain::ports::OrderSinkBox;
use crate::domain::promotion::{Collection, PromotionRecord};
use crate::error::PromoError;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Ack code returned to the gateway when the callback signature fails.
/// Still a 200 so the gateway stops retrying; the internal outcome is
/// recorded as `InvalidSignature`.
const ACK_INVALID_SIGNATURE: &str = "97";
/// Ack code when forwarding the outcome to the order component failed.
const ACK_INTERNAL: &str = "99";

pub struct AppState {
    pub ledger: PromotionLedger,
    pub gateway: PaymentGateway,
    pub orders: OrderSinkBox,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/promotions/redeem", post(redeem_handler))
        .route("/payments/checkout", post(checkout_handler))
        .route("/payments/callback", get(callback_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Translates core errors into the `{ "error": … }` shapes of the promotion
/// endpoints.
struct ApiError(PromoError);

impl From<PromoError> for ApiError {
    fn from(err: PromoError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PromoError::Validation(_) | PromoError::State(_) | PromoError::Signature => {
                StatusCode::BAD_REQUEST
            }
            PromoError::NotFound(_) => StatusCode::NOT_FOUND,
            PromoError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemRequest {
    code: Option<String>,
    collection: Option<String>,
    restaurant_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemResponse {
    success: bool,
    promotion: PromotionRecord,
    was_disabled: bool,
}

async fn redeem_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let code = req
        .code
        .as_deref()
        .ok_or_else(|| PromoError::validation("code is required"))?;
    let collection: Collection = req
        .collection
        .as_deref()
        .ok_or_else(|| PromoError::validation("collection is required"))?
        .parse()?;

    let redemption = state
        .ledger
        .redeem(collection, code, req.restaurant_id.as_deref())
        .await?;

    Ok(Json(RedeemResponse {
        success: true,
        promotion: redemption.promotion,
        was_disabled: redemption.was_disabled,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    /// Major-unit amount as a JSON number.
    amount: Option<Decimal>,
    order_id: Option<String>,
    bank_code: Option<String>,
    language: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    payment_url: String,
}

/// Checkout failures all map to a 500 `{ "message": … }`; the consuming apps
/// only distinguish got-a-URL from didn't.
struct CheckoutError(PromoError);

impl From<PromoError> for CheckoutError {
    fn from(err: PromoError) -> Self {
        Self(err)
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, CheckoutError> {
    let amount = req
        .amount
        .ok_or_else(|| PromoError::validation("amount is required"))?;
    let order_id = req
        .order_id
        .ok_or_else(|| PromoError::validation("orderId is required"))?;

    let intent = PaymentIntent::new(
        order_id,
        amount,
        req.bank_code,
        req.language,
        client_ip(&headers),
    )?;
    let payment_url = state.gateway.build_checkout_redirect(&intent, Utc::now())?;

    Ok(Json(CheckoutResponse { payment_url }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackAck {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
    #[serde(
        serialize_with = "rust_decimal::serde::float_option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    amount: Option<Decimal>,
}

/// Always answers 200: the gateway expects an acknowledgement regardless of
/// outcome and would otherwise retry indefinitely.
async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Json<CallbackAck> {
    let outcome = state.gateway.verify(&params);

    let ack = match &outcome {
        PaymentOutcome::InvalidSignature => CallbackAck {
            code: ACK_INVALID_SIGNATURE.to_string(),
            message: "invalid signature".to_string(),
            order_id: None,
            amount: None,
        },
        PaymentOutcome::Success { order_id, amount } => CallbackAck {
            code: RESPONSE_SUCCESS.to_string(),
            message: "payment confirmed".to_string(),
            order_id: Some(order_id.clone()),
            amount: Some(*amount),
        },
        PaymentOutcome::Failed {
            order_id,
            response_code,
        } => CallbackAck {
            code: response_code.clone(),
            message: "payment failed".to_string(),
            order_id: Some(order_id.clone()),
            amount: None,
        },
    };

    // Signature failures never reach the order component.
    if !matches!(outcome, PaymentOutcome::InvalidSignature) {
        let order_id = ack.order_id.as_deref().unwrap_or_default();
        if let Err(err) = state.orders.apply_payment_outcome(order_id, &outcome).await {
            error!(order_id, %err, "failed to forward payment outcome");
            return Json(CallbackAck {
                code: ACK_INTERNAL.to_string(),
                message: "internal error".to_string(),
                order_id: None,
                amount: None,
            });
        }
    }

    Json(ack)
}

/// Caller network address for the gateway's mandated `ip_addr` parameter.
/// Deployments sit behind a reverse proxy, so prefer `x-forwarded-for`.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
