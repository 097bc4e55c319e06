//! Order endpoints.
//!
//! Creating an order is the canonical non-idempotent operation: a repeated
//! click must not place a second order. The router is wrapped in a guard by
//! the caller, so the handlers here never see a duplicate.

use aerosol::axum::Dep;
use axum::{
    Extension, Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use resubmit::Fingerprint;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    api::State,
    ledger::{Ledger, Order},
};

pub fn router() -> Router<State> {
    Router::new().route("/", get(list_orders).post(create_order))
}

// =============================================================================
// Create Order
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub item: String,
    #[serde(alias = "qty")]
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderBody {
    #[serde(flatten)]
    pub order: Order,

    /// The submission this order was accepted under.
    pub submission: Option<Fingerprint>,
}

/// Place an order.
///
/// ## Endpoint
/// ```text
/// POST /api/v1/orders
/// Content-Type: application/json
///
/// { "item": "widget", "quantity": 2 }
/// ```
///
/// `qty` is accepted in place of `quantity`.
///
/// ## Responses
/// - 201: Order created
/// - 400: Invalid request
/// - 409: Identical order submitted within the retention window
///   (with `Retry-After`)
/// - 413: Body too large to check for duplicates
#[tracing::instrument(skip(ledger, submission))]
pub async fn create_order(
    Dep(ledger): Dep<Ledger>,
    submission: Option<Extension<Fingerprint>>,
    Json(request): Json<CreateOrderRequest>,
) -> CreateOrderResponse {
    if request.item.trim().is_empty() {
        return CreateOrderResponse::BadRequest(String::from("Order item cannot be empty"));
    }
    if request.quantity == 0 {
        return CreateOrderResponse::BadRequest(String::from("Order quantity must be positive"));
    }

    let submission = submission.map(|Extension(fingerprint)| fingerprint);
    let order = ledger.record_order(request.item, request.quantity).await;
    info!(
        order_id = order.id,
        submission = ?submission,
        "orders.create.success"
    );

    CreateOrderResponse::Created(CreateOrderBody { order, submission })
}

#[derive(Debug)]
pub enum CreateOrderResponse {
    Created(CreateOrderBody),
    BadRequest(String),
}

impl IntoResponse for CreateOrderResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            CreateOrderResponse::Created(body) => (StatusCode::CREATED, Json(body)).into_response(),
            CreateOrderResponse::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        }
    }
}

// =============================================================================
// List Orders
// =============================================================================

#[derive(Debug, Serialize)]
pub struct OrderListBody {
    pub orders: Vec<Order>,
}

/// List every accepted order.
///
/// ## Endpoint
/// ```text
/// GET /api/v1/orders
/// ```
///
/// ## Responses
/// - 200: Success
#[tracing::instrument(skip(ledger))]
pub async fn list_orders(Dep(ledger): Dep<Ledger>) -> ListOrdersResponse {
    let orders = ledger.orders().await;
    info!(count = orders.len(), "orders.list.success");
    ListOrdersResponse::Success(OrderListBody { orders })
}

#[derive(Debug)]
pub enum ListOrdersResponse {
    Success(OrderListBody),
}

impl IntoResponse for ListOrdersResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            ListOrdersResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
        }
    }
}
