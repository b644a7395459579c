//! Minimal `actix-web` binding: one intake route plus health/readiness
//! probes. Request validation and auth are out of scope; these handlers do
//! nothing beyond JSON deserialization before delegating into
//! [`OrderService`].

use actix_web::{web, HttpResponse, Responder};
use order_domain::{CreateOrderRequest, OrderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::order_service::OrderService;

#[derive(Debug, Deserialize)]
pub struct CreateOrderPayload {
    #[serde(rename = "customerId")]
    pub customer_id: String,
    pub items: Vec<order_domain::OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderQuery {
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug)]
struct ErrorBody {
    code: String,
    message: String,
}

fn error_response(error: OrderError) -> HttpResponse {
    let body = ErrorBody {
        code: error.code().to_string(),
        message: error.to_string(),
    };

    match &error {
        OrderError::InsufficientInventory { details } => {
            HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "code": body.code,
                "message": body.message,
                "details": details,
            }))
        }
        OrderError::OrderNotFound => HttpResponse::NotFound().json(body),
        OrderError::InvalidStatusTransition | OrderError::DuplicateEvent => {
            HttpResponse::Conflict().json(body)
        }
        OrderError::ValidationError(_) => HttpResponse::BadRequest().json(body),
        OrderError::InventoryServiceUnavailable => HttpResponse::ServiceUnavailable().json(body),
    }
}

impl Serialize for ErrorBody {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ErrorBody", 2)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

/// `POST /orders`. `X-Correlation-Id` and `Idempotency-Key` headers are
/// honored when present; the idempotency key may also arrive as a query
/// parameter for curl-friendly testing.
pub async fn create_order(
    service: web::Data<Arc<OrderService>>,
    payload: web::Json<CreateOrderPayload>,
    query: web::Query<CreateOrderQuery>,
    req: actix_web::HttpRequest,
) -> impl Responder {
    let idempotency_key = req
        .headers()
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| query.idempotency_key.clone());

    let correlation_id = req
        .headers()
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let request = CreateOrderRequest {
        customer_id: payload.customer_id.clone(),
        items: payload.items.clone(),
    };

    match service
        .create_order(request, idempotency_key, Some(correlation_id))
        .await
    {
        Ok(view) => HttpResponse::Created().json(view),
        Err(e) => error_response(e),
    }
}

pub async fn healthz() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

pub async fn readyz(pool: web::Data<sqlx::PgPool>) -> impl Responder {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({"status": "ready"})),
        Err(e) => HttpResponse::ServiceUnavailable()
            .json(serde_json::json!({"status": "not ready", "error": e.to_string()})),
    }
}

/// `GET /metrics`. Renders whatever is currently registered on the default
/// Prometheus registry — outbox pending/published/dead-lettered counters
/// and the inventory circuit breaker state gauge among them.
pub async fn metrics() -> impl Responder {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders", web::post().to(create_order))
        .route("/healthz", web::get().to(healthz))
        .route("/readyz", web::get().to(readyz))
        .route("/metrics", web::get().to(metrics));
}
