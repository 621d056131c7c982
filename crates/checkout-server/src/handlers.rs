//! HTTP Handlers

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use checkout_core::codec::DEFAULT_CONTENT_TYPE;
use checkout_core::storage::StoredOrderRecord;
use checkout_core::upload::no_progress;
use checkout_core::{Order, OrderStatus, UploadBatch, UploadFile, UploadSink};
use checkout_payments::{
    CheckoutRequest as PaymentCheckoutRequest, OrderStore, Package, PaymentError, WebhookHandler,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub orders: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn payment_error(e: &PaymentError) -> ApiError {
    let (status, code) = match e {
        PaymentError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        PaymentError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        PaymentError::Config(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "ORDER_ERROR"),
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "Order operation failed");
    }
    api_error(status, e.user_message(), code)
}

fn payments_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Payments not configured",
        "PAYMENTS_DISABLED",
    )
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub package: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub order_id: String,
    pub files: usize,
    pub bytes: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe.is_some(),
        orders: state.orders.len(),
    })
}

/// Create Stripe checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let package = Package::parse(&payload.package).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Unknown package: {}", payload.package),
            "INVALID_PACKAGE",
        )
    })?;

    let request = PaymentCheckoutRequest {
        package,
        customer_email: payload.customer_email,
        success_url: payload.success_url,
        cancel_url: payload.cancel_url,
        file_count: payload.file_count,
    };
    request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_REQUEST"))?;

    let stripe = state.stripe.as_ref().ok_or_else(payments_disabled)?;

    let session = stripe.create_checkout_session(request).await.map_err(|e| {
        tracing::error!(error = %e, retryable = e.is_retryable(), "Checkout error");
        let status = if e.is_retryable() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        api_error(status, e.user_message(), "CHECKOUT_ERROR")
    })?;

    Ok(Json(CheckoutResponse {
        checkout_url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let stripe = state.stripe.as_ref().ok_or_else(payments_disabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    let handler = WebhookHandler::new(state.orders.clone());

    let event = handler
        .parse_event(&body, signature, stripe.webhook_secret())
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature failed");
            api_error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        })?;

    handler.handle(event).await.map_err(|e| {
        tracing::error!(error = %e, "Webhook processing error");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook processing failed",
            "WEBHOOK_ERROR",
        )
    })?;

    Ok(StatusCode::OK)
}

/// Order lookup by payment session; 404 until the webhook has run
pub async fn get_order_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    match state.orders.get_by_session(&session_id) {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => {
            tracing::debug!(session_id = %session_id, "No order yet for session");
            Err(api_error(
                StatusCode::NOT_FOUND,
                "Order not found",
                "ORDER_NOT_FOUND",
            ))
        }
        Err(e) => Err(payment_error(&e)),
    }
}

/// Move an order's status forward
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let status = OrderStatus::parse(&payload.status).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Unknown status: {}", payload.status),
            "INVALID_STATUS",
        )
    })?;

    let order = state
        .orders
        .update_status(&order_id, status)
        .map_err(|e| payment_error(&e))?;

    tracing::info!(order_id = %order_id, status = %status, "Order status updated");
    Ok(Json(order))
}

/// Stored file record for an order; 404 until its files are uploaded
pub async fn get_order_files(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<StoredOrderRecord>, ApiError> {
    let record = state
        .storage
        .record(&order_id)
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.user_message(), e.code()))?;

    record.map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "No files stored for order",
            "FILES_NOT_FOUND",
        )
    })
}

/// Accept an order's files as multipart `file` parts
pub async fn upload_order_files(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let order = state
        .orders
        .get(&order_id)
        .map_err(|e| payment_error(&e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Order not found", "ORDER_NOT_FOUND"))?;

    let bad_body = |e: axum::extract::multipart::MultipartError| {
        api_error(StatusCode::BAD_REQUEST, e.body_text(), "INVALID_MULTIPART")
    };

    let mut customer_email = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_body)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("customer_email") => {
                customer_email = Some(field.text().await.map_err(bad_body)?);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let id = file_name
                    .rsplit_once('.')
                    .map_or(file_name.as_str(), |(stem, _)| stem)
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_body)?;

                files.push(UploadFile {
                    id,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring multipart field");
            }
        }
    }

    if files.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "No files in request",
            "NO_FILES",
        ));
    }

    if let Some(max) = order.package.as_deref().and_then(Package::parse).map(|p| p.max_files()) {
        if files.len() > max {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("{} files exceed the package limit of {max}", files.len()),
                "TOO_MANY_FILES",
            ));
        }
    }

    let customer_email = match customer_email {
        Some(email) if !order.customer_email.is_empty() && email != order.customer_email => {
            tracing::warn!(order_id = %order_id, "Upload email does not match order");
            return Err(api_error(
                StatusCode::FORBIDDEN,
                "Email does not match order",
                "EMAIL_MISMATCH",
            ));
        }
        Some(email) => email,
        None => order.customer_email.clone(),
    };

    let batch = UploadBatch {
        order_id: order.id.clone(),
        customer_email,
        files,
    };
    let response = UploadResponse {
        order_id: order.id.clone(),
        files: batch.files.len(),
        bytes: batch.total_bytes(),
    };

    state
        .storage
        .upload_files(batch, no_progress())
        .await
        .map_err(|e| {
            tracing::error!(order_id = %order_id, error = %e, "Storing files failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message(), e.code())
        })?;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
    };
    use checkout_core::DirectoryUploadSink;
    use checkout_payments::MemoryOrderStore;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::router;

    const BOUNDARY: &str = "checkout-test-boundary";

    struct Harness {
        app: Router,
        orders: Arc<MemoryOrderStore>,
        storage: Arc<DirectoryUploadSink>,
        _root: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let root = tempfile::tempdir().unwrap();
        let orders = Arc::new(MemoryOrderStore::new());
        let storage = Arc::new(DirectoryUploadSink::new(root.path()));
        let app = router(AppState {
            orders: orders.clone(),
            storage: storage.clone(),
            stripe: None,
        });
        Harness {
            app,
            orders,
            storage,
            _root: root,
        }
    }

    fn paid_order(orders: &MemoryOrderStore) -> Order {
        let order = Order::new("cs_test_1", "buyer@example.com").with_package("starter");
        orders.save(&order).unwrap();
        order
    }

    fn multipart_body(email: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"customer_email\"\r\n\r\n{email}\r\n"
            )
            .as_bytes(),
        );
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(order_id: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/orders/{order_id}/files"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn status_request(order_id: &str, status: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(format!("/api/orders/{order_id}/status"))
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"status":"{status}"}}"#)))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["stripe_configured"], false);
    }

    #[tokio::test]
    async fn test_order_lookup_is_404_until_created() {
        let h = harness();
        let request = || {
            Request::get("/api/orders/session/cs_test_1")
                .body(Body::empty())
                .unwrap()
        };

        let missing = h.app.clone().oneshot(request()).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["code"], "ORDER_NOT_FOUND");

        let order = paid_order(&h.orders);
        let found = h.app.oneshot(request()).await.unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        let body = json_body(found).await;
        assert_eq!(body["id"], order.id);
        assert_eq!(body["status"], "pending");
    }

    #[tokio::test]
    async fn test_status_update_moves_forward_only() {
        let h = harness();
        let order = paid_order(&h.orders);

        let forward = h.app.clone().oneshot(status_request(&order.id, "processing")).await.unwrap();
        assert_eq!(forward.status(), StatusCode::OK);
        assert_eq!(h.orders.get(&order.id).unwrap().unwrap().status, OrderStatus::Processing);

        let backward = h.app.clone().oneshot(status_request(&order.id, "pending")).await.unwrap();
        assert_eq!(backward.status(), StatusCode::CONFLICT);

        let unknown = h.app.clone().oneshot(status_request(&order.id, "shipped")).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

        let missing = h.app.oneshot(status_request("no-such-order", "processing")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_repeated_upload_stores_one_copy() {
        let h = harness();
        let order = paid_order(&h.orders);
        let files: [(&str, &[u8]); 2] = [
            ("1700000000000-aa.jpg", &b"first"[..]),
            ("1700000000001-bb.jpg", &b"second"[..]),
        ];

        for _ in 0..2 {
            let response = h
                .app
                .clone()
                .oneshot(upload_request(&order.id, multipart_body("buyer@example.com", &files)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["files"], 2);
        }

        let record = h.storage.record(&order.id).await.unwrap().unwrap();
        assert_eq!(record.files.len(), 2);
        assert_eq!(record.customer_email, "buyer@example.com");
        assert_eq!(record.files[0].id, "1700000000000-aa");
    }

    #[tokio::test]
    async fn test_order_files_lookup() {
        let h = harness();
        let order = paid_order(&h.orders);
        let request = || {
            Request::get(format!("/api/orders/{}/files", order.id))
                .body(Body::empty())
                .unwrap()
        };

        let missing = h.app.clone().oneshot(request()).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["code"], "FILES_NOT_FOUND");

        let files: [(&str, &[u8]); 1] = [("1700000000000-aa.jpg", &b"first"[..])];
        h.app
            .clone()
            .oneshot(upload_request(&order.id, multipart_body("buyer@example.com", &files)))
            .await
            .unwrap();

        let found = h.app.oneshot(request()).await.unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        let body = json_body(found).await;
        assert_eq!(body["order_id"], order.id);
        assert_eq!(body["files"][0]["id"], "1700000000000-aa");
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let h = harness();
        let order = paid_order(&h.orders);

        let unknown = h
            .app
            .clone()
            .oneshot(upload_request("no-such-order", multipart_body("buyer@example.com", &[("a.jpg", &b"x"[..])])))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let empty = h
            .app
            .clone()
            .oneshot(upload_request(&order.id, multipart_body("buyer@example.com", &[])))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(empty).await["code"], "NO_FILES");

        let wrong_email = h
            .app
            .clone()
            .oneshot(upload_request(&order.id, multipart_body("other@example.com", &[("a.jpg", &b"x"[..])])))
            .await
            .unwrap();
        assert_eq!(wrong_email.status(), StatusCode::FORBIDDEN);

        let too_many: Vec<(String, &[u8])> = (0..6).map(|i| (format!("{i}.jpg"), &b"x"[..])).collect();
        let too_many: Vec<(&str, &[u8])> = too_many.iter().map(|(n, b)| (n.as_str(), *b)).collect();
        let over_limit = h
            .app
            .oneshot(upload_request(&order.id, multipart_body("buyer@example.com", &too_many)))
            .await
            .unwrap();
        assert_eq!(over_limit.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(over_limit).await["code"], "TOO_MANY_FILES");
    }

    #[tokio::test]
    async fn test_payments_disabled_without_stripe() {
        let h = harness();
        let checkout = Request::post("/api/checkout")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"package":"starter","customer_email":"buyer@example.com","success_url":"https://example.com/s","cancel_url":"https://example.com/c","file_count":2}"#,
            ))
            .unwrap();
        let response = h.app.clone().oneshot(checkout).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let webhook = Request::post("/webhook/stripe")
            .header("stripe-signature", "t=1,v1=00")
            .body(Body::from("{}"))
            .unwrap();
        let response = h.app.oneshot(webhook).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_checkout_rejects_unknown_package() {
        let h = harness();
        let checkout = Request::post("/api/checkout")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"package":"gold","customer_email":"buyer@example.com","success_url":"https://example.com/s","cancel_url":"https://example.com/c","file_count":2}"#,
            ))
            .unwrap();
        let response = h.app.oneshot(checkout).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_PACKAGE");
    }
}
