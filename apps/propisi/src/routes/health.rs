use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "propisi"
    }))
}

/// GET / and GET /api
/// Banner answering liveness probes that do not know about /health.
pub async fn banner_handler() -> Json<Value> {
    Json(json!({
        "message": "Генератор прописей API работает!",
        "service": "propisi"
    }))
}
