pub mod health;
pub mod render;

use axum::{
    routing::{get, post},
    Router,
};

use crate::delivery::Operation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::banner_handler))
        .route("/api", get(health::banner_handler))
        .route("/health", get(health::health_handler))
        .route(Operation::Generate.path(), post(render::generate_pdf_handler))
        .route(Operation::Preview.path(), post(render::preview_handler))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::worksheet::PageComposer;

    const BOUNDARY: &str = "propisi-test-boundary";

    pub(crate) fn test_state() -> AppState {
        AppState {
            composer: PageComposer::default(),
        }
    }

    fn multipart_body(fields: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn form(path: &str, fields: &[(&str, &str)]) -> Request<Body> {
        Request::post(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields)))
            .unwrap()
    }

    fn valid_fields(text: &str) -> Vec<(&str, &str)> {
        vec![
            ("task", "Trace the letters"),
            ("fill_type", "all"),
            ("text", text),
            ("page_layout", "lines"),
            ("font_type", "black"),
            ("page_orientation", "portrait"),
            ("student_name", ""),
        ]
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "propisi");
    }

    #[tokio::test]
    async fn test_banner_on_root_and_api() {
        for path in ["/", "/api"] {
            let response = build_router(test_state())
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn test_generate_returns_pdf_attachment() {
        let response = build_router(test_state())
            .oneshot(form("/api/generate-pdf", &valid_fields("one\ntwo")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=propisi.pdf"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_preview_renders_only_the_first_lines() {
        let response = build_router(test_state())
            .oneshot(form("/api/preview", &valid_fields("alpha\nbeta\ngamma\ndelta")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=preview.pdf"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = pdf_extract::extract_text_from_mem(&body).unwrap();
        assert!(text.contains("gamma"));
        assert!(!text.contains("delta"));
    }

    #[tokio::test]
    async fn test_unknown_layout_is_a_validation_error() {
        let mut fields = valid_fields("x");
        fields[3] = ("page_layout", "dots");
        let response = build_router(test_state())
            .oneshot(form("/api/generate-pdf", &fields))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_overflowing_text_is_unprocessable() {
        let text = vec!["row"; 40].join("\n");
        let response = build_router(test_state())
            .oneshot(form("/api/generate-pdf", &valid_fields(&text)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "OVERFLOW");
    }
}
