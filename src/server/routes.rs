/// API routes

use axum::{middleware, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers::{self, AppState};

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Protected when API_TOKEN is set
    let protected_routes = Router::new()
        .route("/api/emails", get(handlers::list_emails))
        .route("/api/emails/:id", get(handlers::get_email))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    let public_routes = Router::new().route("/api/health", get(handlers::health_check));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Settings, StoreKind};
    use axum::body::{to_bytes, Body};
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TOKEN: &str = "0123456789abcdef0123";

    async fn state(api_token: Option<&str>) -> AppState {
        let settings = Settings {
            store_backend: StoreKind::Memory,
            api_token: api_token.map(str::to_string),
            ..Settings::default()
        };
        let state = AppState::new(settings);
        let store = state.db.store().await.unwrap();

        for (id, to, code, last) in [
            ("AAAAAAAAAA", "x@acme.com", "sent", "2019-09-16T10:00:00Z"),
            ("BBBBBBBBBB", "y@acme.com", "bounced", "2019-09-17T10:00:00Z"),
            ("CCCCCCCCCC", "z@other.com", "sent", "2019-09-18T10:00:00Z"),
        ] {
            let doc = json!({
                "id": id,
                "queue_id": id,
                "mail_to": to,
                "status": {"code": code, "message": ""},
                "last_attempt": last,
            });
            store
                .insert("sent_mail", doc.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        state
    }

    async fn get(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_emails_filters_and_pages() {
        let app = create_router(state(None).await, false);
        let (status, body) = get(app, "/api/emails?mail_to=*acme.com&limit=1", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], false);
        assert_eq!(body["count"], 2);
        assert_eq!(body["remaining"], 2);
        assert_eq!(body["page"], 1);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["result"].as_array().unwrap().len(), 1);
        // default order is last_attempt desc
        assert_eq!(body["result"][0]["id"], "BBBBBBBBBB");
    }

    #[tokio::test]
    async fn test_list_emails_nested_filter() {
        let app = create_router(state(None).await, false);
        let (_, body) = get(app, "/api/emails?status.code=sent&order=last_attempt&order_dir=asc", None).await;

        let ids: Vec<_> = body["result"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["AAAAAAAAAA", "CCCCCCCCCC"]);
    }

    #[tokio::test]
    async fn test_get_email_and_not_found() {
        let app = create_router(state(None).await, false);
        let (status, body) = get(app.clone(), "/api/emails/CCCCCCCCCC", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["mail_to"], "z@other.com");

        let (status, body) = get(app.clone(), "/api/emails/DDDDDDDDDD", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], true);
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert_eq!(body["result"], Value::Null);

        let (status, body) = get(app, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let app = create_router(state(Some(TOKEN)).await, true);

        let (status, body) = get(app.clone(), "/api/emails", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "UNAUTHORIZED");

        let (status, _) = get(app.clone(), "/api/emails", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = get(app.clone(), "/api/emails", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);

        let (status, body) = get(app, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "healthy");
    }
}
