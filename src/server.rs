/// HTTP server setup and routing
use crate::{
    api::middleware::track_metrics,
    context::AppContext,
    error::{DispatchError, DispatchResult},
    metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(crate::api::routes());

    if let Some(dir) = &ctx.config.service.static_directory {
        info!("Serving static assets from {:?}", dir);
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .fallback(not_found)
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(middleware::from_fn(track_metrics))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Health check handler
async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    match crate::db::test_connection(&ctx.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": ctx.config.service.version
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "version": ctx.config.service.version
                })),
            )
        }
    }
}

/// Prometheus metrics handler
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> DispatchResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Ambulance dispatch listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DispatchError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DispatchError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::test_config, db::memory_pool};
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        build_router(AppContext::with_pool(test_config(), memory_pool().await))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register_ambulance(app: &Router, username: &str) -> (String, String) {
        let response = call(
            app,
            Method::POST,
            "/api/actors/ambulance",
            None,
            Some(json!({ "username": username, "password": "hunter22hunter" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        (
            body["actor"]["id"].as_str().unwrap().to_string(),
            body["accessToken"].as_str().unwrap().to_string(),
        )
    }

    async fn register_client(app: &Router) -> (String, String) {
        let response = call(
            app,
            Method::POST,
            "/api/actors/client",
            None,
            Some(json!({ "displayName": "caller" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        (
            body["actor"]["id"].as_str().unwrap().to_string(),
            body["accessToken"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app().await;

        let response = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = test_app().await;

        let response = call(&app, Method::GET, "/nope", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_is_rate_limited() {
        let mut config = test_config();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        let app = build_router(AppContext::with_pool(config, memory_pool().await));

        for _ in 0..2 {
            let response = call(&app, Method::GET, "/nope", None, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response = call(&app, Method::GET, "/nope", None, None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_request_scenario() {
        let app = test_app().await;
        let (amb_id, amb_token) = register_ambulance(&app, "AMB1").await;
        let (_, client_token) = register_client(&app).await;

        // Submit R1
        let response = call(
            &app,
            Method::POST,
            "/api/requests",
            Some(&client_token),
            Some(json!({
                "address": "123 Main St",
                "condition": "chest pain",
                "lat": 14.0,
                "lon": 120.0
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let request_id = body["requestId"].as_str().unwrap().to_string();
        assert_eq!(body["request"]["state"], "pending");

        // Pending list requires an ambulance
        let response = call(&app, Method::GET, "/api/requests", Some(&client_token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = call(&app, Method::GET, "/api/requests", Some(&amb_token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // Client polls before acceptance
        let uri = format!("/api/requests/{}/positions", request_id);
        let body = json_body(call(&app, Method::GET, &uri, None, None).await).await;
        assert_eq!(body["accepted"], false);

        // Accept
        let uri = format!("/api/requests/{}/accept", request_id);
        let response = call(&app, Method::POST, &uri, Some(&amb_token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["state"], "accepted");
        assert_eq!(body["assignedActorId"], amb_id.as_str());

        // Second accept is rejected
        let response = call(&app, Method::POST, &uri, Some(&amb_token), None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "InvalidState");

        // Ambulance reports a position, client sees it
        let response = call(
            &app,
            Method::POST,
            "/api/positions",
            Some(&amb_token),
            Some(json!({ "lat": 14.01, "lon": 120.01 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let uri = format!("/api/requests/{}/positions", request_id);
        let body = json_body(call(&app, Method::GET, &uri, None, None).await).await;
        assert_eq!(body["accepted"], true);
        assert_eq!(body["ambulance"]["latitude"], 14.01);
        assert_eq!(body["client"]["latitude"], 14.0);

        // Finish
        let uri = format!("/api/requests/{}/finish", request_id);
        let response = call(&app, Method::POST, &uri, Some(&amb_token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["state"], "finished");

        let response = call(&app, Method::GET, "/api/requests", Some(&amb_token), None).await;
        assert!(json_body(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let app = test_app().await;

        let response = call(
            &app,
            Method::POST,
            "/api/requests",
            None,
            Some(json!({ "address": "", "condition": "chest pain" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = call(
            &app,
            Method::POST,
            "/api/requests",
            None,
            Some(json!({ "address": "123 Main St", "condition": "burn", "lat": 14.0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_accept_requires_authentication() {
        let app = test_app().await;

        let response = call(
            &app,
            Method::POST,
            "/api/requests",
            None,
            Some(json!({ "address": "123 Main St", "condition": "chest pain" })),
        )
        .await;
        let request_id = json_body(response).await["requestId"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = format!("/api/requests/{}/accept", request_id);
        let response = call(&app, Method::POST, &uri, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(&app, Method::POST, &uri, Some("garbage"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_logout() {
        let app = test_app().await;
        register_ambulance(&app, "amb1").await;

        let response = call(
            &app,
            Method::POST,
            "/api/session",
            None,
            Some(json!({ "username": "amb1", "password": "wrong-password" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(
            &app,
            Method::POST,
            "/api/session",
            None,
            Some(json!({ "username": "amb1", "password": "hunter22hunter" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["accessToken"]
            .as_str()
            .unwrap()
            .to_string();

        let response = call(&app, Method::GET, "/api/session", Some(&token), None).await;
        assert_eq!(json_body(response).await["role"], "ambulance");

        let response = call(&app, Method::DELETE, "/api/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = call(&app, Method::GET, "/api/session", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_positions_and_matches() {
        let app = test_app().await;
        let (near_id, near_token) = register_ambulance(&app, "near").await;
        let (_, far_token) = register_ambulance(&app, "far").await;
        let (client_id, client_token) = register_client(&app).await;

        for (token, lat, lon) in [
            (&client_token, 14.0, 120.0),
            (&near_token, 14.01, 120.01),
            (&far_token, 13.0, 119.0),
        ] {
            let response = call(
                &app,
                Method::POST,
                "/api/positions",
                Some(token),
                Some(json!({ "lat": lat, "lon": lon })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = call(
            &app,
            Method::GET,
            "/api/positions?role=ambulance",
            Some(&client_token),
            None,
        )
        .await;
        let positions = json_body(response).await;
        assert_eq!(positions.as_object().unwrap().len(), 2);

        let response = call(&app, Method::GET, "/api/matches", Some(&client_token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = call(&app, Method::GET, "/api/matches", Some(&near_token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let matches = json_body(response).await;
        let matches = matches.as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["clientId"], client_id.as_str());
        assert_eq!(matches[0]["ambulanceId"], near_id.as_str());
        let km = matches[0]["approxKm"].as_f64().unwrap();
        assert!((km - 1.57).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = test_app().await;
        call(&app, Method::GET, "/health", None, None).await;

        let response = call(&app, Method::GET, "/metrics", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("http_requests_total"));
    }
}
