use std::net::SocketAddr;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::config::AppConfig;
use crate::state::AppState;
use crate::{meals, recommend, settings};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1",
              Router::new()
                  .merge(meals::router())
                  .merge(settings::router())
                  .merge(recommend::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::recommend::{AiError, RecommendationTransport};
    use crate::storage::MemoryStorage;

    struct CannedTransport(&'static str);

    #[async_trait]
    impl RecommendationTransport for CannedTransport {
        async fn generate(&self, _api_key: &str, _prompt: &str) -> Result<String, AiError> {
            Ok(self.0.to_string())
        }
    }

    const SUGGESTIONS: &str = r#"{"suggestions":[{"name":"Turkey sandwich","calories":420,"protein":30,"carbs":45,"fat":12}],"rationale":"Balanced."}"#;

    async fn app(reply: &'static str, default_key: Option<&str>) -> Router {
        build_app(AppState::fake(Arc::new(CannedTransport(reply)), default_key).await)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app(SUGGESTIONS, None).await;
        let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn profile_round_trip_sets_targets() {
        let app = app(SUGGESTIONS, None).await;
        let profile = json!({
            "age": 30, "weight": 80, "height": 180, "gender": "male",
            "activityLevel": "moderate", "goal": "maintain"
        });
        let (status, body) = send(&app, Method::PUT, "/api/v1/profile", Some(profile)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["targets"]["calories"], json!(2643.0));

        let (_, body) = send(&app, Method::GET, "/api/v1/targets", None).await;
        assert_eq!(body["calories"], json!(2643.0));

        let (status, _) = send(&app, Method::DELETE, "/api/v1/profile", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = send(&app, Method::GET, "/api/v1/profile", None).await;
        assert_eq!(body["personalInfo"], Value::Null);
        assert_eq!(body["targets"]["calories"], json!(0.0));
    }

    #[tokio::test]
    async fn out_of_range_profile_is_bad_request() {
        let app = app(SUGGESTIONS, None).await;
        let profile = json!({
            "age": 30, "weight": 900, "height": 180, "gender": "female",
            "activityLevel": "light", "goal": "lose"
        });
        let (status, _) = send(&app, Method::PUT, "/api/v1/profile", Some(profile)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn meals_set_clear_and_unknown_slot() {
        let app = app(SUGGESTIONS, None).await;
        let food = json!({"name": "Porridge", "calories": 300, "protein": 10, "carbs": 50, "fat": 6});

        let (status, body) =
            send(&app, Method::PUT, "/api/v1/meals/breakfast", Some(food.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasFood"], json!(true));

        let (_, body) = send(&app, Method::GET, "/api/v1/nutrition", None).await;
        assert_eq!(body["consumed"]["calories"], json!(300.0));
        assert_eq!(body["mealsCompleted"], json!(1));

        let (status, _) = send(&app, Method::PUT, "/api/v1/meals/brunch", Some(food)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, Method::DELETE, "/api/v1/meals", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mealsCompleted"], json!(0));
    }

    #[tokio::test]
    async fn recommendation_needs_a_key() {
        let app = app(SUGGESTIONS, None).await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/recommendations",
            Some(json!({"slotId": "lunch"})),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["retryable"], json!(false));
    }

    #[tokio::test]
    async fn recommend_then_accept() {
        let app = app(SUGGESTIONS, Some("cfg-key")).await;
        let (status, rec) = send(
            &app,
            Method::POST,
            "/api/v1/recommendations",
            Some(json!({"slotId": "lunch"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rec["candidates"][0]["name"], json!("Turkey sandwich"));

        let token = rec["token"].as_str().unwrap();
        let uri = format!("/api/v1/recommendations/{token}/accept");
        let (status, slot) = send(&app, Method::POST, &uri, Some(json!({"index": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(slot["food"]["name"], json!("Turkey sandwich"));

        let (_, meals) = send(&app, Method::GET, "/api/v1/meals", None).await;
        assert_eq!(meals["totalNutrition"]["calories"], json!(420.0));
    }

    #[tokio::test]
    async fn unreadable_reply_returns_raw_text() {
        let app = app("The kitchen is closed.", Some("cfg-key")).await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/recommendations",
            Some(json!({"slotId": "dinner"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["raw"], json!("The kitchen is closed."));
    }

    #[tokio::test]
    async fn failed_reset_keeps_recommendation() {
        let storage = Arc::new(MemoryStorage::new());
        let state = AppState::fake_with_storage(
            Arc::new(CannedTransport(SUGGESTIONS)),
            Some("cfg-key"),
            storage.clone(),
        )
        .await;
        let app = build_app(state);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/recommendations",
            Some(json!({"slotId": "lunch"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        storage.fail_writes(true);
        let (status, _) = send(&app, Method::DELETE, "/api/v1/settings/data", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, latest) = send(&app, Method::GET, "/api/v1/recommendations/latest", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["slot"], json!("lunch"));
    }

    #[tokio::test]
    async fn settings_key_theme_and_reset() {
        let app = app(SUGGESTIONS, None).await;

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/v1/settings/api-key",
            Some(json!({"apiKey": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/settings/api-key",
            Some(json!({"apiKey": "user-key"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], json!("user"));

        let (status, _) = send(&app, Method::POST, "/api/v1/settings/api-key/default", None).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);

        let (_, theme) = send(&app, Method::POST, "/api/v1/settings/theme/toggle", None).await;
        assert_eq!(theme["theme"], json!("dark"));

        let (_, stats) = send(&app, Method::GET, "/api/v1/settings/storage", None).await;
        assert_eq!(stats["hasApiKey"], json!(true));
        assert_eq!(stats["isFirstTime"], json!(true));

        let (status, _) = send(&app, Method::DELETE, "/api/v1/settings/data", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, stats) = send(&app, Method::GET, "/api/v1/settings/storage", None).await;
        assert_eq!(stats["hasApiKey"], json!(false));
        let (_, theme) = send(&app, Method::GET, "/api/v1/settings/theme", None).await;
        assert_eq!(theme["theme"], json!("light"));
    }
}
