//! HTTP request boundary
//!
//! One POST endpoint fronts the pipeline. Input validation happens here,
//! before the orchestrator is invoked; pipeline failures collapse into an
//! opaque 500 with the detail kept in server-side logs only.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::pipeline::Pipeline;

/// Shared application state, built once at startup and injected into
/// handlers. Read-only after construction.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/query", post(answer_question))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

async fn answer_question(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<ErrorResponse>)> {
    // Validated before the pipeline is ever invoked.
    let question = match req.question.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Question is required".to_string(),
                }),
            ));
        }
    };

    info!(question = %question, "handling query");

    match state.pipeline.answer_question(&question).await {
        Ok(answer) => Ok(Json(QueryResponse { answer })),
        Err(e) => {
            // Native store and model errors stay server-side.
            error!(error = %e, "pipeline failure");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal Server Error".to_string(),
                }),
            ))
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AnswerComposer, PipelineError, QueryExecutor, QueryGenerator};
    use askdb_duck::ExecutionError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct StubGenerator {
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryGenerator for StubGenerator {
        async fn generate(&self, _question: &str, _schema: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::Generation("service unreachable".to_string()))
            } else {
                Ok("SELECT COUNT(*) FROM artists;".to_string())
            }
        }
    }

    struct StubExecutor {
        fail: bool,
    }

    #[async_trait]
    impl QueryExecutor for StubExecutor {
        async fn execute(&self, _sql: &str) -> Result<String, PipelineError> {
            if self.fail {
                Err(PipelineError::Execution(ExecutionError::NotFound(
                    "store rejected query".to_string(),
                )))
            } else {
                Ok("42".to_string())
            }
        }
    }

    struct StubComposer;

    #[async_trait]
    impl AnswerComposer for StubComposer {
        async fn compose(
            &self,
            _question: &str,
            _sql: &str,
            result: &str,
        ) -> Result<String, PipelineError> {
            Ok(format!("There are {} artists in the database.", result))
        }
    }

    fn test_app(
        generator_fail: bool,
        executor_fail: bool,
        generator_calls: Arc<AtomicUsize>,
    ) -> Router {
        let pipeline = Pipeline::new(
            "artists(id INTEGER, name VARCHAR)".to_string(),
            Arc::new(StubGenerator {
                fail: generator_fail,
                calls: generator_calls,
            }),
            Arc::new(StubExecutor {
                fail: executor_fail,
            }),
            Arc::new(StubComposer),
        );

        router(AppState {
            pipeline: Arc::new(pipeline),
        })
    }

    async fn post_query(app: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/query")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_query_returns_answer() {
        let app = test_app(false, false, Arc::new(AtomicUsize::new(0)));

        let (status, body) = post_query(
            app,
            serde_json::json!({ "question": "How many artists are in the database?" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().contains("42"));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected_before_the_pipeline_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = test_app(false, false, calls.clone());

        let (status, body) = post_query(app, serde_json::json!({ "question": "" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "Question is required" }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_question_field_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = test_app(false, false, calls.clone());

        let (status, body) = post_query(app, serde_json::json!({})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "Question is required" }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitespace_question_is_rejected() {
        let app = test_app(false, false, Arc::new(AtomicUsize::new(0)));

        let (status, body) = post_query(app, serde_json::json!({ "question": "   " })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "Question is required" }));
    }

    #[tokio::test]
    async fn test_execution_failure_maps_to_opaque_500() {
        let app = test_app(false, true, Arc::new(AtomicUsize::new(0)));

        let (status, body) =
            post_query(app, serde_json::json!({ "question": "how many?" })).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "error": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn test_generation_failure_maps_to_opaque_500() {
        let app = test_app(true, false, Arc::new(AtomicUsize::new(0)));

        let (status, body) =
            post_query(app, serde_json::json!({ "question": "how many?" })).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "error": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app(false, false, Arc::new(AtomicUsize::new(0)));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
