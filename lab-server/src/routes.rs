//! HTTP route handlers for the analysis API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use codelab::pipeline::{AnalysisReport, AnalyzeRequest, InvalidRequestError, validate_request};
use serde_json::json;
use tracing::{error, info, warn};

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
}

async fn health() -> &'static str {
    "ok"
}

/// Error body returned as `{"error": "..."}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_analysis(err: anyhow::Error) -> Self {
        if err.downcast_ref::<InvalidRequestError>().is_some() {
            return Self {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            };
        }
        warn!(error = %format!("{err:#}"), "analysis failed");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// POST /api/analyze - run the selected agents on the submitted code.
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisReport>, ApiError> {
    validate_request(&request).map_err(ApiError::from_analysis)?;
    info!(
        filename = %request.code_request.filename,
        agents = ?request.agents,
        "analyze request"
    );

    let report = tokio::task::spawn_blocking(move || {
        state
            .backend
            .analyze(&state.config, &state.data_dir, &request)
    })
    .await
    .map_err(|err| {
        error!(error = %err, "analysis task failed");
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "analysis task failed".to_string(),
        }
    })?
    .map_err(ApiError::from_analysis)?;

    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::Result;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use codelab::io::completion::Completer;
    use codelab::io::config::LabConfig;
    use codelab::pipeline::{Services, analyze_request};
    use codelab::test_support::{
        FailingCompleter, ScriptedCompleter, ScriptedRunner, ScriptedTestRunner, clean_run,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::state::Backend;

    struct ScriptedBackend<C> {
        runner: ScriptedRunner,
        completer: C,
        test_runner: ScriptedTestRunner,
    }

    impl<C: Completer + Send + Sync> Backend for ScriptedBackend<C> {
        fn analyze(
            &self,
            config: &LabConfig,
            data_dir: &Path,
            request: &AnalyzeRequest,
        ) -> Result<AnalysisReport> {
            let services = Services {
                runner: &self.runner,
                completer: &self.completer,
                test_runner: &self.test_runner,
            };
            analyze_request(&services, config, data_dir, request, |_| {})
        }
    }

    fn app(data_dir: &Path, backend: Arc<dyn Backend>) -> Router {
        let state = AppState::new(LabConfig::default(), data_dir.to_path_buf(), backend);
        Router::new().nest("/api", api_router()).with_state(state)
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(ScriptedBackend {
            runner: ScriptedRunner::new(Vec::new()),
            completer: ScriptedCompleter::new(Vec::new()),
            test_runner: ScriptedTestRunner::new(Vec::new()),
        });
        let response = app(temp.path(), backend)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn analyze_runs_in_a_session() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(ScriptedBackend {
            runner: ScriptedRunner::new(vec![clean_run("1")]),
            completer: ScriptedCompleter::new(Vec::new()),
            test_runner: ScriptedTestRunner::new(Vec::new()),
        });
        let body = json!({
            "code_request": {"code": "print(1)"},
            "agents": {"run": true}
        });

        let response = app(temp.path(), backend)
            .oneshot(post_json(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let report = read_json(response).await;
        assert_eq!(report["filename"], "user.py");
        assert_eq!(report["repair"]["outcome"]["status"], "success");
        assert_eq!(report["final_code"], "print(1)");
        let session_id = report["session_id"].as_str().expect("session id");
        assert!(temp.path().join(session_id).join("user.py").exists());
    }

    #[tokio::test]
    async fn invalid_filename_is_bad_request() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(ScriptedBackend {
            runner: ScriptedRunner::new(Vec::new()),
            completer: ScriptedCompleter::new(Vec::new()),
            test_runner: ScriptedTestRunner::new(Vec::new()),
        });
        let body = json!({
            "code_request": {"code": "print(1)", "filename": "../../etc/passwd"},
            "agents": {"run": true}
        });

        let response = app(temp.path(), backend)
            .oneshot(post_json(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = read_json(response).await;
        assert!(
            error["error"]
                .as_str()
                .expect("error")
                .starts_with("invalid request")
        );
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(ScriptedBackend {
            runner: ScriptedRunner::new(Vec::new()),
            completer: FailingCompleter,
            test_runner: ScriptedTestRunner::new(Vec::new()),
        });
        let body = json!({
            "code_request": {"code": "print(1)"},
            "agents": {"forecast": true}
        });

        let response = app(temp.path(), backend)
            .oneshot(post_json(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let error = read_json(response).await;
        assert!(error["error"].as_str().expect("error").contains("503"));
    }
}
