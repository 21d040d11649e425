use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::engine::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/conflicts", get(handlers::list_conflicts))
        .route("/conflicts/:id", get(handlers::get_conflict))
        .route("/conflicts/:id/resolve", post(handlers::resolve_conflict))
        .route("/conflicts/:id/preview", post(handlers::preview_resolution))
        .route("/conflicts/:id/merged", put(handlers::update_merged))
        .route("/conflicts/:id/suggestions", get(handlers::get_suggestions))
        .route("/history", get(handlers::get_history))
        .route("/history/stats", get(handlers::get_history_stats))
        .route("/locks", get(handlers::list_locks))
        .route("/agents", get(handlers::list_agents))
        .route("/agents/:id", get(handlers::get_agent))
        .route("/events", get(handlers::stream_events))
        .layer(CorsLayer::permissive())
        .with_state(state.orchestrator)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    log::info!("Concord API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::IntoResponse,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::api::ApiError;
    use crate::definitions::AgentSpec;
    use crate::error::ConcordError;
    use crate::factory::AgentFactory;
    use crate::lifecycle::{AgentLifecycleManager, LifecycleConfig};
    use crate::locks::FileLockTable;
    use crate::registry::AgentRegistry;
    use crate::storage::{InMemoryFileStore, InMemoryHistoryStore, Workspace};
    use crate::types::{AgentConfig, AgentType, LockType};
    use crate::engine::WriteOutcome;

    async fn create_test_orchestrator() -> Arc<Orchestrator> {
        let lifecycle = Arc::new(AgentLifecycleManager::new(
            Arc::new(AgentRegistry::new()),
            AgentFactory::default(),
            LifecycleConfig::default(),
        ));
        lifecycle
            .create_agent(AgentSpec::new(
                "fe-1",
                AgentConfig::default_for(&AgentType::Frontend),
                vec!["typescript".to_string()],
            ))
            .await
            .unwrap();

        Arc::new(Orchestrator::new(
            lifecycle,
            Arc::new(Workspace::new(Arc::new(InMemoryFileStore::with_files([(
                "/src/foo.ts",
                "const x=0;",
            )])))),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(FileLockTable::default()),
        ))
    }

    async fn create_test_app() -> (Router, Arc<Orchestrator>) {
        let orchestrator = create_test_orchestrator().await;
        let state = AppState {
            orchestrator: orchestrator.clone(),
        };
        (create_router(state), orchestrator)
    }

    /// agent-b holds the write lock, agent-a's edit collides with it.
    async fn open_conflict(orchestrator: &Orchestrator) -> uuid::Uuid {
        orchestrator
            .locks()
            .acquire("/src/foo.ts", LockType::Write, "agent-b", None)
            .unwrap();
        match orchestrator
            .propose_edit("agent-a", "/src/foo.ts", "const x=2;", None)
            .await
            .unwrap()
        {
            WriteOutcome::Conflicted { conflict } => conflict.id,
            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: String, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["agents"]["healthy"], 1);
    }

    #[tokio::test]
    async fn test_list_conflicts_empty() {
        let (app, _) = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/conflicts").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_conflict_not_found() {
        let (app, _) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/conflicts/00000000-0000-0000-0000-000000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_get_conflict_includes_diff() {
        let (app, orchestrator) = create_test_app().await;
        let id = open_conflict(&orchestrator).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/conflicts/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["file_path"], "/src/foo.ts");
        assert_eq!(json["remote"]["content"], "const x=2;");
        assert!(json["sections"].is_array());
    }

    #[tokio::test]
    async fn test_resolve_and_history() {
        let (app, orchestrator) = create_test_app().await;
        let id = open_conflict(&orchestrator).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                format!("/conflicts/{}/resolve", id),
                serde_json::json!({ "strategy": "overwrite", "source": "remote", "resolved_by": "reviewer" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["resolution"]["content"], "const x=2;");

        assert_eq!(
            orchestrator.workspace().read("/src/foo.ts").await.unwrap().as_deref(),
            Some("const x=2;")
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/history?strategies=overwrite&files=foo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        // second resolve of the same id
        let response = app
            .oneshot(json_request(
                "POST",
                format!("/conflicts/{}/resolve", id),
                serde_json::json!({ "strategy": "auto_merge" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_bad_request() {
        let (app, orchestrator) = create_test_app().await;
        let id = open_conflict(&orchestrator).await;

        let response = app
            .oneshot(json_request(
                "POST",
                format!("/conflicts/{}/resolve", id),
                serde_json::json!({ "strategy": "rebase" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "unknown_strategy");
        assert!(orchestrator.get_conflict(id).is_ok());
    }

    #[tokio::test]
    async fn test_history_rejects_unknown_strategy_filter() {
        let (app, _) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/history?strategies=squash")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preview_and_merged_buffer() {
        let (app, orchestrator) = create_test_app().await;
        let id = open_conflict(&orchestrator).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                format!("/conflicts/{}/merged", id),
                serde_json::json!({ "content": "const x=3;" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["merged"], "const x=3;");

        let response = app
            .oneshot(json_request(
                "POST",
                format!("/conflicts/{}/preview", id),
                serde_json::json!({ "strategy": "overwrite", "source": "local" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["content"], "const x=0;");
        // previewing does not resolve
        assert_eq!(orchestrator.active_conflicts().len(), 1);
    }

    #[tokio::test]
    async fn test_suggestions_sorted() {
        let (app, orchestrator) = create_test_app().await;
        let id = open_conflict(&orchestrator).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/conflicts/{}/suggestions", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let confidences: Vec<f64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["confidence"].as_f64().unwrap())
            .collect();
        assert!(!confidences.is_empty());
        assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_locks_and_agents() {
        let (app, orchestrator) = create_test_app().await;
        orchestrator
            .locks()
            .acquire("/src/bar.ts", LockType::Exclusive, "fe-1", None)
            .unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/locks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/agents?type=frontend&capabilities=typescript")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .oneshot(Request::builder().uri("/agents/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_status_mapping() {
        let locked = ApiError::from(ConcordError::LockContention {
            path: "/a".to_string(),
            holder: "agent-b".to_string(),
            held: LockType::Write,
        });
        assert_eq!(locked.into_response().status(), StatusCode::LOCKED);

        let duplicate = ApiError::from(ConcordError::DuplicateAgent("fe-1".to_string()));
        assert_eq!(duplicate.into_response().status(), StatusCode::CONFLICT);

        let system = ApiError::from(ConcordError::system(crate::error::Severity::High, "disk full"));
        assert_eq!(system.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
