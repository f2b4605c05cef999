//! paperdex-api - HTTP API server for paperdex
//!
//! Surfaces:
//! - `POST /papers/:id/submit` — enqueue ingestion; 202 accepted, 409 when
//!   the paper is already completed
//! - `GET /papers/:id/status` — point-in-time processing state
//! - `GET /papers` — hybrid search with pagination
//! - `GET /papers/:id` — full paper record
//! - `GET /papers/:id/recommendations` — nearest-neighbor recommendations

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use paperdex_core::{
    defaults, Error, IngestQueue, PaperRepository, PaperSummary, ProcessingState, SearchPage,
};
use paperdex_db::Database;
use paperdex_inference::{OpenAiBackend, StructuredExtractor};
use paperdex_jobs::{ArxivSource, DualStoreWriter, IngestHandler, JobWorker, WorkerConfig};
use paperdex_search::{HybridQueryPlanner, RecommendationResolver, SearchRequest};

// =============================================================================
// STATE
// =============================================================================

/// Shared application state handed to every handler.
#[derive(Clone)]
struct AppState {
    papers: Arc<dyn PaperRepository>,
    queue: Arc<dyn IngestQueue>,
    planner: Arc<HybridQueryPlanner>,
    recommender: Arc<RecommendationResolver>,
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Wrapper mapping core errors onto HTTP responses.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::PaperNotFound(_) | Error::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            other => {
                error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    has_code: Option<bool>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: Uuid,
    paper_id: String,
    state: ProcessingState,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    id: String,
    state: ProcessingState,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Submit an identifier for ingestion. Returns immediately; the pipeline
/// runs on the worker pool.
async fn submit_paper(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = id.trim().to_string();
    if id.is_empty() {
        return Err(Error::InvalidInput("empty paper identifier".to_string()).into());
    }

    // A completed paper is done; resubmission is a conflict. Pending,
    // processing, and failed rows all accept a fresh submission.
    if state.papers.state_of(&id).await? == Some(ProcessingState::Completed) {
        return Ok((
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": format!("paper {} is already processed", id)
            })),
        )
            .into_response());
    }

    state.papers.ensure_pending(&id).await?;
    let job_id = state.queue.enqueue(&id).await?;

    info!(paper_id = %id, job_id = %job_id, "Submission accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            paper_id: id,
            state: ProcessingState::Pending,
        }),
    )
        .into_response())
}

/// Point-in-time state read. Never blocks on in-flight jobs; an identifier
/// that was never submitted reads as `pending`.
async fn paper_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let current = state
        .papers
        .state_of(&id)
        .await?
        .unwrap_or(ProcessingState::Pending);

    Ok(Json(StatusResponse { id, state: current }))
}

/// Hybrid search over the paper store.
async fn search_papers(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchPage<PaperSummary>>, ApiError> {
    let mut request = SearchRequest::new()
        .with_page(params.page.unwrap_or(1))
        .with_per_page(params.per_page.unwrap_or(defaults::PAGE_SIZE));
    if let Some(q) = params.q {
        request = request.with_query(q);
    }
    if let Some(has_code) = params.has_code {
        request = request.with_has_code(has_code);
    }

    let page = state.planner.search(request).await?;
    Ok(Json(page))
}

/// Fetch a full paper record.
async fn get_paper(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<paperdex_core::Paper>, ApiError> {
    let paper = state.papers.fetch(&id).await?;
    Ok(Json(paper))
}

/// Nearest-neighbor recommendations for a paper.
async fn get_recommendations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaperSummary>>, ApiError> {
    let recs = state.recommender.recommend(&id).await?;
    Ok(Json(recs))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// =============================================================================
// ROUTER
// =============================================================================

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/papers", get(search_papers))
        .route("/papers/:id", get(get_paper))
        .route("/papers/:id/submit", post(submit_paper))
        .route("/papers/:id/status", get(paper_status))
        .route("/papers/:id/recommendations", get(get_recommendations))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// STARTUP
// =============================================================================

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "paperdex_api=debug,paperdex_jobs=info,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install shutdown handler");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let db = Database::connect(&database_url).await?;

    #[cfg(feature = "migrations")]
    db.migrate().await?;

    let papers: Arc<dyn PaperRepository> = Arc::new(db.papers.clone());
    let vectors: Arc<dyn paperdex_core::VectorIndex> = Arc::new(db.vectors.clone());
    let queue: Arc<dyn IngestQueue> = Arc::new(db.jobs.clone());

    let inference = Arc::new(OpenAiBackend::from_env());
    if !inference.health_check().await.unwrap_or(false) {
        tracing::warn!("Inference service is unreachable; ingestion jobs will fail until it is up");
    }
    let extractor = StructuredExtractor::new(inference.clone(), inference.clone());

    let handler = IngestHandler::new(
        papers.clone(),
        Arc::new(ArxivSource::new()),
        extractor,
        DualStoreWriter::new(papers.clone(), vectors.clone()),
    );
    let worker = JobWorker::new(
        queue.clone(),
        papers.clone(),
        Arc::new(handler),
        WorkerConfig::from_env(),
    );
    let worker_handle = worker.start();

    let state = AppState {
        papers,
        queue,
        planner: Arc::new(HybridQueryPlanner::new(
            Arc::new(db.papers.clone()),
            Arc::new(db.vectors.clone()),
            inference,
        )),
        recommender: Arc::new(RecommendationResolver::new(
            Arc::new(db.papers.clone()),
            Arc::new(db.vectors.clone()),
        )),
    };

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "Starting paperdex API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down worker");
    worker_handle.shutdown().await.ok();
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use paperdex_core::{
        CandidateRecord, EmbeddingBackend, ExtractedMetadata, IngestionJob, ListPapersRequest,
        Neighbor, Paper, Result, Vector, VectorIndex,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakePapers {
        states: Mutex<HashMap<String, ProcessingState>>,
    }

    impl FakePapers {
        fn with_state(id: &str, state: ProcessingState) -> Self {
            let fake = Self::default();
            fake.states.lock().unwrap().insert(id.to_string(), state);
            fake
        }
    }

    #[async_trait]
    impl PaperRepository for FakePapers {
        async fn ensure_pending(&self, id: &str) -> Result<()> {
            self.states
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_insert(ProcessingState::Pending);
            Ok(())
        }
        async fn mark_processing(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn store_extracted(
            &self,
            _id: &str,
            _authors: &[String],
            _meta: &ExtractedMetadata,
        ) -> Result<()> {
            Ok(())
        }
        async fn set_state(&self, _id: &str, _state: ProcessingState) -> Result<()> {
            Ok(())
        }
        async fn state_of(&self, id: &str) -> Result<Option<ProcessingState>> {
            Ok(self.states.lock().unwrap().get(id).copied())
        }
        async fn fetch(&self, id: &str) -> Result<Paper> {
            Err(Error::PaperNotFound(id.to_string()))
        }
        async fn list(&self, _req: ListPapersRequest) -> Result<(Vec<PaperSummary>, i64)> {
            Ok((vec![], 0))
        }
        async fn candidates(&self, _ids: &[String]) -> Result<Vec<CandidateRecord>> {
            Ok(vec![])
        }
        async fn fetch_summaries(&self, _ids: &[String]) -> Result<Vec<PaperSummary>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        enqueued: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IngestQueue for FakeQueue {
        async fn enqueue(&self, paper_id: &str) -> Result<Uuid> {
            self.enqueued.lock().unwrap().push(paper_id.to_string());
            Ok(Uuid::new_v4())
        }
        async fn claim_next(&self) -> Result<Option<IngestionJob>> {
            Ok(None)
        }
        async fn complete(&self, _job_id: Uuid) -> Result<()> {
            Ok(())
        }
        async fn fail(&self, _job_id: Uuid, _error: &str) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _job_id: Uuid) -> Result<Option<IngestionJob>> {
            Ok(None)
        }
        async fn pending_count(&self) -> Result<i64> {
            Ok(0)
        }
        async fn reap_stale(&self, _cutoff: DateTime<Utc>) -> Result<i64> {
            Ok(0)
        }
    }

    struct EmptyVectors;

    #[async_trait]
    impl VectorIndex for EmptyVectors {
        async fn upsert(&self, _id: &str, _vector: &Vector) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _id: &str) -> Result<Option<Vector>> {
            Ok(None)
        }
        async fn nearest(&self, _query: &Vector, _k: usize) -> Result<Vec<Neighbor>> {
            Ok(vec![])
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
            Ok(texts.iter().map(|_| Vector::from(vec![0.0])).collect())
        }
        fn dimension(&self) -> usize {
            1
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn app_with(papers: FakePapers) -> (Router, Arc<FakeQueue>) {
        let papers: Arc<dyn PaperRepository> = Arc::new(papers);
        let queue = Arc::new(FakeQueue::default());
        let vectors: Arc<dyn VectorIndex> = Arc::new(EmptyVectors);

        let state = AppState {
            papers: papers.clone(),
            queue: queue.clone(),
            planner: Arc::new(HybridQueryPlanner::new(
                papers.clone(),
                vectors.clone(),
                Arc::new(FixedEmbedder),
            )),
            recommender: Arc::new(RecommendationResolver::new(papers, vectors)),
        };

        (build_router(state), queue)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_submit_accepts_new_identifier() {
        let (app, queue) = app_with(FakePapers::default());

        let response = app
            .oneshot(
                Request::post("/papers/2403.01234/submit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["paper_id"], "2403.01234");
        assert_eq!(body["state"], "pending");
        assert_eq!(*queue.enqueued.lock().unwrap(), vec!["2403.01234"]);
    }

    #[tokio::test]
    async fn test_submit_completed_paper_conflicts() {
        let (app, queue) = app_with(FakePapers::with_state(
            "1706.03762",
            ProcessingState::Completed,
        ));

        let response = app
            .oneshot(
                Request::post("/papers/1706.03762/submit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(queue.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failed_paper_is_accepted_again() {
        let (app, _queue) = app_with(FakePapers::with_state(
            "2403.01234",
            ProcessingState::Failed,
        ));

        let response = app
            .oneshot(
                Request::post("/papers/2403.01234/submit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_status_of_unknown_identifier_is_pending() {
        let (app, _queue) = app_with(FakePapers::default());

        let response = app
            .oneshot(
                Request::get("/papers/never-submitted/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "pending");
    }

    #[tokio::test]
    async fn test_get_missing_paper_is_404() {
        let (app, _queue) = app_with(FakePapers::default());

        let response = app
            .oneshot(Request::get("/papers/ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_with_no_matches_is_empty_page() {
        let (app, _queue) = app_with(FakePapers::default());

        let response = app
            .oneshot(
                Request::get("/papers?q=vision&page=1&per_page=12")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_items"], 0);
        assert_eq!(body["items"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_recommendations_for_unindexed_paper_are_empty() {
        let (app, _queue) = app_with(FakePapers::default());

        let response = app
            .oneshot(
                Request::get("/papers/anything/recommendations")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 0);
    }
}
