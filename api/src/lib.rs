//! MAES Compliance Core API
//!
//! Service-to-service HTTP surface over the assessment core: start and
//! inspect assessments, generate and download reports, manage schedules,
//! compare runs. Every endpoint except `/health` requires the
//! `X-Service-Token` header.

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

use axum::routing::{get, post};
use axum::Router;
use maes_engine::Comparator;
use maes_queue::JobQueue;
use maes_report::ReportGenerator;
use maes_scheduler::Scheduler;
use maes_store::Store;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

/// Shared service state.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub queue: Arc<JobQueue>,
    pub scheduler: Arc<Scheduler>,
    pub comparator: Arc<Comparator>,
    pub reports: Arc<ReportGenerator>,
    pub service_token: Arc<String>,
}

/// Assemble the service router.
pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/assessment/start", post(routes::assessments::start))
        .route("/assessment/:id", get(routes::assessments::get))
        .route("/assessment/:id/cancel", post(routes::assessments::cancel))
        .route("/tenants/:tenant_id/assessments", get(routes::assessments::list_for_tenant))
        .route("/assessment/:id/report", post(routes::reports::generate))
        .route("/assessment/:id/reports", get(routes::reports::list))
        .route(
            "/assessment/:id/report/:file_name/download",
            get(routes::reports::download),
        )
        .route(
            "/compliance/compare/:baseline_id/:current_id",
            post(routes::compare::compare),
        )
        .route("/schedules", post(routes::schedules::create).get(routes::schedules::list))
        .route(
            "/schedule/:id",
            get(routes::schedules::get)
                .put(routes::schedules::update)
                .delete(routes::schedules::delete),
        )
        .route("/scheduler/stats", get(routes::schedules::stats))
        .route("/queue/stats", get(routes::assessments::queue_stats))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_service_token,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use maes_catalog::ControlCatalog;
    use maes_common::job::JobStatus;
    use maes_common::{
        Assessment, AssessmentStatus, Benchmark, ControlResult, ControlStatus, Credentials,
        Tenant, TriggeredBy,
    };
    use maes_report::PdfRenderer;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    const TOKEN: &str = "test-service-token";

    fn fixture_state() -> (ApiState, Store) {
        let store = Store::in_memory();
        let catalog = Arc::new(ControlCatalog::builtin());
        let queue = Arc::new(JobQueue::new(store.jobs.clone()));
        let scheduler = maes_scheduler::Scheduler::new(store.clone(), queue.clone());
        let comparator = Arc::new(Comparator::new(store.clone()));
        let reports_dir = std::env::temp_dir().join(format!("maes-api-test-{}", Uuid::new_v4()));
        let reports = Arc::new(
            ReportGenerator::new(store.clone(), catalog, reports_dir)
                .with_pdf_renderer(PdfRenderer::disabled()),
        );
        let state = ApiState {
            store: store.clone(),
            queue,
            scheduler,
            comparator,
            reports,
            service_token: Arc::new(TOKEN.to_string()),
        };
        (state, store)
    }

    async fn tenant(store: &Store) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Contoso".into(),
            directory_tenant_id: Uuid::new_v4().to_string(),
            domain: "contoso.onmicrosoft.com".into(),
            credentials: Credentials::Secret { client_id: "c".into(), client_secret: "s".into() },
            active: true,
            created_at: Utc::now(),
        };
        store.tenants.insert(&tenant).await.unwrap();
        tenant
    }

    async fn send(
        state: &ApiState,
        method: &str,
        uri: &str,
        with_token: bool,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if with_token {
            builder = builder.header(middleware::auth::SERVICE_TOKEN_HEADER, TOKEN);
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let (state, _store) = fixture_state();
        let (status, body) = send(&state, "GET", "/health", false, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_reject_without_token() {
        let (state, _store) = fixture_state();
        let (status, body) = send(&state, "GET", "/queue/stats", false, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn start_assessment_enqueues_a_job() {
        let (state, store) = fixture_state();
        let tenant = tenant(&store).await;

        let (status, body) = send(
            &state,
            "POST",
            "/assessment/start",
            true,
            Some(json!({ "tenant_id": tenant.id, "benchmark": "cisV4" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
        let job = store.jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.tenant_id, tenant.id);
    }

    #[tokio::test]
    async fn start_rejects_unknown_tenant() {
        let (state, _store) = fixture_state();
        let (status, body) = send(
            &state,
            "POST",
            "/assessment/start",
            true,
            Some(json!({ "tenant_id": Uuid::new_v4(), "benchmark": "cisV4" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn assessment_detail_includes_results() {
        let (state, store) = fixture_state();
        let tenant = tenant(&store).await;
        let assessment = Assessment::new(
            tenant.id,
            Benchmark::CisV4,
            "run".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        store.assessments.insert(&assessment).await.unwrap();
        store
            .results
            .upsert(&ControlResult {
                id: Uuid::new_v4(),
                assessment_id: assessment.id,
                control_id: "1.1.1".into(),
                status: ControlStatus::Compliant,
                score: 100.0,
                actual: Value::Null,
                evidence: Value::Null,
                remediation: None,
                error_message: None,
                checked_at: Utc::now(),
            })
            .await
            .unwrap();

        let (status, body) =
            send(&state, "GET", &format!("/assessment/{}", assessment.id), true, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "run");
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert_eq!(body["results"][0]["control_id"], "1.1.1");
    }

    #[tokio::test]
    async fn unknown_assessment_is_404() {
        let (state, _store) = fixture_state();
        let (status, body) =
            send(&state, "GET", &format!("/assessment/{}", Uuid::new_v4()), true, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn compare_requires_completed_assessments() {
        let (state, store) = fixture_state();
        let tenant = tenant(&store).await;
        let mut running = Assessment::new(
            tenant.id,
            Benchmark::CisV4,
            "baseline".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        running.status = AssessmentStatus::Running;
        let mut done = Assessment::new(
            tenant.id,
            Benchmark::CisV4,
            "current".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        done.status = AssessmentStatus::Completed;
        done.progress = 100;
        store.assessments.insert(&running).await.unwrap();
        store.assessments.insert(&done).await.unwrap();

        let uri = format!("/compliance/compare/{}/{}", running.id, done.id);
        let (status, body) = send(&state, "POST", &uri, true, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "NOT_READY");
    }

    #[tokio::test]
    async fn report_generation_rejects_running_assessments() {
        let (state, store) = fixture_state();
        let tenant = tenant(&store).await;
        let mut running = Assessment::new(
            tenant.id,
            Benchmark::CisV4,
            "in flight".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        running.status = AssessmentStatus::Running;
        store.assessments.insert(&running).await.unwrap();

        let uri = format!("/assessment/{}/report", running.id);
        let (status, body) =
            send(&state, "POST", &uri, true, Some(json!({ "format": "json" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "NOT_READY");
    }

    #[tokio::test]
    async fn schedule_crud_round_trip() {
        let (state, store) = fixture_state();
        let tenant = tenant(&store).await;

        let (status, created) = send(
            &state,
            "POST",
            "/schedules",
            true,
            Some(json!({
                "tenant_id": tenant.id,
                "name": "weekly baseline",
                "benchmark": "cisV4",
                "frequency": "weekly",
                "created_by": "tests",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let schedule_id = created["id"].as_str().unwrap().to_string();
        assert!(created["next_run_at"].is_string());

        let (status, listed) = send(
            &state,
            "GET",
            &format!("/schedules?tenant_id={}", tenant.id),
            true,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        // A duplicate name conflicts.
        let (status, body) = send(
            &state,
            "POST",
            "/schedules",
            true,
            Some(json!({
                "tenant_id": tenant.id,
                "name": "weekly baseline",
                "benchmark": "cisV4",
                "frequency": "weekly",
                "created_by": "tests",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");

        let (status, _body) =
            send(&state, "DELETE", &format!("/schedule/{schedule_id}"), true, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, stats) = send(&state, "GET", "/scheduler/stats", true, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["active_schedules"], 0);
    }

    #[tokio::test]
    async fn missing_artifact_download_is_404() {
        let (state, store) = fixture_state();
        let tenant = tenant(&store).await;
        let assessment = Assessment::new(
            tenant.id,
            Benchmark::CisV4,
            "run".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        store.assessments.insert(&assessment).await.unwrap();

        let uri = format!("/assessment/{}/report/nope.json/download", assessment.id);
        let (status, body) = send(&state, "GET", &uri, true, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
