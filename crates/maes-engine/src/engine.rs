//! Benchmark execution

use chrono::{DateTime, Utc};
use maes_catalog::{CheckerError, CheckerOutcome, CheckerRegistry, ControlCatalog};
use maes_common::scoring::{self, ScoredControl};
use maes_common::{
    Assessment, AssessmentStatus, Benchmark, ControlResult, ControlStatus, CoreError, CoreResult,
    Tenant, Totals, TriggeredBy,
};
use maes_graph::{test_connection, GraphApi, GraphError};
use maes_store::Store;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Progress observer wired to the queue by the worker.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Options for one engine run.
pub struct RunOptions {
    pub name: String,
    pub triggered_by: TriggeredBy,
    pub parameters: Value,
    /// Present on queue retries; the idempotence key. A terminal
    /// assessment under this id short-circuits to its stored summary.
    pub assessment_id: Option<Uuid>,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressSink>,
}

impl RunOptions {
    pub fn new(name: impl Into<String>, triggered_by: TriggeredBy) -> Self {
        Self {
            name: name.into(),
            triggered_by,
            parameters: Value::Null,
            assessment_id: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_assessment_id(mut self, id: Uuid) -> Self {
        self.assessment_id = Some(id);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }
}

/// Terminal view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentSummary {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub benchmark: Benchmark,
    pub name: String,
    pub status: AssessmentStatus,
    pub progress: u8,
    pub totals: Totals,
    pub overall_score: f64,
    pub weighted_score: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error_message: Option<String>,
}

impl From<&Assessment> for AssessmentSummary {
    fn from(a: &Assessment) -> Self {
        Self {
            id: a.id,
            tenant_id: a.tenant_id,
            benchmark: a.benchmark,
            name: a.name.clone(),
            status: a.status,
            progress: a.progress,
            totals: a.totals,
            overall_score: a.overall_score,
            weighted_score: a.weighted_score,
            started_at: a.started_at,
            completed_at: a.completed_at,
            duration_seconds: a.duration_seconds,
            error_message: a.error_message.clone(),
        }
    }
}

/// Executes a benchmark against one tenant and persists the outcome.
pub struct AssessmentEngine {
    store: Store,
    catalog: Arc<ControlCatalog>,
    checkers: Arc<CheckerRegistry>,
}

enum ControlVerdict {
    Outcome(CheckerOutcome),
    Cancelled,
    Abort(CoreError),
}

impl AssessmentEngine {
    pub fn new(store: Store, catalog: Arc<ControlCatalog>, checkers: Arc<CheckerRegistry>) -> Self {
        Self { store, catalog, checkers }
    }

    /// Run a benchmark. Evaluation order is ascending control id;
    /// per-control failures never abort the run. Cancellation is observed
    /// before each control and yields a cancelled assessment with its
    /// partial results retained.
    pub async fn run(
        &self,
        tenant: &Tenant,
        graph: &dyn GraphApi,
        benchmark: Benchmark,
        opts: RunOptions,
    ) -> CoreResult<AssessmentSummary> {
        let mut assessment = match self.resume_or_create(tenant, benchmark, &opts).await? {
            Resumption::Terminal(summary) => return Ok(summary),
            Resumption::Run(a) => a,
        };

        let started_at = Utc::now();
        self.store.assessments.mark_running(assessment.id, started_at, 5).await?;
        assessment.status = AssessmentStatus::Running;
        assessment.started_at = Some(started_at);
        assessment.progress = 5;
        self.notify(&opts, 5);

        // Capability probe outcome is recorded but never fatal.
        let probe = test_connection(graph).await;
        if !probe.success {
            tracing::warn!(
                assessment = %assessment.id,
                probes_ok = probe.succeeded(),
                "capability probe degraded"
            );
        }
        self.store
            .assessments
            .merge_parameters(assessment.id, &json!({ "capabilityProbe": probe }))
            .await?;

        let controls = self.catalog.active_controls(benchmark);
        if controls.is_empty() {
            let error = CoreError::EmptyBenchmark(benchmark);
            self.finish(&mut assessment, AssessmentStatus::Failed, Some(error.to_string()), &[])
                .await?;
            return Err(error);
        }

        let total = controls.len();
        let mut scored: Vec<ScoredControl> = Vec::with_capacity(total);
        let mut totals = Totals::default();

        for (index, control) in controls.iter().enumerate() {
            if opts.cancel.is_cancelled() {
                assessment.totals = totals;
                self.finish(&mut assessment, AssessmentStatus::Cancelled, None, &scored).await?;
                tracing::info!(assessment = %assessment.id, evaluated = index, "run cancelled");
                return Ok(AssessmentSummary::from(&assessment));
            }

            let verdict = self.evaluate(graph, control).await;
            let outcome = match verdict {
                ControlVerdict::Outcome(outcome) => outcome,
                ControlVerdict::Cancelled => {
                    assessment.totals = totals;
                    self.finish(&mut assessment, AssessmentStatus::Cancelled, None, &scored)
                        .await?;
                    return Ok(AssessmentSummary::from(&assessment));
                }
                ControlVerdict::Abort(error) => {
                    assessment.totals = totals;
                    self.finish(
                        &mut assessment,
                        AssessmentStatus::Failed,
                        Some(error.to_string()),
                        &scored,
                    )
                    .await?;
                    return Err(error);
                }
            };

            let remediation = outcome.remediation.clone().or_else(|| {
                if control.remediation.is_empty() {
                    None
                } else {
                    Some(control.remediation.clone())
                }
            });
            let result = ControlResult {
                id: Uuid::new_v4(),
                assessment_id: assessment.id,
                control_id: control.id.clone(),
                status: outcome.status,
                score: outcome.score,
                actual: outcome.actual,
                evidence: maes_common::model::bound_evidence(outcome.evidence),
                remediation,
                error_message: outcome.error_message,
                checked_at: Utc::now(),
            };
            self.store.results.upsert(&result).await?;

            totals.record(outcome.status);
            scored.push(ScoredControl {
                status: outcome.status,
                score: outcome.score,
                weight: control.weight,
                severity: control.severity,
            });

            // 5..95 while evaluating; 100 is reserved for completion.
            let progress = ((index + 1) * 90 / total + 5) as u8;
            self.store.assessments.bump_progress(assessment.id, progress).await?;
            assessment.progress = assessment.progress.max(progress);
            self.notify(&opts, progress);
        }

        assessment.totals = totals;
        self.finish(&mut assessment, AssessmentStatus::Completed, None, &scored).await?;
        self.notify(&opts, 100);
        tracing::info!(
            assessment = %assessment.id,
            overall = assessment.overall_score,
            weighted = assessment.weighted_score,
            "assessment completed"
        );
        Ok(AssessmentSummary::from(&assessment))
    }

    async fn resume_or_create(
        &self,
        tenant: &Tenant,
        benchmark: Benchmark,
        opts: &RunOptions,
    ) -> CoreResult<Resumption> {
        if let Some(id) = opts.assessment_id {
            if let Some(existing) = self.store.assessments.get(id).await? {
                if existing.status.is_terminal() {
                    // At-least-once delivery: a retried job over a finished
                    // assessment is a no-op.
                    tracing::info!(assessment = %id, status = ?existing.status, "terminal assessment, skipping re-run");
                    return Ok(Resumption::Terminal(AssessmentSummary::from(&existing)));
                }
                return Ok(Resumption::Run(existing));
            }
        }

        let mut assessment = Assessment::new(
            tenant.id,
            benchmark,
            opts.name.clone(),
            opts.triggered_by,
            opts.parameters.clone(),
        );
        if let Some(id) = opts.assessment_id {
            // The caller pre-allocated the id (job binding); keep it.
            assessment.id = id;
        }
        self.store.assessments.insert(&assessment).await?;
        tracing::info!(
            assessment = %assessment.id,
            tenant = %tenant.id,
            benchmark = %benchmark,
            "assessment created"
        );
        Ok(Resumption::Run(assessment))
    }

    async fn evaluate(
        &self,
        graph: &dyn GraphApi,
        control: &maes_common::ControlDefinition,
    ) -> ControlVerdict {
        let Some(checker) = self.checkers.get(&control.checker_key) else {
            return ControlVerdict::Outcome(
                CheckerOutcome::manual_review("no automated checker for this control")
                    .with_actual(json!({ "checkerKey": control.checker_key })),
            );
        };

        match checker.evaluate(graph, control).await {
            Ok(outcome) => ControlVerdict::Outcome(outcome),
            Err(CheckerError::Graph(GraphError::Cancelled)) => ControlVerdict::Cancelled,
            Err(CheckerError::Graph(e @ GraphError::Auth { .. }))
            | Err(CheckerError::Graph(e @ GraphError::TokenExpired)) => {
                // Credential failures poison every remaining control; the
                // assessment fails as a whole.
                ControlVerdict::Abort(e.into())
            }
            Err(e) => {
                tracing::warn!(control = %control.id, error = %e, "checker failed");
                ControlVerdict::Outcome(CheckerOutcome {
                    status: ControlStatus::Error,
                    score: 0.0,
                    actual: Value::Null,
                    evidence: Value::Null,
                    remediation: None,
                    error_message: Some(e.to_string()),
                })
            }
        }
    }

    /// Terminal write. Completed runs get progress 100; cancelled and
    /// failed runs keep their last evaluated progress.
    async fn finish(
        &self,
        assessment: &mut Assessment,
        status: AssessmentStatus,
        error: Option<String>,
        scored: &[ScoredControl],
    ) -> CoreResult<()> {
        let completed_at = Utc::now();
        assessment.status = status;
        assessment.overall_score = scoring::overall_score(scored);
        assessment.weighted_score = scoring::weighted_score(scored);
        assessment.completed_at = Some(completed_at);
        assessment.duration_seconds =
            assessment.started_at.map(|s| (completed_at - s).num_seconds());
        assessment.error_message = error;
        if status == AssessmentStatus::Completed {
            assessment.progress = 100;
        }
        self.store.assessments.finalize(assessment).await?;
        Ok(())
    }

    fn notify(&self, opts: &RunOptions, progress: u8) {
        if let Some(sink) = &opts.progress {
            sink(progress);
        }
    }
}

enum Resumption {
    Terminal(AssessmentSummary),
    Run(Assessment),
}

#[cfg(test)]
mod tests {
    use super::*;
    use maes_common::{Credentials, Severity};
    use maes_graph::testing::MockGraph;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tenant() -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            name: "Contoso".into(),
            directory_tenant_id: "dir-1".into(),
            domain: "contoso.onmicrosoft.com".into(),
            credentials: Credentials::Secret { client_id: "c".into(), client_secret: "s".into() },
            active: true,
            created_at: Utc::now(),
        }
    }

    fn control(
        id: &str,
        severity: Severity,
        weight: f64,
        checker_key: &str,
    ) -> maes_common::ControlDefinition {
        maes_common::ControlDefinition {
            id: id.into(),
            benchmark: Benchmark::Custom,
            section: "1".into(),
            title: format!("control {id}"),
            description: String::new(),
            rationale: String::new(),
            remediation: "fix it".into(),
            severity,
            weight,
            expected: Value::Null,
            checker_key: checker_key.into(),
            active: true,
        }
    }

    fn engine(controls: Vec<maes_common::ControlDefinition>) -> (AssessmentEngine, Store) {
        let store = Store::in_memory();
        let engine = AssessmentEngine::new(
            store.clone(),
            Arc::new(ControlCatalog::from_controls(controls)),
            Arc::new(CheckerRegistry::with_builtins()),
        );
        (engine, store)
    }

    fn seed_controls() -> Vec<maes_common::ControlDefinition> {
        vec![
            control("1.1.1", Severity::Level2, 1.0, "entra.global_admin_mfa"),
            control("1.2.1", Severity::Level1, 1.0, "entra.ca_mfa_all_users"),
            control("8.2.2", Severity::Level1, 0.5, "teams.external_access"),
        ]
    }

    fn graph_with_admins(total: usize, with_mfa: usize) -> MockGraph {
        let members: Vec<Value> = (0..total)
            .map(|i| {
                json!({"@odata.type": "#microsoft.graph.user", "id": format!("u{i}"), "displayName": format!("admin {i}")})
            })
            .collect();
        let mut graph = MockGraph::new()
            .with("directoryRoles/role-1/members", json!({ "value": members }))
            .with(
                "directoryRoles",
                json!({"value": [{"id": "role-1", "displayName": "Global Administrator",
                                   "roleTemplateId": "62e90394-69f5-4237-9190-012177145e10"}]}),
            )
            .with(
                "identity/conditionalAccess/policies",
                json!({"value": [{
                    "displayName": "Require MFA",
                    "state": "enabled",
                    "conditions": {"users": {"includeUsers": ["All"]},
                                    "applications": {"includeApplications": ["All"]}},
                    "grantControls": {"builtInControls": ["mfa"]}
                }]}),
            )
            .with("organization", json!({"value": [{"id": "org"}]}))
            .with("users?$select=id,displayName&$top=1", json!({"value": []}));
        for i in 0..total {
            let methods = if i < with_mfa {
                json!({"value": [{"@odata.type": "#microsoft.graph.microsoftAuthenticatorAuthenticationMethod"}]})
            } else {
                json!({"value": [{"@odata.type": "#microsoft.graph.passwordAuthenticationMethod"}]})
            };
            graph = graph.with(&format!("users/u{i}/authentication/methods"), methods);
        }
        graph
    }

    #[tokio::test]
    async fn happy_path_scores_seed_scenario() {
        let (engine, store) = engine(seed_controls());
        let graph = graph_with_admins(2, 2);
        let tenant = tenant();

        let summary = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap();

        assert_eq!(summary.status, AssessmentStatus::Completed);
        assert_eq!(summary.totals.compliant, 2);
        assert_eq!(summary.totals.manual_review, 1);
        assert_eq!(summary.totals.total, 3);
        assert_eq!(summary.overall_score, 100.0);
        assert_eq!(summary.weighted_score, 100.0);
        assert_eq!(summary.progress, 100);
        assert!(summary.completed_at.unwrap() >= summary.started_at.unwrap());

        // Results were persisted in control-id order.
        let results = store.results.list_for_assessment(summary.id).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.control_id.as_str()).collect();
        assert_eq!(ids, vec!["1.1.1", "1.2.1", "8.2.2"]);
        assert_eq!(results[2].status, ControlStatus::ManualReview);
    }

    #[tokio::test]
    async fn partial_mfa_scores_66_67_weighted() {
        let (engine, _store) = engine(vec![control(
            "1.1.1",
            Severity::Level2,
            1.0,
            "entra.global_admin_mfa",
        )]);
        let graph = graph_with_admins(3, 2);
        let tenant = tenant();

        let summary = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap();

        assert_eq!(summary.totals.non_compliant, 1);
        assert_eq!(summary.overall_score, 0.0);
        assert_eq!(summary.weighted_score, 66.67);
    }

    #[tokio::test]
    async fn empty_benchmark_fails_the_assessment() {
        let (engine, store) = engine(vec![]);
        let graph = MockGraph::new();
        let tenant = tenant();

        let err = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyBenchmark(_)));

        let all = store.assessments.list_for_tenant(tenant.id, 10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AssessmentStatus::Failed);
        assert!(all[0].error_message.as_deref().unwrap_or("").contains("empty benchmark"));
    }

    #[tokio::test]
    async fn checker_errors_complete_with_zero_scores() {
        let controls = vec![
            control("1.1.1", Severity::Level2, 1.0, "entra.global_admin_mfa"),
            control("1.2.1", Severity::Level1, 1.0, "entra.ca_mfa_all_users"),
        ];
        let (engine, store) = engine(controls);
        // Every checker call fails with a transient error.
        let graph = MockGraph::new()
            .failing("directoryRoles", GraphError::Transient("graph is down".into()))
            .failing(
                "identity/conditionalAccess/policies",
                GraphError::Transient("graph is down".into()),
            )
            .failing("organization", GraphError::Transient("graph is down".into()))
            .failing("users", GraphError::Transient("graph is down".into()));
        let tenant = tenant();

        let summary = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap();

        assert_eq!(summary.status, AssessmentStatus::Completed);
        assert_eq!(summary.totals.error, 2);
        assert_eq!(summary.overall_score, 0.0);
        assert_eq!(summary.weighted_score, 0.0);

        let results = store.results.list_for_assessment(summary.id).await.unwrap();
        assert!(results.iter().all(|r| r.status == ControlStatus::Error));
        assert!(results.iter().all(|r| r.error_message.is_some()));
    }

    #[tokio::test]
    async fn auth_failure_fails_the_assessment() {
        let (engine, store) = engine(vec![control(
            "1.1.1",
            Severity::Level2,
            1.0,
            "entra.global_admin_mfa",
        )]);
        let graph = MockGraph::new().failing(
            "directoryRoles",
            GraphError::auth(maes_common::AuthCause::ConsentMissing, "consent missing"),
        );
        let tenant = tenant();

        let err = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Auth { .. }));

        let all = store.assessments.list_for_tenant(tenant.id, 10).await.unwrap();
        assert_eq!(all[0].status, AssessmentStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_preserves_partial_results() {
        // Ten manual-review controls; cancel after the third completes.
        let controls: Vec<_> = (1..=10)
            .map(|i| control(&format!("9.{i:02}"), Severity::Level1, 1.0, "nobody.home"))
            .collect();
        let (engine, store) = engine(controls);
        let graph = MockGraph::new()
            .with("organization", json!({"value": []}))
            .with("users", json!({"value": []}))
            .with("identity/conditionalAccess/policies", json!({"value": []}))
            .with("directoryRoles", json!({"value": []}));
        let tenant = tenant();

        let cancel = CancellationToken::new();
        let seen = Arc::new(AtomicU32::new(0));
        let trip = {
            let cancel = cancel.clone();
            let seen = seen.clone();
            Arc::new(move |_p: u8| {
                if seen.fetch_add(1, Ordering::SeqCst) + 1 == 4 {
                    // Events: progress 5 plus one per control; the fourth
                    // event lands after the third control persisted.
                    cancel.cancel();
                }
            })
        };

        let opts = RunOptions::new("run", TriggeredBy::Api)
            .with_cancel(cancel.clone())
            .with_progress(trip);
        let summary = engine.run(&tenant, &graph, Benchmark::Custom, opts).await.unwrap();

        assert_eq!(summary.status, AssessmentStatus::Cancelled);
        assert!(summary.completed_at.is_some());
        assert!(summary.progress >= 5 && summary.progress < 100);
        let results = store.results.list_for_assessment(summary.id).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn terminal_assessment_is_not_re_run() {
        let (engine, store) = engine(seed_controls());
        let graph = graph_with_admins(2, 2);
        let tenant = tenant();

        let first = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap();
        let calls_after_first = graph.calls().len();

        let second = engine
            .run(
                &tenant,
                &graph,
                Benchmark::Custom,
                RunOptions::new("run", TriggeredBy::Api).with_assessment_id(first.id),
            )
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.status, AssessmentStatus::Completed);
        assert_eq!(second.overall_score, first.overall_score);
        // No Graph traffic on the no-op path.
        assert_eq!(graph.calls().len(), calls_after_first);
        let results = store.results.list_for_assessment(first.id).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn capability_probe_is_recorded_on_parameters() {
        let (engine, store) = engine(seed_controls());
        let graph = graph_with_admins(2, 2);
        let tenant = tenant();

        let summary = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap();

        let assessment = store.assessments.get(summary.id).await.unwrap().unwrap();
        let probe = &assessment.parameters["capabilityProbe"];
        assert_eq!(probe["success"], Value::Bool(true));
        assert_eq!(probe["probes"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn totals_always_sum_to_total() {
        let (engine, _store) = engine(seed_controls());
        let graph = graph_with_admins(3, 1);
        let tenant = tenant();

        let summary = engine
            .run(&tenant, &graph, Benchmark::Custom, RunOptions::new("run", TriggeredBy::Api))
            .await
            .unwrap();
        assert_eq!(summary.totals.sum(), summary.totals.total);
        assert!(summary.overall_score >= 0.0 && summary.overall_score <= 100.0);
        assert!(summary.weighted_score >= 0.0 && summary.weighted_score <= 100.0);
    }
}
