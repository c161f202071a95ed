//! End-to-end properties of the trigger pipeline.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use equiwatch::adapters::capabilities::ScriptedCapability;
use equiwatch::adapters::sqlite::{create_pool, database_url, initialize_database, SqliteTriggerRepository};
use equiwatch::domain::models::{
    DeliveryStatus, GateMethod, Recommendation, SignificanceLevel, TokenUsage, TriggerCandidate, TriggerStatus,
};
use equiwatch::domain::ports::{CapabilityError, Stage, TriggerFilter, TriggerRepository};
use equiwatch::services::{CostTracker, IngestOutcome, IngestService, ProcessOutcome, WatchlistFilter};
use tempfile::TempDir;

use common::{pipeline, pipeline_on, pipeline_with, watched, watchlist};

#[tokio::test]
async fn concurrent_submissions_of_one_key_persist_one_trigger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dedup.db");
    let pool = initialize_database(&database_url(&path.display().to_string()), None).await.unwrap();
    let repo = Arc::new(SqliteTriggerRepository::new(pool));
    let ingest = Arc::new(IngestService::new(repo.clone()));

    let mut handles = Vec::new();
    for n in 0..8 {
        let ingest = ingest.clone();
        handles.push(tokio::spawn(async move {
            let candidate = TriggerCandidate::automated(format!("copy {n}"))
                .with_source_url("https://exchange.test/ann/4411.pdf");
            ingest.submit(candidate).await.unwrap()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), IngestOutcome::Accepted(_)) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(repo.list(TriggerFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn classifier_failure_fails_open() {
    let t = pipeline_with(
        ScriptedCapability::new()
            .with_default(Stage::Gate, Err(CapabilityError::Server { status: 503, message: "overloaded".into() })),
    )
    .await;
    let id = t.submit(watched("Board approves capacity expansion")).await;

    let outcome = t.pipeline.orchestrator.process(id).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Reported { .. }), "got {outcome:?}");

    let trigger = t.trigger(id).await;
    assert_eq!(trigger.status_history[1].status, TriggerStatus::GatePassed);
    let gate = trigger.gate_result.unwrap();
    assert!(gate.passed);
    assert_eq!(gate.method, GateMethod::ErrorFallthrough);
    assert!(!t.statuses(id).await.contains(&TriggerStatus::FilteredOut));
}

#[test]
fn first_cascade_rule_wins() {
    let filter = WatchlistFilter::new(&watchlist());
    let trigger = equiwatch::Trigger::from_candidate(
        watched("Order inflow and revenue guidance raised").with_sector("Capital Goods"),
    );
    let result = filter.check(&trigger);
    assert!(result.passed);
    assert_eq!(result.method.as_str(), "symbol_match");
}

#[tokio::test]
async fn position_history_reconstructs_every_change() {
    let script = ScriptedCapability::new()
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(true, Recommendation::Buy, 0.7)))
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(false, Recommendation::Buy, 0.5)))
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(true, Recommendation::Hold, 0.6)))
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(true, Recommendation::Sell, 0.8)))
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(false, Recommendation::Sell, 0.4)));
    let t = pipeline_with(script).await;

    for n in 0..5 {
        let id = t.submit(watched(&format!("Quarterly update {n}"))).await;
        t.pipeline.orchestrator.process(id).await.unwrap();
    }

    let assessments = t.pipeline.repositories.assessments.list_by_company("INOXWIND").await.unwrap();
    assert_eq!(assessments.len(), 5);
    let changed: Vec<_> = assessments
        .iter()
        .filter(|a| a.recommendation_changed)
        .map(|a| (a.id, a.new_recommendation))
        .collect();

    let position = t.pipeline.repositories.positions.get("INOXWIND").await.unwrap().unwrap();
    assert_eq!(position.timeline(), changed);
    assert_eq!(position.current_recommendation, Recommendation::Sell);

    let unique: HashSet<_> = position.timeline().iter().map(|(id, _)| *id).collect();
    assert_eq!(unique.len(), 3);
}

#[tokio::test]
async fn inconclusive_investigations_are_offered_to_later_decisions() {
    let script = ScriptedCapability::new()
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(false, Recommendation::None, 0.5)))
        .with_response(Stage::Decision, Ok(ScriptedCapability::decision_output(false, Recommendation::None, 0.5)));
    let t = pipeline_with(script).await;

    let mut investigation_ids = Vec::new();
    for content in ["Order win one", "Order win two", "Order win three"] {
        let id = t.submit(watched(content)).await;
        t.pipeline.orchestrator.process(id).await.unwrap();
        let investigation = t.pipeline.repositories.investigations.get_by_trigger(id).await.unwrap().unwrap();
        investigation_ids.push(investigation.id);
    }

    let requests = t.capability.decision_requests().await;
    assert_eq!(requests.len(), 3);
    let offered: Vec<_> = requests[2].inconclusive_investigations.iter().map(|s| s.investigation_id).collect();
    assert!(offered.contains(&investigation_ids[0]));
    assert!(offered.contains(&investigation_ids[1]));

    let third = t.pipeline.repositories.assessments.get_by_investigation(investigation_ids[2]).await.unwrap().unwrap();
    assert!(third.recommendation_changed);
    let resurrected: HashSet<_> = third.past_inconclusive_resurrected.iter().copied().collect();
    assert!(resurrected.contains(&investigation_ids[0]) && resurrected.contains(&investigation_ids[1]));
}

#[tokio::test]
async fn insignificant_investigation_stops_at_analyzed() {
    let t = pipeline_with(
        ScriptedCapability::new()
            .with_default(Stage::Analysis, Ok(ScriptedCapability::analysis_output(SignificanceLevel::Low, false))),
    )
    .await;
    let id = t.submit(watched("Change in registered office")).await;

    let outcome = t.pipeline.orchestrator.process(id).await.unwrap();
    let ProcessOutcome::NotSignificant { investigation_id } = outcome else {
        panic!("expected not significant, got {outcome:?}");
    };

    assert_eq!(t.trigger(id).await.status, TriggerStatus::Analyzed);
    assert!(t.pipeline.repositories.assessments.get_by_investigation(investigation_id).await.unwrap().is_none());
    assert!(t.pipeline.repositories.reports.list(None, 10).await.unwrap().is_empty());
    assert_eq!(t.capability.calls(Stage::Decision).await, 0);
    assert_eq!(t.capability.calls(Stage::Report).await, 0);

    // analyzed is terminal for the orchestrator
    assert_eq!(t.pipeline.orchestrator.process(id).await.unwrap(), ProcessOutcome::Skipped);
}

#[tokio::test]
async fn reprocessing_a_reported_trigger_changes_nothing() {
    let t = pipeline().await;
    let id = t.submit(watched("Q2 results")).await;
    assert!(matches!(t.pipeline.orchestrator.process(id).await.unwrap(), ProcessOutcome::Reported { .. }));
    let history_len = t.trigger(id).await.status_history.len();

    assert_eq!(t.pipeline.orchestrator.process(id).await.unwrap(), ProcessOutcome::Skipped);
    let summary = t.pipeline.orchestrator.process_pending(10).await.unwrap();
    assert!(summary.outcomes.is_empty());

    assert_eq!(t.pipeline.repositories.investigations.list_recent(10).await.unwrap().len(), 1);
    assert_eq!(t.pipeline.repositories.assessments.list_recent(10).await.unwrap().len(), 1);
    assert_eq!(t.pipeline.repositories.reports.list(None, 10).await.unwrap().len(), 1);
    assert_eq!(t.trigger(id).await.status_history.len(), history_len);
    assert_eq!(t.capability.calls(Stage::Analysis).await, 1);
}

#[tokio::test]
async fn acme_keyword_match_runs_to_reported() {
    let t = pipeline().await;
    let id = t
        .submit(
            TriggerCandidate::automated("Q3 results, revenue up 20%")
                .with_company("ACME", "Acme Industries")
                .with_sector("Capital Goods"),
        )
        .await;

    let filter = WatchlistFilter::new(&watchlist());
    assert_eq!(filter.check(&t.trigger(id).await).method.as_str(), "keyword_match");

    let outcome = t.pipeline.orchestrator.process(id).await.unwrap();
    let ProcessOutcome::Reported { report_id, delivered_via } = outcome else {
        panic!("expected reported, got {outcome:?}");
    };
    assert_eq!(delivered_via, vec!["recording".to_string()]);

    let investigation = t.pipeline.repositories.investigations.get_by_trigger(id).await.unwrap().unwrap();
    assert!(investigation.is_significant);
    assert_eq!(investigation.significance, SignificanceLevel::High);

    let position = t.pipeline.repositories.positions.get("ACME").await.unwrap().unwrap();
    assert_eq!(position.current_recommendation, Recommendation::Buy);

    let report = t.pipeline.repositories.reports.get(report_id).await.unwrap().unwrap();
    assert_eq!(report.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(t.trigger(id).await.status, TriggerStatus::Reported);
}

#[tokio::test]
async fn stage_failure_is_recorded_and_other_triggers_continue() {
    let t = pipeline_with(
        ScriptedCapability::new()
            .with_response(Stage::Analysis, Err(CapabilityError::Timeout(5))),
    )
    .await;
    let first = t.submit(watched("Order win A")).await;
    let second = t.submit(watched("Order win B")).await;

    let summary = t.pipeline.orchestrator.process_pending(10).await.unwrap();
    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.count("errored"), 1);
    assert_eq!(summary.count("reported"), 1);

    let statuses = [t.trigger(first).await.status, t.trigger(second).await.status];
    assert!(statuses.contains(&TriggerStatus::Error));
    assert!(statuses.contains(&TriggerStatus::Reported));

    let errored = if statuses[0] == TriggerStatus::Error { first } else { second };
    let reason = t.trigger(errored).await.last_reason().unwrap_or_default().to_string();
    assert!(reason.starts_with("Pipeline error"), "{reason}");
}

#[tokio::test]
async fn two_workers_racing_on_one_trigger_do_not_error_it() {
    let dir = TempDir::new().unwrap();
    let url = database_url(&dir.path().join("shared.db").display().to_string());
    let first_pool = initialize_database(&url, None).await.unwrap();
    let second_pool = create_pool(&url, None).await.unwrap();

    let capability = Arc::new(ScriptedCapability::new().with_delay(Duration::from_millis(50)));
    let first = pipeline_on(&first_pool, capability.clone());
    let second = pipeline_on(&second_pool, capability.clone());
    let id = first.submit(watched("Inox Wind bags a 200 MW order")).await;

    let (a, b) = tokio::join!(first.pipeline.orchestrator.process(id), second.pipeline.orchestrator.process(id));
    let mut outcomes = vec![a.unwrap().label(), b.unwrap().label()];
    outcomes.sort_unstable();
    assert_eq!(outcomes, vec!["reported", "skipped"]);

    let trigger = second.trigger(id).await;
    assert_eq!(trigger.status, TriggerStatus::Reported);
    assert!(trigger.status_history.iter().all(|h| h.status != TriggerStatus::Error));
    assert_eq!(
        first.statuses(id).await,
        vec![
            TriggerStatus::Pending,
            TriggerStatus::GatePassed,
            TriggerStatus::Analyzing,
            TriggerStatus::Analyzed,
            TriggerStatus::Assessing,
            TriggerStatus::Assessed,
            TriggerStatus::Reported,
        ]
    );
    assert_eq!(capability.calls(Stage::Analysis).await, 1);
    assert_eq!(first.pipeline.repositories.reports.list(None, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reported_trigger_is_costed_across_stages() {
    let since = chrono::Utc::now() - chrono::Duration::seconds(1);
    let t = pipeline_with(ScriptedCapability::new().with_usage(TokenUsage::new(1_000, 200))).await;
    let id = t.submit(watched("Inox Wind bags 200 MW order, revenue guidance raised")).await;
    let outcome = t.pipeline.orchestrator.process(id).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Reported { .. }), "got {outcome:?}");

    let repos = &t.pipeline.repositories;
    let tracker =
        CostTracker::new(repos.investigations.clone(), repos.assessments.clone(), repos.reports.clone());
    let summary = tracker.summarize(since, chrono::Utc::now()).await.unwrap();

    let models: Vec<_> = summary.by_model.iter().map(|m| m.model.as_str()).collect();
    assert_eq!(models, vec!["scripted-analysis", "scripted-decision", "scripted-report"]);
    assert_eq!(summary.usage, TokenUsage::new(3_000, 600));
    assert_eq!(summary.completed_reports, 1);
    assert!((summary.cost_per_report_usd - summary.estimated_cost_usd).abs() < 1e-12);
}
