//! Trigger orchestrator: drives each trigger through the pipeline state
//! machine.
//!
//! ```text
//! pending -> filtered_out
//!         -> gate_passed -> analyzing -> analyzed -> [not significant: stop]
//!                                                 -> assessing -> assessed -> reported
//! any non-terminal state -> error
//! ```
//!
//! Every status change is a compare-and-swap committed with its history
//! entry, so a trigger interrupted mid-stage keeps its last committed status.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GateDecision, PipelineConfig, Trigger, TriggerOrigin, TriggerStatus};
use crate::domain::ports::{StatusChange, TriggerRepository};
use crate::services::decision_assessor::DecisionAssessor;
use crate::services::gate_classifier::GateClassifier;
use crate::services::investigation_builder::InvestigationBuilder;
use crate::services::report_emitter::ReportEmitter;
use crate::services::watchlist_filter::WatchlistFilter;

/// Where one call to [`TriggerOrchestrator::process`] left the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    FilteredOut { reason: String },
    /// Investigated and found not significant; no assessment follows
    NotSignificant { investigation_id: Uuid },
    Reported { report_id: Uuid, delivered_via: Vec<String> },
    Errored { reason: String },
    /// Not actionable, or already being processed
    Skipped,
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FilteredOut { .. } => "filtered_out",
            Self::NotSignificant { .. } => "not_significant",
            Self::Reported { .. } => "reported",
            Self::Errored { .. } => "errored",
            Self::Skipped => "skipped",
        }
    }
}

/// Tally of one backlog pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub outcomes: Vec<(Uuid, ProcessOutcome)>,
    /// Tasks that failed outside the state machine (store errors, panics)
    pub failures: usize,
}

impl BatchSummary {
    pub fn count(&self, label: &str) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.label() == label).count()
    }
}

/// Trigger counts for the stats command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub total: u64,
    pub by_status: HashMap<TriggerStatus, u64>,
    pub by_origin: HashMap<TriggerOrigin, u64>,
}

/// The stage services a trigger passes through.
pub struct PipelineStages {
    pub filter: WatchlistFilter,
    pub gate: GateClassifier,
    pub builder: InvestigationBuilder,
    pub assessor: DecisionAssessor,
    pub emitter: ReportEmitter,
}

type TaskResult = (Uuid, DomainResult<ProcessOutcome>);

/// Removes a trigger from the in-flight set when dropped, including on abort.
struct InFlightGuard {
    id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.id);
        }
    }
}

pub struct TriggerOrchestrator {
    triggers: Arc<dyn TriggerRepository>,
    stages: PipelineStages,
    config: PipelineConfig,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl TriggerOrchestrator {
    pub fn new(triggers: Arc<dyn TriggerRepository>, stages: PipelineStages, config: PipelineConfig) -> Self {
        let permits = config.max_concurrent_triggers.max(1);
        Self {
            triggers,
            stages,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.stages.emitter.channel_names()
    }

    fn claim(&self, id: Uuid) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().ok()?;
        set.insert(id)
            .then(|| InFlightGuard { id, in_flight: Arc::clone(&self.in_flight) })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Run one trigger as far as it can go.
    ///
    /// Stage failures move the trigger to `error` and come back as
    /// [`ProcessOutcome::Errored`]; only store failures while loading the
    /// trigger are returned as errors.
    pub async fn process(&self, id: Uuid) -> DomainResult<ProcessOutcome> {
        let Some(_guard) = self.claim(id) else {
            debug!(trigger_id = %id, "trigger already in flight");
            return Ok(ProcessOutcome::Skipped);
        };
        self.process_claimed(id).await
    }

    #[instrument(skip(self), fields(trigger_id = %id))]
    async fn process_claimed(&self, id: Uuid) -> DomainResult<ProcessOutcome> {
        let mut trigger = self.triggers.get(id).await?.ok_or(DomainError::TriggerNotFound(id))?;
        if !trigger.status.is_actionable() {
            debug!(status = %trigger.status, "trigger not actionable");
            return Ok(ProcessOutcome::Skipped);
        }

        match self.advance(&mut trigger).await {
            Ok(outcome) => Ok(outcome),
            Err(DomainError::StatusConflict { expected, actual, .. }) => {
                warn!(expected = %expected, actual = %actual, "trigger taken over by another worker");
                Ok(ProcessOutcome::Skipped)
            }
            Err(err) => {
                let reason = format!("Pipeline error: {err}");
                error!(error = %err, "trigger failed");
                if self.fail(&trigger, &reason).await {
                    Ok(ProcessOutcome::Errored { reason })
                } else {
                    Ok(ProcessOutcome::Skipped)
                }
            }
        }
    }

    async fn transition(
        &self,
        trigger: &mut Trigger,
        to: TriggerStatus,
        reason: &str,
        gate_result: Option<&GateDecision>,
    ) -> DomainResult<()> {
        let from = trigger.status;
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
                reason: reason.to_string(),
            });
        }
        self.triggers.transition(trigger.id, StatusChange { from, to, reason, gate_result }).await?;
        trigger.status = to;
        info!(from = %from, to = %to, reason, "trigger status changed");
        Ok(())
    }

    /// Move the trigger to `error` from the last status this worker
    /// committed. Returns `false` when another worker has moved it since.
    async fn fail(&self, trigger: &Trigger, reason: &str) -> bool {
        if !trigger.status.can_transition_to(TriggerStatus::Error) {
            return true;
        }
        let change = StatusChange {
            from: trigger.status,
            to: TriggerStatus::Error,
            reason,
            gate_result: None,
        };
        match self.triggers.transition(trigger.id, change).await {
            Ok(()) => true,
            Err(DomainError::StatusConflict { actual, .. }) => {
                warn!(actual = %actual, "trigger moved by another worker, failure not recorded");
                false
            }
            Err(err) => {
                error!(error = %err, "could not record trigger failure");
                true
            }
        }
    }

    async fn advance(&self, trigger: &mut Trigger) -> DomainResult<ProcessOutcome> {
        if trigger.company_symbol.is_none() {
            if let Some((symbol, name)) = self.stages.filter.resolve_company(trigger) {
                self.triggers.assign_company(trigger.id, &symbol, Some(&name)).await?;
                debug!(company_symbol = %symbol, "company resolved from watchlist");
                trigger.company_symbol = Some(symbol);
                trigger.company_name.get_or_insert(name);
            }
        }

        if trigger.status == TriggerStatus::Pending {
            if trigger.is_human() {
                let bypass = GateDecision::human_bypass();
                self.transition(trigger, TriggerStatus::GatePassed, &bypass.reason, Some(&bypass)).await?;
            } else {
                let filtered = self.stages.filter.check(trigger);
                if !filtered.passed {
                    self.transition(trigger, TriggerStatus::FilteredOut, &filtered.reason, None).await?;
                    return Ok(ProcessOutcome::FilteredOut { reason: filtered.reason });
                }
                debug!(method = filtered.method.as_str(), reason = %filtered.reason, "watchlist filter passed");

                let gate = self.stages.gate.classify(trigger).await;
                if !gate.passed {
                    self.transition(trigger, TriggerStatus::FilteredOut, &gate.reason, Some(&gate)).await?;
                    return Ok(ProcessOutcome::FilteredOut { reason: gate.reason });
                }
                self.transition(trigger, TriggerStatus::GatePassed, &gate.reason, Some(&gate)).await?;
            }
        }

        self.transition(trigger, TriggerStatus::Analyzing, "Starting deep analysis", None).await?;
        let investigation = self.stages.builder.build(trigger).await?;
        let reason = format!("Analysis complete. Significance: {}", investigation.significance.as_str());
        self.transition(trigger, TriggerStatus::Analyzed, &reason, None).await?;

        if !investigation.is_significant {
            return Ok(ProcessOutcome::NotSignificant { investigation_id: investigation.id });
        }

        self.transition(trigger, TriggerStatus::Assessing, "Starting decision assessment", None).await?;
        let assessment = self.stages.assessor.assess(&investigation).await?;
        let reason = format!("Assessment complete. Recommendation: {}", assessment.new_recommendation);
        self.transition(trigger, TriggerStatus::Assessed, &reason, None).await?;

        let report = self.stages.emitter.emit(&investigation, &assessment).await?;
        let delivered_via = self.stages.emitter.deliver(&report).await?;
        let reason = if delivered_via.is_empty() {
            "Report generated".to_string()
        } else {
            format!("Report generated and delivered via {}", delivered_via.join(", "))
        };
        self.transition(trigger, TriggerStatus::Reported, &reason, None).await?;

        Ok(ProcessOutcome::Reported { report_id: report.id, delivered_via })
    }

    /// Spawn a task for each actionable trigger not already in flight.
    async fn schedule(self: &Arc<Self>, tasks: &mut JoinSet<TaskResult>, limit: usize) -> DomainResult<usize> {
        let backlog = self.triggers.list_actionable(limit).await?;
        let mut scheduled = 0;
        for trigger in backlog {
            let Some(guard) = self.claim(trigger.id) else {
                continue;
            };
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (trigger.id, Ok(ProcessOutcome::Skipped));
                };
                (trigger.id, this.process_claimed(trigger.id).await)
            });
            scheduled += 1;
        }
        if scheduled > 0 {
            debug!(scheduled, "triggers scheduled");
        }
        Ok(scheduled)
    }

    /// Process up to `limit` backlog triggers concurrently and wait for all
    /// of them.
    pub async fn process_pending(self: &Arc<Self>, limit: usize) -> DomainResult<BatchSummary> {
        let mut tasks = JoinSet::new();
        self.schedule(&mut tasks, limit).await?;

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            record(&mut summary, joined);
        }
        info!(
            processed = summary.outcomes.len(),
            reported = summary.count("reported"),
            filtered_out = summary.count("filtered_out"),
            errored = summary.count("errored"),
            failures = summary.failures,
            "backlog pass complete"
        );
        Ok(summary)
    }

    /// Poll the backlog until `shutdown` fires, then drain in-flight
    /// triggers for the grace period and abort whatever is left.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> BatchSummary {
        let mut tasks = JoinSet::new();
        let mut summary = BatchSummary::default();
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_concurrent = self.config.max_concurrent_triggers,
            poll_interval_secs = self.config.poll_interval_secs,
            "orchestrator started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.schedule(&mut tasks, self.config.batch_size).await {
                        error!(error = %err, "failed to load backlog");
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => record(&mut summary, joined),
            }
        }

        info!(in_flight = tasks.len(), "shutdown requested, draining in-flight triggers");
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                record(&mut summary, joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), "grace period elapsed, aborting in-flight triggers");
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                if !matches!(&joined, Err(e) if e.is_cancelled()) {
                    record(&mut summary, joined);
                }
            }
        }

        info!(processed = summary.outcomes.len(), "orchestrator stopped");
        summary
    }

    pub async fn stats(&self) -> DomainResult<PipelineStats> {
        let by_status = self.triggers.count_by_status().await?;
        let by_origin = self.triggers.count_by_origin().await?;
        Ok(PipelineStats { total: by_status.values().sum(), by_status, by_origin })
    }
}

fn record(summary: &mut BatchSummary, joined: Result<TaskResult, JoinError>) {
    match joined {
        Ok((id, Ok(outcome))) => summary.outcomes.push((id, outcome)),
        Ok((id, Err(err))) => {
            error!(trigger_id = %id, error = %err, "trigger processing failed");
            summary.failures += 1;
        }
        Err(err) => {
            error!(error = %err, "trigger task did not complete");
            summary.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::capabilities::ScriptedCapability;
    use crate::adapters::delivery::RecordingChannel;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{
        Config, GateMethod, RetryConfig, SignificanceLevel, TriggerCandidate, WatchedCompany, WatchedSector,
        WatchlistConfig,
    };
    use crate::domain::ports::{CapabilityError, Stage, TriggerFilter};
    use crate::services::ingest::IngestOutcome;
    use crate::services::pipeline::{Collaborators, Pipeline, Repositories};

    struct Harness {
        pipeline: Pipeline,
        cap: Arc<ScriptedCapability>,
        channel: Arc<RecordingChannel>,
    }

    fn watchlist() -> WatchlistConfig {
        WatchlistConfig {
            sectors: vec![WatchedSector { name: "Capital Goods".into(), keywords: vec!["order".into()] }],
            companies: vec![WatchedCompany {
                symbol: "ACME".into(),
                name: "Acme Corp".into(),
                sector: Some("Capital Goods".into()),
                aliases: vec![],
                monitoring_active: true,
            }],
            global_keywords: vec![],
        }
    }

    async fn harness(cap: ScriptedCapability) -> Harness {
        let pool = create_migrated_test_pool().await.unwrap();
        let mut config = Config::default();
        config.retry = RetryConfig { max_retries: 0, initial_backoff_ms: 1, max_backoff_ms: 1 };
        config.pipeline.max_concurrent_triggers = 2;
        config.pipeline.poll_interval_secs = 1;
        config.pipeline.shutdown_grace_secs = 5;

        let cap = Arc::new(cap);
        let channel = Arc::new(RecordingChannel::new("recording"));
        let collaborators = Collaborators::new(cap.clone()).with_channel(channel.clone());
        let pipeline = Pipeline::assemble(&config, &watchlist(), Repositories::sqlite(&pool), collaborators);
        Harness { pipeline, cap, channel }
    }

    async fn submit(h: &Harness, candidate: TriggerCandidate) -> Uuid {
        match h.pipeline.ingest.submit(candidate).await.unwrap() {
            IngestOutcome::Accepted(id) => id,
            other => panic!("unexpected {other:?}"),
        }
    }

    async fn load(h: &Harness, id: Uuid) -> Trigger {
        h.pipeline.repositories.triggers.get(id).await.unwrap().unwrap()
    }

    fn statuses(t: &Trigger) -> Vec<TriggerStatus> {
        t.status_history.iter().map(|s| s.status).collect()
    }

    #[tokio::test]
    async fn test_full_run_to_reported() {
        let h = harness(ScriptedCapability::new()).await;
        let id = submit(&h, TriggerCandidate::automated("Q3 results").with_company("ACME", "Acme Corp")).await;

        let outcome = h.pipeline.orchestrator.process(id).await.unwrap();
        let ProcessOutcome::Reported { report_id, delivered_via } = outcome else {
            panic!("expected reported, got {outcome:?}");
        };
        assert_eq!(delivered_via, vec!["recording".to_string()]);
        assert_eq!(h.channel.delivered().await, vec![report_id]);

        let t = load(&h, id).await;
        assert_eq!(
            statuses(&t),
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
        assert_eq!(t.last_reason(), Some("Report generated and delivered via recording"));
        assert_eq!(t.gate_result.unwrap().method, GateMethod::LlmClassification);
        assert_eq!(t.status_history[3].reason, "Analysis complete. Significance: high");
    }

    #[tokio::test]
    async fn test_watchlist_rejection_skips_classifier() {
        let h = harness(ScriptedCapability::new()).await;
        let id = submit(&h, TriggerCandidate::automated("Weather update").with_company("XYZ", "Xyz Ltd")).await;

        let outcome = h.pipeline.orchestrator.process(id).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::FilteredOut { .. }));
        assert_eq!(h.cap.calls(Stage::Gate).await, 0);

        let t = load(&h, id).await;
        assert_eq!(t.status, TriggerStatus::FilteredOut);
        assert_eq!(t.last_reason(), Some("No watchlist symbol/name/sector-keyword match"));
        assert!(t.gate_result.is_none());
    }

    #[tokio::test]
    async fn test_classifier_rejection_is_filtered_out() {
        let h = harness(
            ScriptedCapability::new()
                .with_response(Stage::Gate, Ok(ScriptedCapability::gate_output(false, "Routine compliance filing"))),
        )
        .await;
        let id = submit(&h, TriggerCandidate::automated("Trading window closure").with_company("ACME", "Acme")).await;

        h.pipeline.orchestrator.process(id).await.unwrap();
        let t = load(&h, id).await;
        assert_eq!(t.status, TriggerStatus::FilteredOut);
        assert_eq!(t.last_reason(), Some("Routine compliance filing"));
        assert!(!t.gate_result.unwrap().passed);
        assert_eq!(h.cap.calls(Stage::Analysis).await, 0);
    }

    #[tokio::test]
    async fn test_failing_classifier_fails_open() {
        let h = harness(
            ScriptedCapability::new().with_default(Stage::Gate, Err(CapabilityError::Timeout(30))),
        )
        .await;
        let id = submit(&h, TriggerCandidate::automated("Order win").with_company("ACME", "Acme")).await;

        h.pipeline.orchestrator.process(id).await.unwrap();
        let t = load(&h, id).await;
        assert_eq!(t.status_history[1].status, TriggerStatus::GatePassed);
        assert_eq!(t.gate_result.unwrap().method, GateMethod::ErrorFallthrough);
        assert_eq!(t.status, TriggerStatus::Reported);
    }

    #[tokio::test]
    async fn test_not_significant_stops_at_analyzed() {
        let h = harness(ScriptedCapability::new().with_default(
            Stage::Analysis,
            Ok(ScriptedCapability::analysis_output(SignificanceLevel::Low, false)),
        ))
        .await;
        let id = submit(&h, TriggerCandidate::human("Board meeting scheduled", "ana").with_company("ACME", "Acme")).await;

        let outcome = h.pipeline.orchestrator.process(id).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::NotSignificant { .. }));
        assert_eq!(load(&h, id).await.status, TriggerStatus::Analyzed);
        assert_eq!(h.cap.calls(Stage::Decision).await, 0);
        assert!(h.pipeline.repositories.assessments.list_recent(10).await.unwrap().is_empty());
        assert!(h.pipeline.repositories.reports.list(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_moves_to_error() {
        let h = harness(ScriptedCapability::new().with_default(
            Stage::Analysis,
            Err(CapabilityError::Rejected { status: 400, message: "prompt too long".into() }),
        ))
        .await;
        let id = submit(&h, TriggerCandidate::human("look", "ana").with_company("ACME", "Acme")).await;

        let outcome = h.pipeline.orchestrator.process(id).await.unwrap();
        let ProcessOutcome::Errored { reason } = outcome else {
            panic!("expected error outcome");
        };
        assert!(reason.starts_with("Pipeline error:"));
        let t = load(&h, id).await;
        assert_eq!(t.status, TriggerStatus::Error);
        assert_eq!(t.status_history.last().unwrap().reason, reason);
        assert_eq!(statuses(&t)[t.status_history.len() - 2], TriggerStatus::Analyzing);
    }

    #[tokio::test]
    async fn test_reprocessing_reported_trigger_creates_nothing() {
        let h = harness(ScriptedCapability::new()).await;
        let id = submit(&h, TriggerCandidate::human("look", "ana").with_company("ACME", "Acme")).await;
        h.pipeline.orchestrator.process(id).await.unwrap();
        let history_len = load(&h, id).await.status_history.len();

        assert_eq!(h.pipeline.orchestrator.process(id).await.unwrap(), ProcessOutcome::Skipped);
        assert_eq!(load(&h, id).await.status_history.len(), history_len);
        assert_eq!(h.cap.calls(Stage::Analysis).await, 1);
        assert_eq!(h.pipeline.repositories.reports.list(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_trigger_is_an_error() {
        let h = harness(ScriptedCapability::new()).await;
        let err = h.pipeline.orchestrator.process(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::TriggerNotFound(_)));
    }

    #[tokio::test]
    async fn test_company_resolved_from_content() {
        let h = harness(ScriptedCapability::new()).await;
        let id = submit(&h, TriggerCandidate::automated("Acme Corp bags a large order")).await;

        h.pipeline.orchestrator.process(id).await.unwrap();
        let t = load(&h, id).await;
        assert_eq!(t.company_symbol.as_deref(), Some("ACME"));
        assert_eq!(t.status, TriggerStatus::Reported);
        assert!(h.pipeline.repositories.positions.get("ACME").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_blank_symbol_is_resolved_before_assessment() {
        let h = harness(ScriptedCapability::new()).await;
        let id = submit(&h, TriggerCandidate::automated("Acme Corp bags a large order").with_company("  ", "")).await;

        let outcome = h.pipeline.orchestrator.process(id).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Reported { .. }), "got {outcome:?}");
        assert_eq!(load(&h, id).await.company_symbol.as_deref(), Some("ACME"));
    }

    #[tokio::test]
    async fn test_process_pending_runs_backlog() {
        let h = harness(ScriptedCapability::new().with_delay(Duration::from_millis(5))).await;
        for n in 0..3 {
            submit(&h, TriggerCandidate::automated(format!("order {n}")).with_company("ACME", "Acme")).await;
        }
        submit(&h, TriggerCandidate::automated("nothing here").with_company("ZZZ", "Zzz")).await;

        let summary = h.pipeline.orchestrator.process_pending(10).await.unwrap();
        assert_eq!(summary.outcomes.len(), 4);
        assert_eq!(summary.count("reported"), 3);
        assert_eq!(summary.count("filtered_out"), 1);
        assert_eq!(summary.failures, 0);
        assert_eq!(h.pipeline.orchestrator.in_flight(), 0);

        // per-company lock keeps the position history gapless
        let position = h.pipeline.repositories.positions.get("ACME").await.unwrap().unwrap();
        let changed = h
            .pipeline
            .repositories
            .assessments
            .list_by_company("ACME")
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.recommendation_changed)
            .count();
        assert_eq!(position.timeline().len(), changed);

        let again = h.pipeline.orchestrator.process_pending(10).await.unwrap();
        assert!(again.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let h = harness(ScriptedCapability::new()).await;
        let id = submit(&h, TriggerCandidate::human("look", "ana").with_company("ACME", "Acme")).await;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&h.pipeline.orchestrator).run(shutdown.clone()));

        let mut reported = false;
        for _ in 0..100 {
            if load(&h, id).await.status == TriggerStatus::Reported {
                reported = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.cancel();
        let summary = handle.await.unwrap();

        assert!(reported);
        assert_eq!(summary.count("reported"), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let h = harness(ScriptedCapability::new()).await;
        submit(&h, TriggerCandidate::human("look", "ana").with_company("ACME", "Acme")).await;
        submit(&h, TriggerCandidate::automated("nothing").with_company("ZZZ", "Zzz")).await;
        h.pipeline.orchestrator.process_pending(10).await.unwrap();

        let stats = h.pipeline.orchestrator.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get(&TriggerStatus::Reported), Some(&1));
        assert_eq!(stats.by_status.get(&TriggerStatus::FilteredOut), Some(&1));
        assert_eq!(stats.by_origin.get(&TriggerOrigin::Human), Some(&1));

        let listed = h
            .pipeline
            .repositories
            .triggers
            .list(TriggerFilter { status: Some(TriggerStatus::Reported), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
