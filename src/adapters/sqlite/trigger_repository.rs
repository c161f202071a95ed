//! SQLite implementation of the TriggerRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{format_datetime, is_unique_violation, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    GateDecision, StatusTransition, Trigger, TriggerOrigin, TriggerPriority, TriggerStatus,
};
use crate::domain::ports::{StatusChange, TriggerFilter, TriggerRepository};

#[derive(Clone)]
pub struct SqliteTriggerRepository {
    pool: SqlitePool,
}

impl SqliteTriggerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerRepository for SqliteTriggerRepository {
    async fn create(&self, trigger: &Trigger) -> DomainResult<bool> {
        let gate_json = trigger.gate_result.as_ref().map(serde_json::to_string).transpose()?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"INSERT INTO triggers (id, dedup_key, origin, source_url, source_feed_title, raw_content,
               company_symbol, company_name, sector, priority, priority_rank, triggered_by, human_notes,
               status, gate_result, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(trigger.id.to_string())
        .bind(&trigger.dedup_key)
        .bind(trigger.origin.as_str())
        .bind(&trigger.source_url)
        .bind(&trigger.source_feed_title)
        .bind(&trigger.raw_content)
        .bind(&trigger.company_symbol)
        .bind(&trigger.company_name)
        .bind(&trigger.sector)
        .bind(trigger.priority.as_str())
        .bind(trigger.priority as i64)
        .bind(&trigger.triggered_by)
        .bind(&trigger.human_notes)
        .bind(trigger.status.as_str())
        .bind(&gate_json)
        .bind(format_datetime(&trigger.created_at))
        .bind(format_datetime(&trigger.updated_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        for (seq, entry) in trigger.status_history.iter().enumerate() {
            sqlx::query(
                "INSERT INTO trigger_status_history (trigger_id, seq, status, reason, at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(trigger.id.to_string())
            .bind(seq as i64)
            .bind(entry.status.as_str())
            .bind(&entry.reason)
            .bind(format_datetime(&entry.at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Trigger>> {
        let row: Option<TriggerRow> = sqlx::query_as("SELECT * FROM triggers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let mut trigger: Trigger = r.try_into()?;
                self.load_history(&mut trigger).await?;
                Ok(Some(trigger))
            }
            None => Ok(None),
        }
    }

    async fn transition(&self, id: Uuid, change: StatusChange<'_>) -> DomainResult<()> {
        if !change.from.can_transition_to(change.to) {
            return Err(DomainError::InvalidStateTransition {
                from: change.from.as_str().to_string(),
                to: change.to.as_str().to_string(),
                reason: "transition not allowed".to_string(),
            });
        }

        let gate_json = change.gate_result.map(serde_json::to_string).transpose()?;
        let now = format_datetime(&Utc::now());

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"UPDATE triggers SET status = ?, updated_at = ?, gate_result = COALESCE(?, gate_result)
               WHERE id = ? AND status = ?"#,
        )
        .bind(change.to.as_str())
        .bind(&now)
        .bind(&gate_json)
        .bind(id.to_string())
        .bind(change.from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM triggers WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match current {
                None => DomainError::TriggerNotFound(id),
                Some((status,)) => DomainError::StatusConflict {
                    id,
                    expected: change.from.as_str().to_string(),
                    actual: status,
                },
            });
        }

        sqlx::query(
            r#"INSERT INTO trigger_status_history (trigger_id, seq, status, reason, at)
               SELECT ?, COALESCE(MAX(seq), -1) + 1, ?, ?, ?
               FROM trigger_status_history WHERE trigger_id = ?"#,
        )
        .bind(id.to_string())
        .bind(change.to.as_str())
        .bind(change.reason)
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn assign_company(&self, id: Uuid, symbol: &str, name: Option<&str>) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE triggers SET company_symbol = ?, company_name = COALESCE(company_name, ?), updated_at = ?
               WHERE id = ?"#,
        )
        .bind(symbol)
        .bind(name)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TriggerNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, filter: TriggerFilter) -> DomainResult<Vec<Trigger>> {
        let mut query = String::from("SELECT * FROM triggers WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(origin) = &filter.origin {
            query.push_str(" AND origin = ?");
            bindings.push(origin.as_str().to_string());
        }
        if let Some(symbol) = &filter.company_symbol {
            query.push_str(" AND company_symbol = ?");
            bindings.push(symbol.to_uppercase());
        }

        query.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, TriggerRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TriggerRow> = q.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn list_actionable(&self, limit: usize) -> DomainResult<Vec<Trigger>> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"SELECT * FROM triggers WHERE status IN ('pending', 'gate_passed')
               ORDER BY priority_rank DESC, created_at, rowid
               LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TriggerStatus, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM triggers GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TriggerStatus::from_str(&status_str) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    async fn count_by_origin(&self) -> DomainResult<HashMap<TriggerOrigin, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT origin, COUNT(*) FROM triggers GROUP BY origin")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = HashMap::new();
        for (origin_str, count) in rows {
            if let Some(origin) = TriggerOrigin::from_str(&origin_str) {
                counts.insert(origin, count as u64);
            }
        }
        Ok(counts)
    }
}

impl SqliteTriggerRepository {
    async fn load_history(&self, trigger: &mut Trigger) -> DomainResult<()> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT status, reason, at FROM trigger_status_history WHERE trigger_id = ? ORDER BY seq",
        )
        .bind(trigger.id.to_string())
        .fetch_all(&self.pool)
        .await?;

        trigger.status_history = rows
            .into_iter()
            .map(|(status, reason, at)| {
                let status = TriggerStatus::from_str(&status)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {status}")))?;
                Ok(StatusTransition { status, at: parse_datetime(&at)?, reason })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(())
    }

    async fn hydrate(&self, rows: Vec<TriggerRow>) -> DomainResult<Vec<Trigger>> {
        let mut triggers = Vec::with_capacity(rows.len());
        for row in rows {
            let mut trigger: Trigger = row.try_into()?;
            self.load_history(&mut trigger).await?;
            triggers.push(trigger);
        }
        Ok(triggers)
    }
}

#[derive(sqlx::FromRow)]
struct TriggerRow {
    id: String,
    dedup_key: Option<String>,
    origin: String,
    source_url: Option<String>,
    source_feed_title: Option<String>,
    raw_content: String,
    company_symbol: Option<String>,
    company_name: Option<String>,
    sector: Option<String>,
    priority: String,
    triggered_by: Option<String>,
    human_notes: Option<String>,
    status: String,
    gate_result: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TriggerRow> for Trigger {
    type Error = DomainError;

    fn try_from(row: TriggerRow) -> Result<Self, Self::Error> {
        let origin = TriggerOrigin::from_str(&row.origin)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid origin: {}", row.origin)))?;
        let priority = TriggerPriority::from_str(&row.priority)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid priority: {}", row.priority)))?;
        let status = TriggerStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let gate_result: Option<GateDecision> = row
            .gate_result
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(Trigger {
            id: parse_uuid(&row.id)?,
            dedup_key: row.dedup_key,
            origin,
            source_url: row.source_url,
            source_feed_title: row.source_feed_title,
            raw_content: row.raw_content,
            company_symbol: row.company_symbol,
            company_name: row.company_name,
            sector: row.sector,
            priority,
            triggered_by: row.triggered_by,
            human_notes: row.human_notes,
            status,
            status_history: Vec::new(),
            gate_result,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{GateMethod, TriggerCandidate};

    async fn setup() -> SqliteTriggerRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteTriggerRepository::new(pool)
    }

    fn feed(url: &str) -> Trigger {
        Trigger::from_candidate(
            TriggerCandidate::automated("Q3 results").with_source_url(url).with_company("ACME", "Acme Corp"),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup().await;
        let trigger = feed("https://x.test/1");

        assert!(repo.create(&trigger).await.unwrap());
        let loaded = repo.get(trigger.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, trigger.id);
        assert_eq!(loaded.status, TriggerStatus::Pending);
        assert_eq!(loaded.status_history.len(), 1);
        assert_eq!(loaded.dedup_key.as_deref(), Some("https://x.test/1"));
        assert_eq!(loaded.company_symbol.as_deref(), Some("ACME"));
    }

    #[tokio::test]
    async fn test_duplicate_dedup_key_is_rejected() {
        let repo = setup().await;
        assert!(repo.create(&feed("https://x.test/dup")).await.unwrap());
        assert!(!repo.create(&feed("https://x.test/dup")).await.unwrap());

        let all = repo.list(TriggerFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        let (history_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trigger_status_history")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(history_rows, 1);
    }

    #[tokio::test]
    async fn test_human_triggers_never_collide() {
        let repo = setup().await;
        let a = Trigger::from_candidate(TriggerCandidate::human("same text", "ana"));
        let b = Trigger::from_candidate(TriggerCandidate::human("same text", "ana"));
        assert!(repo.create(&a).await.unwrap());
        assert!(repo.create(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_transition_appends_history_and_gate_result() {
        let repo = setup().await;
        let trigger = feed("https://x.test/2");
        repo.create(&trigger).await.unwrap();

        let gate = GateDecision {
            passed: true,
            reason: "orders".into(),
            method: GateMethod::LlmClassification,
            model: Some("m".into()),
        };
        repo.transition(
            trigger.id,
            StatusChange {
                from: TriggerStatus::Pending,
                to: TriggerStatus::GatePassed,
                reason: "gate passed",
                gate_result: Some(&gate),
            },
        )
        .await
        .unwrap();
        repo.transition(
            trigger.id,
            StatusChange {
                from: TriggerStatus::GatePassed,
                to: TriggerStatus::Analyzing,
                reason: "Starting deep analysis",
                gate_result: None,
            },
        )
        .await
        .unwrap();

        let loaded = repo.get(trigger.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TriggerStatus::Analyzing);
        let statuses: Vec<_> = loaded.status_history.iter().map(|h| h.status).collect();
        assert_eq!(
            statuses,
            vec![TriggerStatus::Pending, TriggerStatus::GatePassed, TriggerStatus::Analyzing]
        );
        assert_eq!(loaded.gate_result, Some(gate));
        assert_eq!(loaded.last_reason(), Some("Starting deep analysis"));
    }

    #[tokio::test]
    async fn test_stale_transition_is_rejected() {
        let repo = setup().await;
        let trigger = feed("https://x.test/3");
        repo.create(&trigger).await.unwrap();
        let change = || StatusChange {
            from: TriggerStatus::Pending,
            to: TriggerStatus::FilteredOut,
            reason: "no_match",
            gate_result: None,
        };

        repo.transition(trigger.id, change()).await.unwrap();
        let err = repo.transition(trigger.id, change()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::StatusConflict { ref expected, ref actual, .. } if expected == "pending" && actual == "filtered_out"
        ));

        let loaded = repo.get(trigger.id).await.unwrap().unwrap();
        assert_eq!(loaded.status_history.len(), 2);
    }

    #[tokio::test]
    async fn test_disallowed_and_missing_transitions() {
        let repo = setup().await;
        let err = repo
            .transition(
                Uuid::new_v4(),
                StatusChange {
                    from: TriggerStatus::Pending,
                    to: TriggerStatus::Reported,
                    reason: "skip",
                    gate_result: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        let err = repo
            .transition(
                Uuid::new_v4(),
                StatusChange {
                    from: TriggerStatus::Pending,
                    to: TriggerStatus::Error,
                    reason: "x",
                    gate_result: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TriggerNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_actionable_orders_high_priority_first() {
        let repo = setup().await;
        let feed_trigger = feed("https://x.test/4");
        repo.create(&feed_trigger).await.unwrap();
        let human = Trigger::from_candidate(TriggerCandidate::human("look", "ana"));
        repo.create(&human).await.unwrap();
        let done = feed("https://x.test/5");
        repo.create(&done).await.unwrap();
        repo.transition(
            done.id,
            StatusChange {
                from: TriggerStatus::Pending,
                to: TriggerStatus::FilteredOut,
                reason: "no_match",
                gate_result: None,
            },
        )
        .await
        .unwrap();

        let actionable = repo.list_actionable(10).await.unwrap();
        let ids: Vec<_> = actionable.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![human.id, feed_trigger.id]);
    }

    #[tokio::test]
    async fn test_counts_and_filters() {
        let repo = setup().await;
        repo.create(&feed("https://x.test/6")).await.unwrap();
        repo.create(&feed("https://x.test/7")).await.unwrap();
        repo.create(&Trigger::from_candidate(TriggerCandidate::human("h", "ana"))).await.unwrap();

        let by_status = repo.count_by_status().await.unwrap();
        assert_eq!(by_status.get(&TriggerStatus::Pending), Some(&2));
        assert_eq!(by_status.get(&TriggerStatus::GatePassed), Some(&1));

        let by_origin = repo.count_by_origin().await.unwrap();
        assert_eq!(by_origin.get(&TriggerOrigin::Human), Some(&1));

        let acme = repo
            .list(TriggerFilter { company_symbol: Some("acme".into()), limit: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(acme.len(), 1);
    }

    #[tokio::test]
    async fn test_assign_company_keeps_existing_name() {
        let repo = setup().await;
        let trigger = Trigger::from_candidate(TriggerCandidate::automated("text"));
        repo.create(&trigger).await.unwrap();

        repo.assign_company(trigger.id, "ACME", Some("Acme Corp")).await.unwrap();
        repo.assign_company(trigger.id, "ACME", Some("Other")).await.unwrap();

        let loaded = repo.get(trigger.id).await.unwrap().unwrap();
        assert_eq!(loaded.company_symbol.as_deref(), Some("ACME"));
        assert_eq!(loaded.company_name.as_deref(), Some("Acme Corp"));
    }
}
