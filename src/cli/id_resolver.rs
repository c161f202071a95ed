//! Short ID prefix resolution for show commands.
//!
//! Any unique prefix of a UUID works in place of the full id, like git
//! short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Entities addressable by id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Trigger,
    Investigation,
    Assessment,
    Report,
}

impl Entity {
    const fn name(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Investigation => "investigation",
            Self::Assessment => "assessment",
            Self::Report => "report",
        }
    }

    const fn query(self) -> &'static str {
        match self {
            Self::Trigger => "SELECT id FROM triggers WHERE id LIKE ? ORDER BY id",
            Self::Investigation => "SELECT id FROM investigations WHERE id LIKE ? ORDER BY id",
            Self::Assessment => "SELECT id FROM assessments WHERE id LIKE ? ORDER BY id",
            Self::Report => "SELECT id FROM reports WHERE id LIKE ? ORDER BY id",
        }
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

/// Resolve a full id or unique prefix to a UUID.
pub async fn resolve_id(pool: &SqlitePool, entity: Entity, prefix: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;
    let pattern = format!("{}%", prefix.to_lowercase());
    let rows: Vec<(String,)> = sqlx::query_as(entity.query()).bind(&pattern).fetch_all(pool).await?;

    match rows.as_slice() {
        [] => bail!("No {} found matching '{prefix}'", entity.name()),
        [(id,)] => Ok(Uuid::parse_str(id)?),
        many => {
            let mut msg = format!("Ambiguous prefix '{prefix}': matches {} {}s:", many.len(), entity.name());
            for (id,) in many {
                msg.push_str("\n  ");
                msg.push_str(id);
            }
            bail!(msg)
        }
    }
}
