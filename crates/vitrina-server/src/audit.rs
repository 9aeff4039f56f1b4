//! Append-only audit log
//!
//! Every write the gateway or lifecycle performs records the actor plus
//! before/after snapshots of the affected row. The log is never mutated or
//! pruned here.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Full-attribute snapshot of an entity as a plain key/value map; datetime
/// fields serialize as ISO-8601 strings.
pub fn snapshot<T: Serialize>(entity: &T) -> serde_json::Value {
    serde_json::to_value(entity).unwrap_or(serde_json::Value::Null)
}

#[derive(Clone)]
pub struct AuditRecorder {
    db: SqlitePool,
}

impl AuditRecorder {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        actor_id: Option<&str>,
        actor_name: Option<&str>,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        before_state: Option<serde_json::Value>,
        after_state: Option<serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        tracing::info!(
            entity_type,
            entity_id,
            action,
            actor = ?actor_id,
            "audit event"
        );

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, actor_id, actor_name, entity_type, entity_id, action, before_state, after_state, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(actor_id)
        .bind(actor_name)
        .bind(entity_type)
        .bind(entity_id)
        .bind(action)
        .bind(before_state.map(|v| v.to_string()))
        .bind(after_state.map(|v| v.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Serialize)]
    struct Sample {
        name: &'static str,
        created_at: chrono::DateTime<Utc>,
    }

    #[test]
    fn snapshots_render_datetimes_as_iso8601() {
        let sample = Sample {
            name: "row",
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap(),
        };
        let value = snapshot(&sample);
        assert_eq!(value["name"], "row");
        assert_eq!(value["created_at"], "2026-03-01T12:30:00Z");
    }
}
