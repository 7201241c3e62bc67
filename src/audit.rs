//! Best-effort audit trail of account and content changes.

use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// One row of `audit_logs`.
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub user_id: Option<Uuid>,
    pub action: &'a str,
    pub resource: &'a str,
    pub metadata: Value,
}

pub async fn insert_entry(pool: &DbPool, entry: &AuditEntry<'_>) -> AppResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.resource)
    .bind(&entry.metadata)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Write an audit entry without failing the caller; failures are only logged.
pub async fn record(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: &str,
    resource: &str,
    metadata: Value,
) {
    let entry = AuditEntry {
        user_id,
        action,
        resource,
        metadata,
    };
    match insert_entry(pool, &entry).await {
        Ok(id) => tracing::debug!(audit_id = %id, action, resource, "audit entry written"),
        Err(err) => tracing::warn!(error = %err, action, resource, "audit log failed"),
    }
}
