use crate::{
    db::DbPool,
    entities::audit_entry::{self, AuditAction, Entity as AuditEntry},
    errors::ServiceError,
};
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QueryOrder, QuerySelect, Set};
use std::sync::Arc;

/// Append side of the audit trail. Entries are written on the same
/// connection as the mutation they describe, so an aborted mutation never
/// leaves a stray audit row.
#[derive(Clone)]
pub struct AuditService {
    db: Arc<DbPool>,
}

impl AuditService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Appends one audit entry and returns its id.
    pub async fn record<C: ConnectionTrait>(
        conn: &C,
        actor_id: i64,
        action: AuditAction,
        affected_table: Option<&str>,
        record_id: Option<i64>,
        detail: Option<String>,
    ) -> Result<i64, ServiceError> {
        let created = audit_entry::ActiveModel {
            actor_id: Set(actor_id),
            action: Set(action.as_str().to_string()),
            affected_table: Set(affected_table.map(str::to_string)),
            record_id: Set(record_id),
            detail: Set(detail),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok(created.id)
    }

    pub async fn get(&self, audit_id: i64) -> Result<audit_entry::Model, ServiceError> {
        AuditEntry::find_by_id(audit_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("audit entry {}", audit_id)))
    }

    /// Newest entries first, capped at `limit`.
    pub async fn list_recent(
        &self,
        limit: u64,
    ) -> Result<Vec<audit_entry::Model>, ServiceError> {
        Ok(AuditEntry::find()
            .order_by_desc(audit_entry::Column::RecordedAt)
            .order_by_desc(audit_entry::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
