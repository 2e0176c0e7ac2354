use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Closed set of business actions the audit log records. Reversal behavior
/// dispatches on this enum; audit rows whose stored action no longer parses
/// fail reversal closed instead of silently no-opping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    BatchClose,
    CreateProduct,
    CreateUser,
    UpdateProduct,
    DeleteProduct,
    AdjustStock,
    ApproveMerma,
    RejectMerma,
    SolicitudMerma,
    Revert,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BatchClose => "BATCH_CLOSE",
            AuditAction::CreateProduct => "CREATE_PRODUCT",
            AuditAction::CreateUser => "CREATE_USER",
            AuditAction::UpdateProduct => "UPDATE_PRODUCT",
            AuditAction::DeleteProduct => "DELETE_PRODUCT",
            AuditAction::AdjustStock => "ADJUST_STOCK",
            AuditAction::ApproveMerma => "APPROVE_MERMA",
            AuditAction::RejectMerma => "REJECT_MERMA",
            AuditAction::SolicitudMerma => "SOLICITUD_MERMA",
            AuditAction::Revert => "REVERT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BATCH_CLOSE" => Some(AuditAction::BatchClose),
            "CREATE_PRODUCT" => Some(AuditAction::CreateProduct),
            "CREATE_USER" => Some(AuditAction::CreateUser),
            "UPDATE_PRODUCT" => Some(AuditAction::UpdateProduct),
            "DELETE_PRODUCT" => Some(AuditAction::DeleteProduct),
            "ADJUST_STOCK" => Some(AuditAction::AdjustStock),
            "APPROVE_MERMA" => Some(AuditAction::ApproveMerma),
            "REJECT_MERMA" => Some(AuditAction::RejectMerma),
            "SOLICITUD_MERMA" => Some(AuditAction::SolicitudMerma),
            "REVERT" => Some(AuditAction::Revert),
            _ => None,
        }
    }

    /// Whether the reversal engine has a compensating effect for this kind.
    /// `UpdateProduct` counts as reversible but compensates with a
    /// documented no-op.
    pub fn reversible(&self) -> bool {
        matches!(
            self,
            AuditAction::BatchClose
                | AuditAction::CreateProduct
                | AuditAction::CreateUser
                | AuditAction::UpdateProduct
                | AuditAction::AdjustStock
        )
    }
}

/// One row per mutating business action. Append-only except for the
/// `reverted` flag, which moves false -> true exactly once.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Weak reference to the acting user; 0 is the engine's system actor.
    pub actor_id: i64,

    /// Stored as string; convert through [`AuditAction`].
    pub action: String,

    pub affected_table: Option<String>,

    pub record_id: Option<i64>,

    /// Free-form detail. Must carry whatever the compensation needs to
    /// locate its data, e.g. the origin tag for a BATCH_CLOSE entry.
    pub detail: Option<String>,

    pub recorded_at: DateTime<Utc>,

    pub reverted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.recorded_at {
                active_model.recorded_at = Set(Utc::now());
            }
            if let ActiveValue::NotSet = active_model.reverted {
                active_model.reverted = Set(false);
            }
        }
        Ok(active_model)
    }
}

impl Model {
    pub fn action(&self) -> Option<AuditAction> {
        AuditAction::from_str(&self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_strings_round_trip() {
        let all = [
            AuditAction::BatchClose,
            AuditAction::CreateProduct,
            AuditAction::CreateUser,
            AuditAction::UpdateProduct,
            AuditAction::DeleteProduct,
            AuditAction::AdjustStock,
            AuditAction::ApproveMerma,
            AuditAction::RejectMerma,
            AuditAction::SolicitudMerma,
            AuditAction::Revert,
        ];
        for action in all {
            assert_eq!(AuditAction::from_str(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::from_str("CIERRE_DIARIO"), None);
    }

    #[test]
    fn merma_transitions_and_deletions_are_not_reversible() {
        assert!(!AuditAction::DeleteProduct.reversible());
        assert!(!AuditAction::ApproveMerma.reversible());
        assert!(!AuditAction::RejectMerma.reversible());
        assert!(!AuditAction::SolicitudMerma.reversible());
        assert!(!AuditAction::Revert.reversible());
        assert!(AuditAction::BatchClose.reversible());
    }
}
