use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// States of a shrinkage request. `Pending` is the only non-terminal
/// state; exactly one of approve/reject may ever succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShrinkageStatus {
    Pending,
    Approved,
    Rejected,
}

impl ShrinkageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShrinkageStatus::Pending => "pending",
            ShrinkageStatus::Approved => "approved",
            ShrinkageStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ShrinkageStatus::Pending),
            "approved" => Some(ShrinkageStatus::Approved),
            "rejected" => Some(ShrinkageStatus::Rejected),
            _ => None,
        }
    }
}

/// A merma (write-off) request. Created pending for non-privileged actors,
/// or directly approved when a privileged actor submits.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shrinkage_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub product_id: i64,

    /// Units to write off; always > 0.
    pub quantity: i64,

    pub reason: String,

    pub notes: Option<String>,

    /// Stored as string; convert through [`ShrinkageStatus`].
    pub status: String,

    pub requested_by: i64,

    pub decided_by: Option<i64>,

    pub rejection_reason: Option<String>,

    pub requested_at: DateTime<Utc>,

    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.requested_at {
                active_model.requested_at = Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}

impl Model {
    pub fn status(&self) -> Option<ShrinkageStatus> {
        ShrinkageStatus::from_str(&self.status)
    }
}
