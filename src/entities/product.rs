use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A product tracked by the registry. `code` is the immutable business key;
/// `current_stock` must never go negative.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Business key, unique and immutable once assigned.
    #[sea_orm(unique)]
    pub code: String,

    pub name: String,

    pub category: Option<String>,

    pub purchase_price: Decimal,

    pub sale_price: Decimal,

    /// Units on hand. Invariant: >= 0 after every committed operation.
    pub current_stock: i64,

    /// Threshold below which the reporting collaborator flags the product.
    pub minimum_stock: i64,

    /// Soft-delete flag; products with ledger history are deactivated
    /// rather than removed.
    pub active: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
    #[sea_orm(has_many = "super::shrinkage_request::Entity")]
    ShrinkageRequests,
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl Related<super::shrinkage_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShrinkageRequests.def()
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
            if let sea_orm::ActiveValue::NotSet = active_model.active {
                active_model.active = sea_orm::Set(true);
            }
            if let sea_orm::ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = sea_orm::Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}
