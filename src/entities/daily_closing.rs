use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Closing record written once per ingested batch. Shares `origin_file`
/// with the stock movements the batch produced; the two are the unit the
/// reversal engine undoes together.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "daily_closings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub closing_date: NaiveDate,

    pub origin_file: String,

    pub item_count: i64,

    pub actor_id: i64,

    pub processed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.processed_at {
            active_model.processed_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
