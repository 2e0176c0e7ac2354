use crate::{
    db::DbPool,
    entities::stock_movement::{self, Entity as StockMovement, MovementKind},
    errors::ServiceError,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

/// Append-only access to the stock movement ledger. Movements are never
/// updated in place; reversal deletes them wholesale by origin tag.
#[derive(Clone)]
pub struct MovementService {
    db: Arc<DbPool>,
}

impl MovementService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Appends one ledger entry on the caller's connection. The caller is
    /// responsible for having already applied the stock change it records.
    pub async fn post<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
        kind: MovementKind,
        quantity: i64,
        reason: &str,
        actor_id: i64,
        origin_file: Option<&str>,
    ) -> Result<i64, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::Validation(format!(
                "movement quantity must be positive, got {}",
                quantity
            )));
        }
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation(
                "movement reason must not be empty".into(),
            ));
        }

        let created = stock_movement::ActiveModel {
            product_id: Set(product_id),
            kind: Set(kind.as_str().to_string()),
            quantity: Set(quantity),
            reason: Set(reason.to_string()),
            actor_id: Set(actor_id),
            origin_file: Set(origin_file.map(str::to_string)),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok(created.id)
    }

    /// Every movement posted under one batch origin tag, in insertion order.
    pub async fn list_by_origin(
        &self,
        origin_file: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(StockMovement::find()
            .filter(stock_movement::Column::OriginFile.eq(origin_file))
            .order_by_asc(stock_movement::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Movement history for a product, newest first.
    pub async fn list_for_product(
        &self,
        product_id: i64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(StockMovement::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_desc(stock_movement::Column::OccurredAt)
            .order_by_desc(stock_movement::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Deletes the whole ledger slice for a batch origin tag inside the
    /// caller's transaction. Returns how many rows went away.
    pub async fn delete_by_origin<C: ConnectionTrait>(
        conn: &C,
        origin_file: &str,
    ) -> Result<u64, ServiceError> {
        Ok(StockMovement::delete_many()
            .filter(stock_movement::Column::OriginFile.eq(origin_file))
            .exec(conn)
            .await?
            .rows_affected)
    }

    /// Most recent outbound movement matching a reason tag for a product.
    /// Reversal of manual adjustments latches onto this.
    pub async fn latest_outbound_with_reason<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
        reason: &str,
    ) -> Result<Option<stock_movement::Model>, ServiceError> {
        Ok(StockMovement::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .filter(stock_movement::Column::Kind.eq(MovementKind::Outbound.as_str()))
            .filter(stock_movement::Column::Reason.eq(reason))
            .order_by_desc(stock_movement::Column::Id)
            .one(conn)
            .await?)
    }
}
