use crate::{
    actor::{Actor, Role},
    db::DbPool,
    entities::{
        audit_entry::AuditAction,
        product::{self, Entity as Product},
        stock_movement::{self, Entity as StockMovement, MovementKind},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{audit::AuditService, movements::MovementService},
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Reason tag shared by manual stock reductions and their reversal lookup.
pub const MANUAL_ADJUSTMENT_REASON: &str = "manual adjustment";

/// Mutable product attributes. The business code is immutable once a
/// product exists; upserts only overwrite the rest.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductAttrs {
    #[validate(length(min = 1, max = 50, message = "code must be 1-50 characters"))]
    pub code: String,

    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,

    pub category: Option<String>,

    pub purchase_price: Decimal,

    pub sale_price: Decimal,
}

impl ProductAttrs {
    fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if self.purchase_price < Decimal::ZERO || self.sale_price < Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "prices for product {} must be non-negative",
                self.code
            )));
        }
        Ok(())
    }
}

/// Service owning the stock-bearing product registry.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Applies `delta_stock` to the product with this code, creating it if
    /// absent. Mutable attributes are overwritten on existing products.
    /// Runs on the caller's connection so it composes into the caller's
    /// transaction. Returns the resulting model and whether it was created.
    pub async fn upsert_by_code<C: ConnectionTrait>(
        conn: &C,
        attrs: &ProductAttrs,
        delta_stock: i64,
    ) -> Result<(product::Model, bool), ServiceError> {
        attrs.check()?;

        let existing = Product::find()
            .filter(product::Column::Code.eq(attrs.code.as_str()))
            .one(conn)
            .await?;

        match existing {
            Some(found) => {
                // Stock moves in the same conditional statement as the
                // attribute overwrite, so a concurrent decrement cannot be
                // overwritten with a stale value.
                let res = Product::update_many()
                    .col_expr(product::Column::Name, Expr::value(attrs.name.clone()))
                    .col_expr(product::Column::Category, Expr::value(attrs.category.clone()))
                    .col_expr(
                        product::Column::PurchasePrice,
                        Expr::value(attrs.purchase_price),
                    )
                    .col_expr(product::Column::SalePrice, Expr::value(attrs.sale_price))
                    .col_expr(
                        product::Column::CurrentStock,
                        Expr::col(product::Column::CurrentStock).add(delta_stock),
                    )
                    .filter(product::Column::Id.eq(found.id))
                    .filter(
                        Expr::expr(Expr::col(product::Column::CurrentStock).add(delta_stock))
                            .gte(0),
                    )
                    .exec(conn)
                    .await?;
                if res.rows_affected == 0 {
                    return Err(ServiceError::Validation(format!(
                        "stock of product {} would become negative ({} with delta {})",
                        found.code, found.current_stock, delta_stock
                    )));
                }

                let updated = Product::find_by_id(found.id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("product {}", found.id)))?;
                Ok((updated, false))
            }
            None => {
                if delta_stock < 0 {
                    return Err(ServiceError::Validation(format!(
                        "cannot create product {} with negative stock {}",
                        attrs.code, delta_stock
                    )));
                }

                let created = product::ActiveModel {
                    code: Set(attrs.code.clone()),
                    name: Set(attrs.name.clone()),
                    category: Set(attrs.category.clone()),
                    purchase_price: Set(attrs.purchase_price),
                    sale_price: Set(attrs.sale_price),
                    current_stock: Set(delta_stock),
                    minimum_stock: Set(0),
                    ..Default::default()
                }
                .insert(conn)
                .await?;

                Ok((created, true))
            }
        }
    }

    /// Stock change as one conditional update: the non-negativity guard is
    /// evaluated by the database against the row's current value, so two
    /// concurrent decrements can never overdraw through stale reads.
    /// Returns the new stock level.
    pub async fn adjust_stock<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
        delta: i64,
    ) -> Result<i64, ServiceError> {
        let res = Product::update_many()
            .col_expr(
                product::Column::CurrentStock,
                Expr::col(product::Column::CurrentStock).add(delta),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(Expr::expr(Expr::col(product::Column::CurrentStock).add(delta)).gte(0))
            .exec(conn)
            .await?;

        if res.rows_affected == 0 {
            let found = Product::find_by_id(product_id)
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))?;
            return Err(ServiceError::InsufficientStock(format!(
                "product {} has {} units, requested change {}",
                found.code, found.current_stock, delta
            )));
        }

        let updated = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))?;
        Ok(updated.current_stock)
    }

    /// Subtracts `quantity` clamping the result at zero. Used by batch
    /// reversal, where intervening movements may already have consumed part
    /// of the originally posted quantity. Same conditional-update shape as
    /// `adjust_stock`; the fallback branch floors the row at zero.
    pub async fn subtract_clamped<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
        quantity: i64,
    ) -> Result<i64, ServiceError> {
        let res = Product::update_many()
            .col_expr(
                product::Column::CurrentStock,
                Expr::col(product::Column::CurrentStock).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(Expr::expr(Expr::col(product::Column::CurrentStock).sub(quantity)).gte(0))
            .exec(conn)
            .await?;

        if res.rows_affected == 0 {
            let res = Product::update_many()
                .col_expr(product::Column::CurrentStock, Expr::value(0i64))
                .filter(product::Column::Id.eq(product_id))
                .exec(conn)
                .await?;
            if res.rows_affected == 0 {
                return Err(ServiceError::NotFound(format!("product {}", product_id)));
            }
            return Ok(0);
        }

        let updated = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))?;
        Ok(updated.current_stock)
    }

    /// Soft delete: the product stays for history but drops out of active
    /// listings.
    pub async fn deactivate<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
    ) -> Result<(), ServiceError> {
        let res = Product::update_many()
            .col_expr(product::Column::Active, Expr::value(false))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("product {}", product_id)));
        }
        Ok(())
    }

    /// Deletes the product together with every movement referencing it, in
    /// the caller's transaction. Returns the number of movements deleted.
    pub async fn delete_cascade<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
    ) -> Result<u64, ServiceError> {
        let movements_deleted = StockMovement::delete_many()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .exec(conn)
            .await?
            .rows_affected;

        Product::delete_by_id(product_id).exec(conn).await?;

        Ok(movements_deleted)
    }

    /// Creates a product directly (outside batch ingestion). Fails with
    /// `Conflict` if the code is already taken.
    #[instrument(skip(self, attrs), fields(code = %attrs.code))]
    pub async fn create(
        &self,
        attrs: ProductAttrs,
        initial_stock: i64,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        attrs.check()?;
        if initial_stock < 0 {
            return Err(ServiceError::Validation(
                "initial stock must be non-negative".into(),
            ));
        }

        let actor = *actor;
        let created = self
            .db
            .transaction::<_, product::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let taken = Product::find()
                        .filter(product::Column::Code.eq(attrs.code.as_str()))
                        .one(txn)
                        .await?;
                    if taken.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "product code {} already exists",
                            attrs.code
                        )));
                    }

                    let created = product::ActiveModel {
                        code: Set(attrs.code.clone()),
                        name: Set(attrs.name.clone()),
                        category: Set(attrs.category.clone()),
                        purchase_price: Set(attrs.purchase_price),
                        sale_price: Set(attrs.sale_price),
                        current_stock: Set(initial_stock),
                        minimum_stock: Set(0),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    AuditService::record(
                        txn,
                        actor.id,
                        AuditAction::CreateProduct,
                        Some("products"),
                        Some(created.id),
                        Some(format!("Product {} created", created.code)),
                    )
                    .await?;

                    Ok(created)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(product_id = created.id, code = %created.code, "product created");

        self.event_sender
            .send(Event::ProductCreated {
                product_id: created.id,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(created)
    }

    /// Manual stock reduction by a privileged actor: decrements stock,
    /// posts the outbound ledger entry with the manual-adjustment reason,
    /// and audits ADJUST_STOCK, all in one transaction. Returns new stock.
    #[instrument(skip(self))]
    pub async fn reduce_stock(
        &self,
        product_id: i64,
        quantity: i64,
        actor: &Actor,
    ) -> Result<i64, ServiceError> {
        if !actor.is_privileged() {
            return Err(ServiceError::Forbidden(
                "only administrators or the owner may reduce stock manually".into(),
            ));
        }
        if quantity <= 0 {
            return Err(ServiceError::Validation(
                "reduction quantity must be positive".into(),
            ));
        }

        let actor = *actor;
        let new_stock = self
            .db
            .transaction::<_, i64, ServiceError>(move |txn| {
                Box::pin(async move {
                    let new_stock = Self::adjust_stock(txn, product_id, -quantity).await?;

                    MovementService::post(
                        txn,
                        product_id,
                        MovementKind::Outbound,
                        quantity,
                        MANUAL_ADJUSTMENT_REASON,
                        actor.id,
                        None,
                    )
                    .await?;

                    AuditService::record(
                        txn,
                        actor.id,
                        AuditAction::AdjustStock,
                        Some("products"),
                        Some(product_id),
                        Some(format!(
                            "Stock reduced by {} units, new stock {}",
                            quantity, new_stock
                        )),
                    )
                    .await?;

                    Ok(new_stock)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(product_id, quantity, new_stock, "stock reduced manually");

        self.event_sender
            .send(Event::StockAdjusted {
                product_id,
                delta: -quantity,
                new_stock,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(new_stock)
    }

    /// Unified removal: hard delete when the product has no ledger history,
    /// soft delete otherwise. Owner only. Returns whether the row was
    /// physically deleted.
    #[instrument(skip(self))]
    pub async fn remove(&self, product_id: i64, actor: &Actor) -> Result<bool, ServiceError> {
        if actor.role != Role::Owner {
            return Err(ServiceError::Forbidden(
                "only the owner may remove products".into(),
            ));
        }

        let actor = *actor;
        let hard_deleted = self
            .db
            .transaction::<_, bool, ServiceError>(move |txn| {
                Box::pin(async move {
                    let found = Product::find_by_id(product_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("product {}", product_id))
                        })?;

                    let history = StockMovement::find()
                        .filter(stock_movement::Column::ProductId.eq(product_id))
                        .count(txn)
                        .await?;

                    let hard = history == 0;
                    let detail = if hard {
                        Product::delete_by_id(product_id).exec(txn).await?;
                        format!("Product {} deleted permanently", found.code)
                    } else {
                        Self::deactivate(txn, product_id).await?;
                        format!(
                            "Product {} deactivated ({} ledger entries preserved)",
                            found.code, history
                        )
                    };

                    AuditService::record(
                        txn,
                        actor.id,
                        AuditAction::DeleteProduct,
                        Some("products"),
                        Some(product_id),
                        Some(detail),
                    )
                    .await?;

                    Ok(hard)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(product_id, hard_deleted, "product removed");

        self.event_sender
            .send(Event::ProductRemoved {
                product_id,
                hard_deleted,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(hard_deleted)
    }

    pub async fn get(&self, product_id: i64) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", product_id)))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Code.eq(code))
            .one(&*self.db)
            .await?)
    }

    /// Active products ordered by name, the shape the reporting
    /// collaborator consumes.
    pub async fn list_active(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Active.eq(true))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?)
    }
}
