use crate::{
    actor::Actor,
    db::DbPool,
    entities::{
        audit_entry::AuditAction,
        daily_closing::{self, Entity as DailyClosing},
        stock_movement::MovementKind,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        audit::AuditService,
        movements::MovementService,
        products::{ProductAttrs, ProductService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Reason stamped on every inbound movement produced by a daily closing.
pub const CLOSING_REASON: &str = "Daily closing import";

/// One line of a daily closing batch.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LineItem {
    #[validate(length(min = 1, max = 50, message = "code must be 1-50 characters"))]
    pub code: String,

    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,

    pub category: Option<String>,

    pub quantity: i64,

    pub purchase_price: Decimal,

    pub sale_price: Decimal,
}

/// What the caller gets back from a successful closing.
#[derive(Debug, Clone, Copy)]
pub struct ClosingReceipt {
    pub closing_id: i64,
    pub items_processed: u64,
}

/// Ingests daily closing batches: per line an upsert into the registry, an
/// inbound ledger entry and an audit row, then one closing record and a
/// BATCH_CLOSE audit entry carrying the origin tag. All of it in a single
/// transaction, so a bad line aborts the whole batch.
#[derive(Clone)]
pub struct BatchIngestionService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl BatchIngestionService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, items), fields(origin_file = %origin_file, lines = items.len()))]
    pub async fn process_closing(
        &self,
        items: Vec<LineItem>,
        origin_file: &str,
        actor: &Actor,
    ) -> Result<ClosingReceipt, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::Validation(
                "closing batch must contain at least one line".into(),
            ));
        }
        if origin_file.trim().is_empty() {
            return Err(ServiceError::Validation(
                "origin file tag must not be empty".into(),
            ));
        }

        let origin = origin_file.to_string();
        let actor = *actor;
        let receipt = self
            .db
            .transaction::<_, ClosingReceipt, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut processed: u64 = 0;

                    for item in &items {
                        item.validate()?;
                        if item.quantity <= 0 {
                            return Err(ServiceError::Validation(format!(
                                "line for product {} has non-positive quantity {}",
                                item.code, item.quantity
                            )));
                        }

                        let attrs = ProductAttrs {
                            code: item.code.clone(),
                            name: item.name.clone(),
                            category: item.category.clone(),
                            purchase_price: item.purchase_price,
                            sale_price: item.sale_price,
                        };

                        let (product, created) =
                            ProductService::upsert_by_code(txn, &attrs, item.quantity).await?;

                        MovementService::post(
                            txn,
                            product.id,
                            MovementKind::Inbound,
                            item.quantity,
                            CLOSING_REASON,
                            actor.id,
                            Some(&origin),
                        )
                        .await?;

                        let (action, detail) = if created {
                            (
                                AuditAction::CreateProduct,
                                format!("Product {} created", product.code),
                            )
                        } else {
                            (
                                AuditAction::UpdateProduct,
                                format!(
                                    "Product {} stock updated to {}",
                                    product.code, product.current_stock
                                ),
                            )
                        };
                        AuditService::record(
                            txn,
                            actor.id,
                            action,
                            Some("products"),
                            Some(product.id),
                            Some(detail),
                        )
                        .await?;

                        processed += 1;
                    }

                    let closing = daily_closing::ActiveModel {
                        closing_date: Set(Utc::now().date_naive()),
                        origin_file: Set(origin.clone()),
                        item_count: Set(processed as i64),
                        actor_id: Set(actor.id),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    // The origin tag rides in the detail column; reversal
                    // resolves the ledger slice from it.
                    AuditService::record(
                        txn,
                        actor.id,
                        AuditAction::BatchClose,
                        Some("daily_closings"),
                        Some(closing.id),
                        Some(origin.clone()),
                    )
                    .await?;

                    Ok(ClosingReceipt {
                        closing_id: closing.id,
                        items_processed: processed,
                    })
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(
            closing_id = receipt.closing_id,
            items = receipt.items_processed,
            "daily closing processed"
        );

        self.event_sender
            .send(Event::BatchClosed {
                closing_id: receipt.closing_id,
                origin_file: origin_file.to_string(),
                items_processed: receipt.items_processed,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(receipt)
    }

    pub async fn get_closing(
        &self,
        closing_id: i64,
    ) -> Result<daily_closing::Model, ServiceError> {
        DailyClosing::find_by_id(closing_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("daily closing {}", closing_id)))
    }

    /// Closings newest first.
    pub async fn list_closings(&self) -> Result<Vec<daily_closing::Model>, ServiceError> {
        Ok(DailyClosing::find()
            .order_by_desc(daily_closing::Column::ProcessedAt)
            .order_by_desc(daily_closing::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
