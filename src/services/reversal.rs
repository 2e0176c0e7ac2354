use crate::{
    actor::Actor,
    db::DbPool,
    entities::{
        audit_entry::{self, AuditAction, Entity as AuditEntry},
        daily_closing::Entity as DailyClosing,
        stock_movement::{self, Entity as StockMovement},
        user::{self, Entity as User},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        audit::AuditService,
        movements::MovementService,
        products::{ProductService, MANUAL_ADJUSTMENT_REASON},
    },
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, ModelTrait, QueryFilter,
    TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What a completed reversal touched.
#[derive(Debug, Clone, Copy)]
pub struct ReversalOutcome {
    pub audit_id: i64,
    pub action: AuditAction,
    pub movements_deleted: u64,
    pub products_touched: u64,
}

/// Compensating engine over the audit trail. Each reversible action gets a
/// dedicated undo; everything else fails with `Conflict`. An entry reverts
/// at most once, enforced by flipping the `reverted` flag with a
/// conditional update before any compensation runs.
#[derive(Clone)]
pub struct ReversalService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ReversalService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn reverse(
        &self,
        audit_id: i64,
        actor: &Actor,
    ) -> Result<ReversalOutcome, ServiceError> {
        let actor = *actor;
        let outcome = self
            .db
            .transaction::<_, ReversalOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let entry = AuditEntry::find_by_id(audit_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("audit entry {}", audit_id))
                        })?;

                    if entry.reverted {
                        return Err(ServiceError::AlreadyReverted(audit_id));
                    }

                    // Unknown action strings fail closed.
                    let action = entry.action().ok_or_else(|| {
                        ServiceError::Conflict(format!(
                            "audit entry {} carries unknown action '{}'",
                            audit_id, entry.action
                        ))
                    })?;
                    if !action.reversible() {
                        return Err(ServiceError::Conflict(format!(
                            "action {} cannot be reversed",
                            action.as_str()
                        )));
                    }

                    // Claim the entry before compensating. A concurrent
                    // reversal loses this race and sees AlreadyReverted.
                    let claimed = AuditEntry::update_many()
                        .col_expr(audit_entry::Column::Reverted, Expr::value(true))
                        .filter(audit_entry::Column::Id.eq(audit_id))
                        .filter(audit_entry::Column::Reverted.eq(false))
                        .exec(txn)
                        .await?;
                    if claimed.rows_affected == 0 {
                        return Err(ServiceError::AlreadyReverted(audit_id));
                    }

                    let (movements_deleted, products_touched) = match action {
                        AuditAction::BatchClose => Self::undo_batch_close(txn, &entry).await?,
                        AuditAction::CreateProduct => {
                            Self::undo_create_product(txn, &entry).await?
                        }
                        AuditAction::CreateUser => Self::undo_create_user(txn, &entry).await?,
                        AuditAction::UpdateProduct => {
                            // Batch upserts do not snapshot prior attribute
                            // values, so there is nothing to restore. The
                            // entry is still flagged so it cannot be
                            // replayed.
                            warn!(
                                audit_id,
                                "UPDATE_PRODUCT reversal marks the entry only"
                            );
                            (0, 0)
                        }
                        AuditAction::AdjustStock => {
                            Self::undo_adjust_stock(txn, &entry).await?
                        }
                        _ => {
                            return Err(ServiceError::Conflict(format!(
                                "action {} cannot be reversed",
                                action.as_str()
                            )))
                        }
                    };

                    let reference = entry
                        .record_id
                        .map(|id| format!(" on record {}", id))
                        .unwrap_or_default();
                    AuditService::record(
                        txn,
                        actor.id,
                        AuditAction::Revert,
                        Some("audit_log"),
                        Some(audit_id),
                        Some(format!("Reverted {}{}", action.as_str(), reference)),
                    )
                    .await?;

                    Ok(ReversalOutcome {
                        audit_id,
                        action,
                        movements_deleted,
                        products_touched,
                    })
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(
            audit_id,
            action = outcome.action.as_str(),
            movements_deleted = outcome.movements_deleted,
            products_touched = outcome.products_touched,
            "audit entry reverted"
        );

        self.event_sender
            .send(Event::ActionReverted {
                audit_id,
                action: outcome.action.as_str().to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(outcome)
    }

    /// Undoes a daily closing: subtracts each posted quantity (clamped at
    /// zero, since later movements may already have consumed stock), drops
    /// the ledger slice for the origin tag and the closing record itself.
    async fn undo_batch_close(
        txn: &DatabaseTransaction,
        entry: &audit_entry::Model,
    ) -> Result<(u64, u64), ServiceError> {
        let origin = entry
            .detail
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "audit entry {} has no origin tag to resolve the batch",
                    entry.id
                ))
            })?;

        let movements = StockMovement::find()
            .filter(stock_movement::Column::OriginFile.eq(origin))
            .all(txn)
            .await?;

        let mut touched = BTreeSet::new();
        for movement in &movements {
            ProductService::subtract_clamped(txn, movement.product_id, movement.quantity)
                .await?;
            touched.insert(movement.product_id);
        }

        let deleted = MovementService::delete_by_origin(txn, origin).await?;

        if let Some(closing_id) = entry.record_id {
            DailyClosing::delete_by_id(closing_id).exec(txn).await?;
        }

        Ok((deleted, touched.len() as u64))
    }

    /// Undoes a product creation by purging the product and its movements.
    async fn undo_create_product(
        txn: &DatabaseTransaction,
        entry: &audit_entry::Model,
    ) -> Result<(u64, u64), ServiceError> {
        let product_id = entry.record_id.ok_or_else(|| {
            ServiceError::Conflict(format!(
                "audit entry {} has no product reference",
                entry.id
            ))
        })?;

        let deleted = ProductService::delete_cascade(txn, product_id).await?;
        Ok((deleted, 1))
    }

    /// Undoes a user creation by deactivating the account. The row stays
    /// because audit entries may reference it.
    async fn undo_create_user(
        txn: &DatabaseTransaction,
        entry: &audit_entry::Model,
    ) -> Result<(u64, u64), ServiceError> {
        let user_id = entry.record_id.ok_or_else(|| {
            ServiceError::Conflict(format!("audit entry {} has no user reference", entry.id))
        })?;

        let res = User::update_many()
            .col_expr(user::Column::Active, Expr::value(false))
            .filter(user::Column::Id.eq(user_id))
            .exec(txn)
            .await?;
        if res.rows_affected == 0 {
            warn!(user_id, "user referenced by reversal no longer exists");
        }

        Ok((0, 0))
    }

    /// Undoes a manual stock reduction: restores the quantity of the most
    /// recent manual-adjustment movement and deletes that movement.
    async fn undo_adjust_stock(
        txn: &DatabaseTransaction,
        entry: &audit_entry::Model,
    ) -> Result<(u64, u64), ServiceError> {
        let product_id = entry.record_id.ok_or_else(|| {
            ServiceError::Conflict(format!(
                "audit entry {} has no product reference",
                entry.id
            ))
        })?;

        let movement = MovementService::latest_outbound_with_reason(
            txn,
            product_id,
            MANUAL_ADJUSTMENT_REASON,
        )
        .await?;

        match movement {
            Some(movement) => {
                ProductService::adjust_stock(txn, product_id, movement.quantity).await?;
                movement.delete(txn).await?;
                Ok((1, 1))
            }
            None => {
                // The movement may have been removed by an earlier
                // compensation. The entry still gets flagged.
                warn!(
                    audit_id = entry.id,
                    product_id, "no manual adjustment movement left to restore"
                );
                Ok((0, 0))
            }
        }
    }
}
