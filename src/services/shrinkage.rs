use crate::{
    actor::Actor,
    db::DbPool,
    entities::{
        audit_entry::AuditAction,
        product::Entity as Product,
        shrinkage_request::{self, Entity as ShrinkageRequest, ShrinkageStatus},
        stock_movement::MovementKind,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{audit::AuditService, movements::MovementService, products::ProductService},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Shrinkage request workflow. A request from a privileged actor takes
/// effect immediately; anyone else queues a pending request that a
/// privileged actor later approves or rejects, exactly once.
#[derive(Clone)]
pub struct ShrinkageService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ShrinkageService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, reason, notes))]
    pub async fn submit(
        &self,
        product_id: i64,
        quantity: i64,
        reason: &str,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<shrinkage_request::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::Validation(
                "shrinkage quantity must be positive".into(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation(
                "shrinkage reason must not be empty".into(),
            ));
        }

        let reason = reason.to_string();
        let notes = notes.map(str::to_string);
        let actor = *actor;
        let request = self
            .db
            .transaction::<_, shrinkage_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let product = Product::find_by_id(product_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("product {}", product_id))
                        })?;

                    // Checked up front for both paths so an employee cannot
                    // queue a request that could never be honored as-is.
                    if quantity > product.current_stock {
                        return Err(ServiceError::InsufficientStock(format!(
                            "product {} has {} units, shrinkage of {} requested",
                            product.code, product.current_stock, quantity
                        )));
                    }

                    let immediate = actor.is_privileged();
                    let request = if immediate {
                        ProductService::adjust_stock(txn, product_id, -quantity).await?;
                        MovementService::post(
                            txn,
                            product_id,
                            MovementKind::Outbound,
                            quantity,
                            &format!("Merma: {}", reason),
                            actor.id,
                            None,
                        )
                        .await?;

                        shrinkage_request::ActiveModel {
                            product_id: Set(product_id),
                            quantity: Set(quantity),
                            reason: Set(reason.clone()),
                            notes: Set(notes.clone()),
                            status: Set(ShrinkageStatus::Approved.as_str().to_string()),
                            requested_by: Set(actor.id),
                            decided_by: Set(Some(actor.id)),
                            decided_at: Set(Some(Utc::now())),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?
                    } else {
                        shrinkage_request::ActiveModel {
                            product_id: Set(product_id),
                            quantity: Set(quantity),
                            reason: Set(reason.clone()),
                            notes: Set(notes.clone()),
                            status: Set(ShrinkageStatus::Pending.as_str().to_string()),
                            requested_by: Set(actor.id),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?
                    };

                    let estado = if immediate { "aprobada" } else { "pendiente" };
                    AuditService::record(
                        txn,
                        actor.id,
                        AuditAction::SolicitudMerma,
                        Some("shrinkage_requests"),
                        Some(request.id),
                        Some(format!(
                            "Solicitud de merma: {} unidades de {} - estado: {}",
                            quantity, product.name, estado
                        )),
                    )
                    .await?;

                    Ok(request)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        let applied_immediately = request.status == ShrinkageStatus::Approved.as_str();
        info!(
            request_id = request.id,
            product_id, quantity, applied_immediately, "shrinkage requested"
        );

        self.event_sender
            .send(Event::ShrinkageRequested {
                request_id: request.id,
                product_id,
                applied_immediately,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(request)
    }

    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        request_id: i64,
        approver: &Actor,
    ) -> Result<shrinkage_request::Model, ServiceError> {
        if !approver.is_privileged() {
            return Err(ServiceError::Forbidden(
                "only administrators or the owner may approve shrinkage".into(),
            ));
        }

        let approver = *approver;
        let (request, product_id, quantity) = self
            .db
            .transaction::<_, (shrinkage_request::Model, i64, i64), ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = ShrinkageRequest::find_by_id(request_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("shrinkage request {}", request_id))
                        })?;

                    if request.status != ShrinkageStatus::Pending.as_str() {
                        return Err(ServiceError::Conflict(format!(
                            "shrinkage request {} is already {}",
                            request_id, request.status
                        )));
                    }

                    let product = Product::find_by_id(request.product_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("product {}", request.product_id))
                        })?;

                    if request.quantity > product.current_stock {
                        return Err(ServiceError::InsufficientStock(format!(
                            "product {} has {} units, shrinkage of {} pending",
                            product.code, product.current_stock, request.quantity
                        )));
                    }

                    // Transition guard runs as a conditional update so two
                    // concurrent approvals cannot both go through.
                    let res = ShrinkageRequest::update_many()
                        .col_expr(
                            shrinkage_request::Column::Status,
                            Expr::value(ShrinkageStatus::Approved.as_str()),
                        )
                        .col_expr(shrinkage_request::Column::DecidedBy, Expr::value(approver.id))
                        .col_expr(shrinkage_request::Column::DecidedAt, Expr::value(Utc::now()))
                        .filter(shrinkage_request::Column::Id.eq(request_id))
                        .filter(
                            shrinkage_request::Column::Status
                                .eq(ShrinkageStatus::Pending.as_str()),
                        )
                        .exec(txn)
                        .await?;
                    if res.rows_affected == 0 {
                        return Err(ServiceError::Conflict(format!(
                            "shrinkage request {} was decided concurrently",
                            request_id
                        )));
                    }

                    ProductService::adjust_stock(txn, request.product_id, -request.quantity)
                        .await?;
                    MovementService::post(
                        txn,
                        request.product_id,
                        MovementKind::Outbound,
                        request.quantity,
                        &format!("Merma: {}", request.reason),
                        approver.id,
                        None,
                    )
                    .await?;

                    AuditService::record(
                        txn,
                        approver.id,
                        AuditAction::ApproveMerma,
                        Some("shrinkage_requests"),
                        Some(request_id),
                        Some(format!(
                            "Merma aprobada: {} unidades de {}",
                            request.quantity, product.name
                        )),
                    )
                    .await?;

                    let updated = ShrinkageRequest::find_by_id(request_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("shrinkage request {}", request_id))
                        })?;
                    let (product_id, quantity) = (request.product_id, request.quantity);
                    Ok((updated, product_id, quantity))
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(request_id, product_id, quantity, "shrinkage approved");

        self.event_sender
            .send(Event::ShrinkageApproved {
                request_id,
                product_id,
                quantity,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(request)
    }

    #[instrument(skip(self, rejection_reason))]
    pub async fn reject(
        &self,
        request_id: i64,
        rejection_reason: &str,
        approver: &Actor,
    ) -> Result<shrinkage_request::Model, ServiceError> {
        if !approver.is_privileged() {
            return Err(ServiceError::Forbidden(
                "only administrators or the owner may reject shrinkage".into(),
            ));
        }
        if rejection_reason.trim().is_empty() {
            return Err(ServiceError::Validation(
                "rejection reason must not be empty".into(),
            ));
        }

        let approver = *approver;
        let rejection = rejection_reason.to_string();
        let request = self
            .db
            .transaction::<_, shrinkage_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = ShrinkageRequest::find_by_id(request_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("shrinkage request {}", request_id))
                        })?;

                    if request.status != ShrinkageStatus::Pending.as_str() {
                        return Err(ServiceError::Conflict(format!(
                            "shrinkage request {} is already {}",
                            request_id, request.status
                        )));
                    }

                    let res = ShrinkageRequest::update_many()
                        .col_expr(
                            shrinkage_request::Column::Status,
                            Expr::value(ShrinkageStatus::Rejected.as_str()),
                        )
                        .col_expr(shrinkage_request::Column::DecidedBy, Expr::value(approver.id))
                        .col_expr(shrinkage_request::Column::DecidedAt, Expr::value(Utc::now()))
                        .col_expr(
                            shrinkage_request::Column::RejectionReason,
                            Expr::value(rejection.clone()),
                        )
                        .filter(shrinkage_request::Column::Id.eq(request_id))
                        .filter(
                            shrinkage_request::Column::Status
                                .eq(ShrinkageStatus::Pending.as_str()),
                        )
                        .exec(txn)
                        .await?;
                    if res.rows_affected == 0 {
                        return Err(ServiceError::Conflict(format!(
                            "shrinkage request {} was decided concurrently",
                            request_id
                        )));
                    }

                    AuditService::record(
                        txn,
                        approver.id,
                        AuditAction::RejectMerma,
                        Some("shrinkage_requests"),
                        Some(request_id),
                        Some(format!("Merma rechazada: {}", rejection)),
                    )
                    .await?;

                    ShrinkageRequest::find_by_id(request_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("shrinkage request {}", request_id))
                        })
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(request_id, "shrinkage rejected");

        self.event_sender
            .send(Event::ShrinkageRejected { request_id })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(request)
    }

    pub async fn get(
        &self,
        request_id: i64,
    ) -> Result<shrinkage_request::Model, ServiceError> {
        ShrinkageRequest::find_by_id(request_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("shrinkage request {}", request_id)))
    }

    /// Pending requests, newest first.
    pub async fn list_pending(&self) -> Result<Vec<shrinkage_request::Model>, ServiceError> {
        Ok(ShrinkageRequest::find()
            .filter(
                shrinkage_request::Column::Status.eq(ShrinkageStatus::Pending.as_str()),
            )
            .order_by_desc(shrinkage_request::Column::RequestedAt)
            .order_by_desc(shrinkage_request::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
