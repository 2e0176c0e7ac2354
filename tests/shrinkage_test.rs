mod common;

use almacen_api::{
    entities::{audit_entry::AuditAction, shrinkage_request::ShrinkageStatus, stock_movement::MovementKind},
    errors::ServiceError,
};
use assert_matches::assert_matches;
use sea_orm::EntityTrait;

#[tokio::test]
async fn employee_request_stays_pending_until_approved() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;

    let request = app
        .shrinkage
        .submit(product.id, 3, "caducado", None, &app.employee)
        .await
        .unwrap();
    assert_eq!(request.status, ShrinkageStatus::Pending.as_str());
    assert!(request.decided_by.is_none());
    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 5);
    assert!(app.movements.list_for_product(product.id).await.unwrap().is_empty());

    let solicitud_id = common::latest_audit_id(&app.db, AuditAction::SolicitudMerma).await;
    let solicitud = common::audit_entry(&app.db, solicitud_id).await;
    assert!(solicitud
        .detail
        .as_deref()
        .is_some_and(|d| d.ends_with("estado: pendiente")));

    let approved = app.shrinkage.approve(request.id, &app.owner).await.unwrap();
    assert_eq!(approved.status, ShrinkageStatus::Approved.as_str());
    assert_eq!(approved.decided_by, Some(app.owner.id));
    assert!(approved.decided_at.is_some());

    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 2);
    let history = app.movements.list_for_product(product.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind(), Some(MovementKind::Outbound));
    assert_eq!(history[0].quantity, 3);
    assert_eq!(history[0].reason, "Merma: caducado");

    // Second decision of either kind is rejected and stock stays put.
    assert_matches!(
        app.shrinkage.approve(request.id, &app.owner).await.unwrap_err(),
        ServiceError::Conflict(_)
    );
    assert_matches!(
        app.shrinkage
            .reject(request.id, "tarde", &app.owner)
            .await
            .unwrap_err(),
        ServiceError::Conflict(_)
    );
    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 2);
}

#[tokio::test]
async fn oversized_request_fails_and_persists_nothing() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Z1", "Producto Z", 4).await;

    for actor in [&app.employee, &app.admin] {
        let err = app
            .shrinkage
            .submit(product.id, 10, "rotura", None, actor)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(_));
    }

    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 4);
    assert!(
        almacen_api::entities::shrinkage_request::Entity::find()
            .all(&*app.db)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(app.audit.list_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn privileged_request_applies_immediately() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Q1", "Queso", 8).await;

    let request = app
        .shrinkage
        .submit(product.id, 2, "vencido", Some("lote 33"), &app.admin)
        .await
        .unwrap();
    assert_eq!(request.status, ShrinkageStatus::Approved.as_str());
    assert_eq!(request.decided_by, Some(app.admin.id));

    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 6);
    let history = app.movements.list_for_product(product.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, "Merma: vencido");

    let solicitud_id = common::latest_audit_id(&app.db, AuditAction::SolicitudMerma).await;
    assert!(common::audit_entry(&app.db, solicitud_id)
        .await
        .detail
        .as_deref()
        .is_some_and(|d| d.ends_with("estado: aprobada")));

    assert!(app.shrinkage.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn decisions_require_privilege() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;
    let request = app
        .shrinkage
        .submit(product.id, 1, "derrame", None, &app.employee)
        .await
        .unwrap();

    assert_matches!(
        app.shrinkage.approve(request.id, &app.employee).await.unwrap_err(),
        ServiceError::Forbidden(_)
    );
    assert_matches!(
        app.shrinkage
            .reject(request.id, "no procede", &app.employee)
            .await
            .unwrap_err(),
        ServiceError::Forbidden(_)
    );
    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 5);
}

#[tokio::test]
async fn rejection_records_the_reason_and_leaves_stock_alone() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;
    let request = app
        .shrinkage
        .submit(product.id, 2, "derrame", None, &app.employee)
        .await
        .unwrap();

    let rejected = app
        .shrinkage
        .reject(request.id, "sin evidencia", &app.admin)
        .await
        .unwrap();
    assert_eq!(rejected.status, ShrinkageStatus::Rejected.as_str());
    assert_eq!(rejected.rejection_reason.as_deref(), Some("sin evidencia"));
    assert_eq!(rejected.decided_by, Some(app.admin.id));

    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 5);
    assert!(app.movements.list_for_product(product.id).await.unwrap().is_empty());

    let reject_id = common::latest_audit_id(&app.db, AuditAction::RejectMerma).await;
    assert_eq!(
        common::audit_entry(&app.db, reject_id).await.record_id,
        Some(request.id)
    );
}

#[tokio::test]
async fn approval_revalidates_stock_at_decision_time() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;
    let request = app
        .shrinkage
        .submit(product.id, 3, "caducado", None, &app.employee)
        .await
        .unwrap();

    // Stock shrinks between request and decision.
    app.products.reduce_stock(product.id, 3, &app.admin).await.unwrap();

    assert_matches!(
        app.shrinkage.approve(request.id, &app.owner).await.unwrap_err(),
        ServiceError::InsufficientStock(_)
    );
    let still = app.shrinkage.get(request.id).await.unwrap();
    assert_eq!(still.status, ShrinkageStatus::Pending.as_str());
    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 2);
}

#[tokio::test]
async fn invalid_submissions_are_rejected_up_front() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;

    assert_matches!(
        app.shrinkage
            .submit(product.id, 0, "caducado", None, &app.admin)
            .await
            .unwrap_err(),
        ServiceError::Validation(_)
    );
    assert_matches!(
        app.shrinkage
            .submit(product.id, 2, "   ", None, &app.admin)
            .await
            .unwrap_err(),
        ServiceError::Validation(_)
    );
    assert_matches!(
        app.shrinkage
            .submit(9999, 2, "caducado", None, &app.admin)
            .await
            .unwrap_err(),
        ServiceError::NotFound(_)
    );
}
