mod common;

use almacen_api::{
    entities::{audit_entry::AuditAction, stock_movement::MovementKind},
    errors::ServiceError,
    events::Event,
    services::{ProductAttrs, MANUAL_ADJUSTMENT_REASON},
};
use assert_matches::assert_matches;
use rust_decimal_macros::dec;

fn attrs(code: &str, name: &str) -> ProductAttrs {
    ProductAttrs {
        code: code.to_string(),
        name: name.to_string(),
        category: Some("almacen".to_string()),
        purchase_price: dec!(1.10),
        sale_price: dec!(1.95),
    }
}

#[tokio::test]
async fn create_audits_and_rejects_duplicate_codes() {
    let mut app = common::setup().await;

    let created = app
        .products
        .create(attrs("P1", "Pasta"), 12, &app.admin)
        .await
        .unwrap();
    assert_eq!(created.current_stock, 12);
    assert!(created.active);

    let create_id = common::latest_audit_id(&app.db, AuditAction::CreateProduct).await;
    assert_eq!(
        common::audit_entry(&app.db, create_id).await.record_id,
        Some(created.id)
    );
    assert_matches!(
        app.events.recv().await,
        Some(Event::ProductCreated { product_id }) if product_id == created.id
    );

    assert_matches!(
        app.products
            .create(attrs("P1", "Pasta integral"), 1, &app.admin)
            .await
            .unwrap_err(),
        ServiceError::Conflict(_)
    );
}

#[tokio::test]
async fn create_validates_attributes() {
    let app = common::setup().await;

    assert_matches!(
        app.products.create(attrs("P1", ""), 0, &app.admin).await.unwrap_err(),
        ServiceError::Validation(_)
    );
    assert_matches!(
        app.products
            .create(attrs("P1", "Pasta"), -1, &app.admin)
            .await
            .unwrap_err(),
        ServiceError::Validation(_)
    );
    let mut bad_price = attrs("P1", "Pasta");
    bad_price.sale_price = dec!(-0.50);
    assert_matches!(
        app.products.create(bad_price, 0, &app.admin).await.unwrap_err(),
        ServiceError::Validation(_)
    );
}

#[tokio::test]
async fn manual_reduction_posts_the_ledger_entry_and_audits() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "P1", "Pasta", 10).await;

    let new_stock = app.products.reduce_stock(product.id, 4, &app.admin).await.unwrap();
    assert_eq!(new_stock, 6);

    let history = app.movements.list_for_product(product.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind(), Some(MovementKind::Outbound));
    assert_eq!(history[0].quantity, 4);
    assert_eq!(history[0].reason, MANUAL_ADJUSTMENT_REASON);
    assert!(history[0].origin_file.is_none());

    let adjust_id = common::latest_audit_id(&app.db, AuditAction::AdjustStock).await;
    assert_eq!(
        common::audit_entry(&app.db, adjust_id).await.record_id,
        Some(product.id)
    );
}

#[tokio::test]
async fn manual_reduction_guards() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "P1", "Pasta", 3).await;

    assert_matches!(
        app.products.reduce_stock(product.id, 1, &app.employee).await.unwrap_err(),
        ServiceError::Forbidden(_)
    );
    assert_matches!(
        app.products.reduce_stock(product.id, 0, &app.admin).await.unwrap_err(),
        ServiceError::Validation(_)
    );
    assert_matches!(
        app.products.reduce_stock(product.id, 5, &app.admin).await.unwrap_err(),
        ServiceError::InsufficientStock(_)
    );
    assert_matches!(
        app.products.reduce_stock(9999, 1, &app.admin).await.unwrap_err(),
        ServiceError::NotFound(_)
    );

    // Failed attempts leave no trace.
    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 3);
    assert!(app.movements.list_for_product(product.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn removal_hard_deletes_only_without_ledger_history() {
    let app = common::setup().await;

    // No movements: the row disappears.
    let fresh = common::seed_product(&app.db, "F1", "Fresco", 0).await;
    let hard = app.products.remove(fresh.id, &app.owner).await.unwrap();
    assert!(hard);
    assert_matches!(
        app.products.get(fresh.id).await.unwrap_err(),
        ServiceError::NotFound(_)
    );

    // With history: deactivated, history preserved.
    let used = common::seed_product(&app.db, "U1", "Usado", 10).await;
    app.products.reduce_stock(used.id, 2, &app.admin).await.unwrap();
    let hard = app.products.remove(used.id, &app.owner).await.unwrap();
    assert!(!hard);
    let kept = app.products.get(used.id).await.unwrap();
    assert!(!kept.active);
    assert_eq!(app.movements.list_for_product(used.id).await.unwrap().len(), 1);

    // Both paths audit DELETE_PRODUCT.
    let delete_id = common::latest_audit_id(&app.db, AuditAction::DeleteProduct).await;
    assert_eq!(
        common::audit_entry(&app.db, delete_id).await.record_id,
        Some(used.id)
    );
}

#[tokio::test]
async fn removal_is_owner_only() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "P1", "Pasta", 0).await;

    for actor in [&app.employee, &app.admin] {
        assert_matches!(
            app.products.remove(product.id, actor).await.unwrap_err(),
            ServiceError::Forbidden(_)
        );
    }
    assert!(app.products.get(product.id).await.is_ok());
}

#[tokio::test]
async fn active_listing_skips_deactivated_products() {
    let app = common::setup().await;
    let kept = common::seed_product(&app.db, "B1", "Brocoli", 5).await;
    let gone = common::seed_product(&app.db, "A1", "Aceite", 5).await;
    app.products.reduce_stock(gone.id, 1, &app.admin).await.unwrap();
    app.products.remove(gone.id, &app.owner).await.unwrap();

    let listed = app.products.list_active().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, kept.id);
}
