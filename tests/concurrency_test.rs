mod common;

use almacen_api::{entities::audit_entry::AuditAction, errors::ServiceError};
use assert_matches::assert_matches;

#[tokio::test]
async fn concurrent_reversals_of_one_entry_have_one_winner() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "A1", "Aceite", 9).await;

    app.products.reduce_stock(product.id, 4, &app.admin).await.unwrap();
    let adjust_id = common::latest_audit_id(&app.db, AuditAction::AdjustStock).await;

    let (first, second) = {
        let svc_a = app.reversal.clone();
        let svc_b = app.reversal.clone();
        let owner = app.owner;
        let a = tokio::spawn(async move { svc_a.reverse(adjust_id, &owner).await });
        let b = tokio::spawn(async move { svc_b.reverse(adjust_id, &owner).await });
        (a.await.unwrap(), b.await.unwrap())
    };

    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    let loser = if first.is_ok() { second } else { first };
    assert_matches!(
        loser.unwrap_err(),
        ServiceError::AlreadyReverted(id) if id == adjust_id
    );

    // The compensation ran exactly once: 5 + 4, not 5 + 8.
    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 9);
    assert!(app.movements.list_for_product(product.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_reductions_cannot_overdraw_stock() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "P1", "Pasta", 5).await;

    let (first, second) = {
        let svc_a = app.products.clone();
        let svc_b = app.products.clone();
        let admin = app.admin;
        let a = tokio::spawn(async move { svc_a.reduce_stock(product.id, 3, &admin).await });
        let b = tokio::spawn(async move { svc_b.reduce_stock(product.id, 3, &admin).await });
        (a.await.unwrap(), b.await.unwrap())
    };

    // The guard is evaluated by the database against the live row, so at
    // most one of the two reductions fits.
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    let loser = if first.is_ok() { second } else { first };
    assert_matches!(loser.unwrap_err(), ServiceError::InsufficientStock(_));

    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 2);
    assert_eq!(app.movements.list_for_product(product.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_approvals_decrement_stock_once() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;
    let request = app
        .shrinkage
        .submit(product.id, 3, "caducado", None, &app.employee)
        .await
        .unwrap();

    let (first, second) = {
        let svc_a = app.shrinkage.clone();
        let svc_b = app.shrinkage.clone();
        let owner = app.owner;
        let admin = app.admin;
        let a = tokio::spawn(async move { svc_a.approve(request.id, &owner).await });
        let b = tokio::spawn(async move { svc_b.approve(request.id, &admin).await });
        (a.await.unwrap(), b.await.unwrap())
    };

    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    let loser = if first.is_ok() { second } else { first };
    assert_matches!(loser.unwrap_err(), ServiceError::Conflict(_));

    assert_eq!(app.products.get(product.id).await.unwrap().current_stock, 2);
    assert_eq!(app.movements.list_for_product(product.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn racing_approve_and_reject_reach_exactly_one_terminal_state() {
    let app = common::setup().await;
    let product = common::seed_product(&app.db, "Y1", "Producto Y", 5).await;
    let request = app
        .shrinkage
        .submit(product.id, 3, "caducado", None, &app.employee)
        .await
        .unwrap();

    let (approved, rejected) = {
        let svc_a = app.shrinkage.clone();
        let svc_b = app.shrinkage.clone();
        let owner = app.owner;
        let admin = app.admin;
        let a = tokio::spawn(async move { svc_a.approve(request.id, &owner).await });
        let b = tokio::spawn(async move {
            svc_b.reject(request.id, "sin evidencia", &admin).await
        });
        (a.await.unwrap(), b.await.unwrap())
    };

    assert_eq!(
        [approved.is_ok(), rejected.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );

    let decided = app.shrinkage.get(request.id).await.unwrap();
    let stock = app.products.get(product.id).await.unwrap().current_stock;
    if approved.is_ok() {
        assert_eq!(decided.status, "approved");
        assert_eq!(stock, 2);
    } else {
        assert_eq!(decided.status, "rejected");
        assert_eq!(stock, 5);
    }
}
