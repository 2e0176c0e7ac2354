#![allow(dead_code)]

use almacen_api::{
    actor::{Actor, Role},
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{
        audit_entry::{self, AuditAction, Entity as AuditEntry},
        product, user,
    },
    events::{Event, EventSender},
    services::{
        AuditService, BatchIngestionService, LineItem, MovementService, ProductService,
        ReversalService, ShrinkageService,
    },
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a test needs: an isolated in-memory database with the schema
/// migrated, one seeded user per role, and the full service set wired to a
/// captive event channel.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub events: mpsc::Receiver<Event>,
    pub owner: Actor,
    pub admin: Actor,
    pub employee: Actor,
    pub products: ProductService,
    pub movements: MovementService,
    pub ingestion: BatchIngestionService,
    pub audit: AuditService,
    pub reversal: ReversalService,
    pub shrinkage: ShrinkageService,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub async fn setup() -> TestApp {
    init_tracing();

    // A single connection keeps the in-memory database alive and visible
    // to every operation in the test.
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = Arc::new(
        establish_connection_with_config(&config)
            .await
            .expect("failed to open in-memory database"),
    );
    run_migrations(&db).await.expect("migrations failed");

    let owner = seed_user(&db, "Dora", "dora@example.com", Role::Owner).await;
    let admin = seed_user(&db, "Alba", "alba@example.com", Role::Administrator).await;
    let employee = seed_user(&db, "Emi", "emi@example.com", Role::Employee).await;

    let (tx, events) = mpsc::channel(64);
    let sender = Arc::new(EventSender::new(tx));

    TestApp {
        products: ProductService::new(db.clone(), sender.clone()),
        movements: MovementService::new(db.clone()),
        ingestion: BatchIngestionService::new(db.clone(), sender.clone()),
        audit: AuditService::new(db.clone()),
        reversal: ReversalService::new(db.clone(), sender.clone()),
        shrinkage: ShrinkageService::new(db.clone(), sender),
        db,
        events,
        owner,
        admin,
        employee,
    }
}

pub async fn seed_user(db: &DbPool, name: &str, email: &str, role: Role) -> Actor {
    let created = user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        role: Set(role.as_str().to_string()),
        active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed user");

    Actor {
        id: created.id,
        role,
    }
}

pub async fn seed_product(db: &DbPool, code: &str, name: &str, stock: i64) -> product::Model {
    product::ActiveModel {
        code: Set(code.to_string()),
        name: Set(name.to_string()),
        category: Set(None),
        purchase_price: Set(dec!(2.50)),
        sale_price: Set(dec!(4.00)),
        current_stock: Set(stock),
        minimum_stock: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

/// Id of the most recent audit entry with this action.
pub async fn latest_audit_id(db: &DbPool, action: AuditAction) -> i64 {
    AuditEntry::find()
        .filter(audit_entry::Column::Action.eq(action.as_str()))
        .order_by_desc(audit_entry::Column::Id)
        .one(db)
        .await
        .expect("audit query failed")
        .expect("no audit entry for action")
        .id
}

pub async fn audit_entry(db: &DbPool, audit_id: i64) -> audit_entry::Model {
    AuditEntry::find_by_id(audit_id)
        .one(db)
        .await
        .expect("audit query failed")
        .expect("audit entry missing")
}

pub fn line(code: &str, name: &str, quantity: i64) -> LineItem {
    line_priced(code, name, quantity, dec!(1.20), dec!(2.00))
}

pub fn line_priced(
    code: &str,
    name: &str,
    quantity: i64,
    purchase_price: Decimal,
    sale_price: Decimal,
) -> LineItem {
    LineItem {
        code: code.to_string(),
        name: name.to_string(),
        category: None,
        quantity,
        purchase_price,
        sale_price,
    }
}
