//! Inventory ledger and reversal engine for a small import/retail
//! operation: a stock-bearing product registry, an append-only movement
//! ledger fed by daily closing batches, an audit trail over every mutating
//! action, a compensating reversal engine, and a shrinkage approval
//! workflow.
//!
//! The crate is the transactional core only. HTTP transport, CSV parsing,
//! authentication and reporting are collaborators that call into the
//! services exposed here.

pub mod actor;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

pub use actor::{Actor, Role, SYSTEM_ACTOR_ID};
pub use config::{load_config, AppConfig};
pub use db::{establish_connection, run_migrations, DbPool};
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use services::{
    AuditService, BatchIngestionService, ClosingReceipt, LineItem, MovementService, ProductAttrs,
    ProductService, ReversalOutcome, ReversalService, ShrinkageService,
};
