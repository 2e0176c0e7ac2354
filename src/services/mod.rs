pub mod audit;
pub mod ingestion;
pub mod movements;
pub mod products;
pub mod reversal;
pub mod shrinkage;

pub use audit::AuditService;
pub use ingestion::{BatchIngestionService, ClosingReceipt, LineItem};
pub use movements::MovementService;
pub use products::{ProductAttrs, ProductService, MANUAL_ADJUSTMENT_REASON};
pub use reversal::{ReversalOutcome, ReversalService};
pub use shrinkage::ShrinkageService;
