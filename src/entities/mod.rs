pub mod audit_entry;
pub mod daily_closing;
pub mod product;
pub mod shrinkage_request;
pub mod stock_movement;
pub mod user;
