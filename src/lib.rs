//! Multi-location stock tracking with an approval workflow for transfers.
//!
//! Items carry a per-location [`item::StockLedger`]. Stock moves only through
//! [`movement::MovementRequest`]s that are proposed, approved (which executes the
//! transfer in the same transaction) or rejected and resubmitted, each step leaving an
//! entry in the request's audit trail.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod group;
pub mod item;
pub mod location;
pub mod movement;
pub mod quantity;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use config::StoreConfig;
pub use error::{ErrorKind, StockError, StockResult};
pub use quantity::{Quantity, RawQuantity};
pub use service::StockService;
pub use store::Store;
