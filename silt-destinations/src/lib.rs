//! Warehouse destinations implementing the core destination contract.
//!
//! Each destination is generic over the [`silt::destination::executor::Executor`]
//! seam; the vendor wire client lives behind that boundary. What lives here is
//! the SQL: schema fetch and evolution, stage-table preparation, merge/append
//! statements, and per-dialect value casting.

pub mod bigquery;
mod destination;
pub mod redshift;
pub mod shared;
pub mod snowflake;

pub use destination::WarehouseDestination;
