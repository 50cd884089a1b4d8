//! The destination contract and its supporting types.
//!
//! Warehouse wire protocols are external collaborators; concrete destinations
//! implement [`base::Destination`] on top of the [`executor::Executor`] seam.

pub mod base;
pub mod ddl;
pub mod executor;
pub mod memory;
pub mod types;
