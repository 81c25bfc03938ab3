//! Master contract and data model for EtherCAT cyclic exchange.
//!
//! This crate defines what the cyclic engine consumes:
//!
//! - [`pdo`] - PDO entry descriptors and resolved image offsets
//! - [`slave`] - Slave descriptors and application layer states
//! - [`master`] - The [`Master`](master::Master) trait: lifecycle, cyclic
//!   exchange, and addressing
//! - [`mock`] - A simulated master for tests and hardware-free development

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod master;
pub mod mock;
pub mod pdo;
pub mod slave;

pub use master::{Master, MasterFactory};
pub use pdo::{Direction, PdoEntry, PdoOffset};
pub use slave::{PdoEntryInfo, SlaveInfo, SlaveState};
