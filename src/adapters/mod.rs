//! Concrete implementations of the domain ports.

pub mod ledger;
pub mod memory;
pub mod sqlite;
pub mod stub;
