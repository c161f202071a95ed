//! Infrastructure adapters for external systems.

pub mod capabilities;
pub mod delivery;
pub mod sqlite;
