//! Database module for Statusboard.
//!
//! Provides SQLite storage for the endpoint registry and the check result
//! log, with embedded migrations.

mod models;
mod seed;
mod store;

pub use models::*;
pub use seed::*;
pub use store::*;
