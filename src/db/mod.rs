//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed domain entities and view models returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Business rules (who may do what, and when) live in the operation modules;
//! everything here is plain reads, writes and row mapping. Functions suffixed
//! `_tx` expect to run inside a caller-owned transaction.

pub mod model;
pub mod repo;

// Re-export the repository API at `crate::db::*` for convenience.
pub use repo::*;

pub use model::{
    ApplicationContext, ClaimedEntry, EntryRow, NewPayslip, OfferContext, OfferForNotify,
    OfferRow, OverduePayslip, Party, PayslipForNotify, PayslipRow, PayslipSummary,
    TimesheetForNotify, TimesheetRow,
};
