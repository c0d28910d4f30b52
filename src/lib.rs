//! Workforce engagement and payroll settlement engine: offer lifecycle,
//! timesheet ledger, deterministic payslip arithmetic, payment instruction
//! files, and the overdue sweep, over a SQLite store.

pub mod bank;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod instructions;
pub mod model;
pub mod money;
pub mod notify;
pub mod offers;
pub mod outbox;
pub mod settlement;
pub mod suspension;
pub mod sweep;
pub mod timesheets;
