//! Billing Engine for Clinic Point-of-Sale
//!
//! Provides the arithmetic and reconciliation behind a clinic bill:
//! - Line item totals and subtotals
//! - Tax, discounts and grand total
//! - Payment status, balance due and split-tender validation
//! - Bill aggregate with edit-driven recomputation and versioned commits
//! - Collection summaries for the billing dashboard

pub mod config;
pub mod error;
pub mod models;
pub mod line_items;
pub mod totals;
pub mod payment;
pub mod service;
pub mod commit;
pub mod reporting;

pub use config::*;
pub use error::*;
pub use models::*;
pub use line_items::*;
pub use totals::*;
pub use payment::*;
pub use service::*;
pub use commit::*;
pub use reporting::*;
