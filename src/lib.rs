//! Reporting over a regional radio advertising sales ledger: client cohorts
//! per issuer, year-over-year variance and churn, ABC classification, client
//! rankings and per-client efficiency.
//!
//! A [`Session`] owns the normalized ledger and the active
//! [`FilterSelection`]; [`Session::run`] filters the ledger and feeds every
//! engine, returning a [`ReportBundle`] that [`reports`] renders into
//! [`output::Sheet`]s for console previews and CSV exports.
pub mod abc;
pub mod cohort;
pub mod config;
pub mod efficiency;
pub mod error;
pub mod filter;
pub mod loader;
pub mod output;
pub mod overview;
pub mod ranking;
pub mod reports;
pub mod schema;
pub mod session;
pub mod types;
pub mod util;
pub mod variance;

pub use config::ReportConfig;
pub use error::{ReportError, Result};
pub use filter::{FilterOptions, FilterSelection};
pub use session::{PipelineRequest, ReportBundle, Session};
pub use types::Transaction;
