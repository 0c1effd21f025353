//! Stage-level execution summary.
//!
//! - [`ExecutionSummaryService`] keeps the summary's layout entries current
//! - [`SummaryReadHelper`] serves bounded reads from the read replicas

mod identity;
mod read_helper;
mod service;
mod strategy;

pub use read_helper::{SummaryReadHelper, SummaryStreamQuery};
pub use service::ExecutionSummaryService;
pub use strategy::{strategy_writes, StrategyWrites};
