//! Analysis modules.
//!
//! Group-wise summaries over joined sample tables: proportions, numeric
//! statistics, categorical breakdowns and signature exposures.

pub mod aggregator;
pub mod error;
pub mod signatures;
pub mod stats;

pub use aggregator::*;
pub use error::{AggregateError, AggregateResult};
