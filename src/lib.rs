//! # folio-rs
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}\in\Delta} \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Analytics core for a personal finance watchlist: aligned return series, minimum-variance
//! portfolios, annualized risk, benchmark comparison and savings-goal projections.

pub mod error;
pub mod market;
pub mod quant;

pub use error::PortfolioError;
pub use error::Result;
