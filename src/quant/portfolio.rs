//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Return alignment, minimum-variance optimization, risk and performance analytics and
//! savings-goal projection.

pub mod data;
pub mod engine;
pub mod goal;
pub mod optimizers;
pub mod performance;
pub mod risk;
pub mod types;

pub use data::covariance_matrix;
pub use data::AlignedReturnMatrix;
pub use data::AlignmentReport;
pub use data::BenchmarkReturns;
pub use data::CovarianceMatrix;
pub use data::ReturnObservation;
pub use data::ReturnSeries;
pub use engine::AnalysisContext;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::SnapshotConfig;
pub use goal::project_goal;
pub use goal::GoalProjection;
pub use optimizers::optimize_min_variance;
pub use optimizers::MinVarianceConfig;
pub use performance::cumulative_returns;
pub use performance::display_composition;
pub use performance::merge_cumulative;
pub use risk::annualized_std;
pub use risk::pricing_summary;
pub use risk::risk_metrics;
pub use risk::ticker_snapshot;
pub use types::CumulativePoint;
pub use types::DisplayComposition;
pub use types::OptimalWeights;
pub use types::PortfolioReport;
pub use types::PricingSummary;
pub use types::RiskMetrics;
pub use types::TickerSnapshot;
