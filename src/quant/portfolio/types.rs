//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}\in\Delta} \mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Result containers produced by the analysis pipeline.

use chrono::NaiveDate;

use super::data::AlignmentReport;

/// Variance-minimizing weights, one per ticker, summing to one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptimalWeights {
  /// Tickers in column order.
  pub tickers: Vec<String>,
  /// Weight per ticker in `[0, 1]`.
  pub weights: Vec<f64>,
  /// Daily portfolio variance `w' Σ w` at the solution.
  pub variance: f64,
  /// Solver iterations used (zero for closed-form cases).
  pub iterations: u64,
}

impl OptimalWeights {
  /// Weight of one ticker.
  pub fn get(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .position(|t| t == ticker)
      .map(|i| self.weights[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self
      .tickers
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }
}

/// Annualized standard deviations in percent, rounded to 2 dp.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RiskMetrics {
  /// Per-ticker risk from each aligned return column.
  pub tickers: Vec<(String, f64)>,
  /// Risk of the weighted daily portfolio returns.
  pub portfolio: f64,
  /// Risk of the benchmark's own daily returns.
  pub benchmark: f64,
}

impl RiskMetrics {
  pub fn ticker(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .find(|(t, _)| t == ticker)
      .map(|(_, r)| *r)
  }
}

/// One row of the portfolio vs benchmark comparison; a side is `None` when it has no value that day.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CumulativePoint {
  pub date: NaiveDate,
  pub portfolio: Option<f64>,
  pub benchmark: Option<f64>,
}

/// Price-proportional split of the latest closes, for display only.
///
/// Unrelated to [`OptimalWeights`]: it reflects how expensive each share is, not risk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayComposition {
  /// Date the closes were taken from.
  pub as_of: Option<NaiveDate>,
  /// `(ticker, percent)` rounded to 2 dp.
  pub entries: Vec<(String, f64)>,
}

/// Everything the risk-analysis view needs for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioReport {
  pub weights: OptimalWeights,
  pub risk: RiskMetrics,
  pub cumulative: Vec<CumulativePoint>,
  pub composition: DisplayComposition,
  /// Tickers and dates lost to alignment.
  pub alignment: AlignmentReport,
}

/// Watchlist card figures for one ticker.
#[derive(Clone, Debug, PartialEq)]
pub struct TickerSnapshot {
  pub ticker: String,
  pub fifty_day_average: f64,
  pub year_low: f64,
  pub year_high: f64,
}

/// Pricing tab figures for one ticker, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PricingSummary {
  /// `mean(daily) * 252 * 100`.
  pub annual_return: f64,
  /// Population standard deviation annualized, times 100.
  pub volatility: f64,
  /// `annual_return / volatility`, zero when volatility is zero.
  pub risk_adjusted: f64,
}
