//! # Portfolio Risk
//!
//! $$
//! \sigma_{\text{ann}} = 100\sqrt{252}\,\sqrt{\tfrac{1}{T-1}\textstyle\sum_t (r_t-\bar r)^2}
//! $$
//!
//! Annualized volatility of tickers, the weighted portfolio and the benchmark, plus the
//! per-ticker watchlist and pricing figures.

use ndarray::Array1;
use ndarray::ArrayView1;

use super::data::AlignedReturnMatrix;
use super::data::BenchmarkReturns;
use super::engine::SnapshotConfig;
use super::types::OptimalWeights;
use super::types::PricingSummary;
use super::types::RiskMetrics;
use super::types::TickerSnapshot;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::annualize_std;
use crate::quant::round2;

/// Sample (`ddof = 1`) standard deviation annualized to percent and rounded to 2 dp.
pub fn annualized_std(returns: ArrayView1<'_, f64>, trading_days: f64) -> Result<f64> {
  if returns.len() < 2 {
    return Err(PortfolioError::InsufficientData {
      observations: returns.len(),
      required: 2,
    });
  }
  Ok(round2(annualize_std(returns.std(1.0), trading_days)))
}

/// Risk of every aligned ticker, of the weighted portfolio and of the benchmark.
pub fn risk_metrics(
  aligned: &AlignedReturnMatrix,
  weights: &OptimalWeights,
  benchmark: &BenchmarkReturns,
  trading_days: f64,
) -> Result<RiskMetrics> {
  if weights.tickers != aligned.tickers() {
    return Err(PortfolioError::validation(
      "weights and aligned returns cover different tickers",
    ));
  }

  let returns = aligned.returns();
  let tickers = aligned
    .tickers()
    .iter()
    .zip(returns.columns())
    .map(|(t, col)| Ok((t.clone(), annualized_std(col, trading_days)?)))
    .collect::<Result<Vec<_>>>()?;

  let portfolio_returns = aligned.weighted_returns(&weights.weights)?;
  let portfolio = annualized_std(portfolio_returns.view(), trading_days)?;
  let benchmark = annualized_std(benchmark.returns.view(), trading_days)?;

  Ok(RiskMetrics {
    tickers,
    portfolio,
    benchmark,
  })
}

/// Pricing figures of a single ticker from its defined daily returns.
///
/// Volatility here is the population deviation and the ratio has no risk-free leg.
pub fn pricing_summary(daily_returns: &[f64], trading_days: f64) -> Result<PricingSummary> {
  if daily_returns.is_empty() {
    return Err(PortfolioError::InsufficientData {
      observations: 0,
      required: 1,
    });
  }

  let r = Array1::from(daily_returns.to_vec());
  let mean = r.sum() / r.len() as f64;
  let annual_return = mean * trading_days * 100.0;
  let volatility = annualize_std(r.std(0.0), trading_days);
  let risk_adjusted = if volatility != 0.0 {
    annual_return / volatility
  } else {
    0.0
  };

  Ok(PricingSummary {
    annual_return: round2(annual_return),
    volatility: round2(volatility),
    risk_adjusted: round2(risk_adjusted),
  })
}

/// Short-window average and long-window range of a ticker's closes.
pub fn ticker_snapshot(
  ticker: &str,
  closes: &[f64],
  config: &SnapshotConfig,
) -> Result<TickerSnapshot> {
  if closes.is_empty() {
    return Err(PortfolioError::unavailable(format!("no closes for {ticker}")));
  }

  let short = &closes[closes.len().saturating_sub(config.short_window.max(1))..];
  let long = &closes[closes.len().saturating_sub(config.long_window.max(1))..];

  let fifty_day_average = short.iter().sum::<f64>() / short.len() as f64;
  let year_low = long.iter().copied().fold(f64::INFINITY, f64::min);
  let year_high = long.iter().copied().fold(f64::NEG_INFINITY, f64::max);

  Ok(TickerSnapshot {
    ticker: ticker.to_string(),
    fifty_day_average: round2(fifty_day_average),
    year_low: round2(year_low),
    year_high: round2(year_high),
  })
}
