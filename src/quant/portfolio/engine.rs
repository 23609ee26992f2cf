//! # Portfolio Engine
//!
//! $$
//! (\text{tickers},[t_0,t_1)) \mapsto \big(\mathbf{w}^\*,\ \sigma,\ C_t,\ \text{composition}\big)
//! $$
//!
//! Request-level orchestration: validate the context, fetch prices once, then run the pure
//! analysis pipeline. Nothing is cached between calls.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::Local;
use chrono::NaiveDate;
use tracing::info;
use tracing::warn;

use super::data::covariance_matrix;
use super::data::AlignedReturnMatrix;
use super::data::BenchmarkReturns;
use super::data::ReturnSeries;
use super::goal::project_goal;
use super::goal::GoalProjection;
use super::optimizers::optimize_min_variance;
use super::optimizers::MinVarianceConfig;
use super::performance::cumulative_returns;
use super::performance::display_composition;
use super::performance::merge_cumulative;
use super::risk::pricing_summary;
use super::risk::risk_metrics;
use super::risk::ticker_snapshot;
use super::types::PortfolioReport;
use super::types::PricingSummary;
use super::types::TickerSnapshot;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::market::PriceSource;
use crate::quant::PricePoint;
use crate::quant::TRADING_DAYS;

/// Immutable selection a request runs against: tickers and a `[start, end)` window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisContext {
  tickers: Vec<String>,
  start: NaiveDate,
  end: NaiveDate,
}

impl AnalysisContext {
  /// Validate against today's local date.
  pub fn new<I, T>(tickers: I, start: NaiveDate, end: NaiveDate) -> Result<Self>
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    Self::as_of(tickers, start, end, Local::now().date_naive())
  }

  /// Validate against an explicit `today`.
  ///
  /// Tickers are trimmed, deduplicated and kept in symbol order.
  pub fn as_of<I, T>(tickers: I, start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Result<Self>
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    let mut selected = BTreeSet::new();
    for t in tickers {
      let t: String = t.into();
      let t = t.trim();
      if t.is_empty() {
        return Err(PortfolioError::validation("ticker symbols cannot be blank"));
      }
      selected.insert(t.to_string());
    }

    if selected.is_empty() {
      return Err(PortfolioError::validation("select at least one ticker"));
    }
    if end <= start {
      return Err(PortfolioError::validation(format!(
        "end date {end} must be after start date {start}"
      )));
    }
    if end > today {
      return Err(PortfolioError::validation(format!(
        "end date {end} cannot be in the future"
      )));
    }

    Ok(Self {
      tickers: selected.into_iter().collect(),
      start,
      end,
    })
  }

  /// Single-ticker window for the details view, which needs at least two calendar days.
  pub fn single_as_of(
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
  ) -> Result<Self> {
    if (end - start).num_days() < 2 {
      return Err(PortfolioError::validation(
        "select a date range of at least 2 days",
      ));
    }
    Self::as_of([ticker], start, end, today)
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn start(&self) -> NaiveDate {
    self.start
  }

  pub fn end(&self) -> NaiveDate {
    self.end
  }
}

/// Watchlist card windows, in observations.
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
  /// Closes averaged for the short-window mean.
  pub short_window: usize,
  /// Closes scanned for the low/high range.
  pub long_window: usize,
}

impl Default for SnapshotConfig {
  fn default() -> Self {
    Self {
      short_window: 50,
      long_window: 365,
    }
  }
}

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Benchmark index symbol.
  pub benchmark: String,
  /// Trading days per year used to annualize.
  pub trading_days: f64,
  /// Minimum-variance solver settings.
  pub optimizer: MinVarianceConfig,
  /// Watchlist card windows.
  pub snapshot: SnapshotConfig,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      benchmark: "^GSPC".to_string(),
      trading_days: TRADING_DAYS,
      optimizer: MinVarianceConfig::default(),
      snapshot: SnapshotConfig::default(),
    }
  }
}

/// Entry point for the dashboard's analysis requests.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  fn fetch_prices<S: PriceSource>(
    &self,
    source: &S,
    ctx: &AnalysisContext,
  ) -> Result<BTreeMap<String, Vec<PricePoint>>> {
    let prices = source
      .fetch_prices(ctx.tickers(), ctx.start(), ctx.end())
      .map_err(|e| PortfolioError::unavailable(format!("price fetch failed: {e:#}")))?;

    if prices.values().all(Vec::is_empty) {
      return Err(PortfolioError::unavailable(format!(
        "no prices for {} between {} and {}",
        ctx.tickers().join(", "),
        ctx.start(),
        ctx.end()
      )));
    }
    Ok(prices)
  }

  fn fetch_benchmark<S: PriceSource>(
    &self,
    source: &S,
    ctx: &AnalysisContext,
  ) -> Result<Vec<PricePoint>> {
    let symbol = &self.config.benchmark;
    let prices = source
      .fetch_benchmark_prices(symbol, ctx.start(), ctx.end())
      .map_err(|e| PortfolioError::unavailable(format!("benchmark {symbol} fetch failed: {e:#}")))?;

    if prices.is_empty() {
      return Err(PortfolioError::unavailable(format!(
        "no benchmark {symbol} prices between {} and {}",
        ctx.start(),
        ctx.end()
      )));
    }
    Ok(prices)
  }

  /// Per-ticker prices, daily returns and cumulative returns for the selection.
  pub fn load_return_series<S: PriceSource>(
    &self,
    source: &S,
    ctx: &AnalysisContext,
  ) -> Result<ReturnSeries> {
    let prices = self.fetch_prices(source, ctx)?;
    Ok(ReturnSeries::from_prices(&prices))
  }

  /// Minimum-variance weights, risk, benchmark comparison and display composition.
  ///
  /// Tickers that share no trading date are `DataUnavailable`. Fewer than two aligned return rows,
  /// or fewer than two benchmark returns, are `InsufficientData`: the report always carries a
  /// benchmark risk.
  pub fn compute_optimal_portfolio<S: PriceSource>(
    &self,
    source: &S,
    ctx: &AnalysisContext,
  ) -> Result<PortfolioReport> {
    info!(
      tickers = ?ctx.tickers(),
      start = %ctx.start(),
      end = %ctx.end(),
      "computing minimum-variance portfolio"
    );

    let prices = self.fetch_prices(source, ctx)?;
    let benchmark_prices = self.fetch_benchmark(source, ctx)?;

    let series = ReturnSeries::from_prices(&prices);
    let (aligned, alignment) = AlignedReturnMatrix::from_series(&series, ctx.tickers());
    if aligned.n_tickers() == 0 {
      return Err(PortfolioError::unavailable(
        "none of the selected tickers has usable prices",
      ));
    }
    if alignment.rows == 0 && alignment.dropped_rows > 0 {
      return Err(PortfolioError::unavailable(format!(
        "{} share no trading dates between {} and {}",
        aligned.tickers().join(", "),
        ctx.start(),
        ctx.end()
      )));
    }
    let benchmark = BenchmarkReturns::from_prices(&self.config.benchmark, &benchmark_prices);

    let cov = covariance_matrix(&aligned)?;
    let weights = optimize_min_variance(&cov, &self.config.optimizer)?;
    let risk = risk_metrics(&aligned, &weights, &benchmark, self.config.trading_days)?;

    let portfolio_returns = aligned.weighted_returns(&weights.weights)?;
    let cumulative = merge_cumulative(
      &cumulative_returns(aligned.dates(), portfolio_returns.view()),
      &cumulative_returns(&benchmark.dates, benchmark.returns.view()),
    );
    let composition = display_composition(&series, ctx.tickers());

    info!(
      portfolio_risk = risk.portfolio,
      benchmark_risk = risk.benchmark,
      rows = alignment.rows,
      "portfolio computed"
    );

    Ok(PortfolioReport {
      weights,
      risk,
      cumulative,
      composition,
      alignment,
    })
  }

  /// Projected value of `allocations` over `series` against `goal`.
  pub fn compute_goal_projection(
    &self,
    allocations: &BTreeMap<String, f64>,
    series: &ReturnSeries,
    goal: f64,
  ) -> Result<GoalProjection> {
    let projection = project_goal(allocations, series, goal)?;
    match projection.reached_date {
      Some(date) => info!(goal, %date, "goal reached"),
      None => info!(goal, "goal not reached in the observed window"),
    }
    Ok(projection)
  }

  /// Watchlist card figures for every ticker in `series`.
  pub fn watchlist_snapshots(&self, series: &ReturnSeries) -> Vec<TickerSnapshot> {
    series
      .tickers()
      .filter_map(|t| {
        let closes: Vec<f64> = series.get(t)?.iter().map(|o| o.price).collect();
        match ticker_snapshot(t, &closes, &self.config.snapshot) {
          Ok(snapshot) => Some(snapshot),
          Err(e) => {
            warn!(ticker = t, error = %e, "skipping watchlist card");
            None
          }
        }
      })
      .collect()
  }

  /// Details view figures for the single ticker of `ctx`.
  pub fn ticker_details<S: PriceSource>(
    &self,
    source: &S,
    ctx: &AnalysisContext,
  ) -> Result<(TickerSnapshot, PricingSummary)> {
    let [ticker] = ctx.tickers() else {
      return Err(PortfolioError::validation(
        "details are computed for exactly one ticker",
      ));
    };

    let series = self.load_return_series(source, ctx)?;
    let observations = series
      .get(ticker)
      .ok_or_else(|| PortfolioError::unavailable(format!("no usable prices for {ticker}")))?;

    let closes: Vec<f64> = observations.iter().map(|o| o.price).collect();
    let snapshot = ticker_snapshot(ticker, &closes, &self.config.snapshot)?;

    let returns: Vec<f64> = observations.iter().filter_map(|o| o.daily_return).collect();
    let summary = pricing_summary(&returns, self.config.trading_days)?;

    Ok((snapshot, summary))
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use approx::assert_abs_diff_eq;
  use chrono::Duration;

  use super::*;
  use crate::market::InMemoryPriceSource;

  fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i)
  }

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
  }

  fn history(closes: &[f64]) -> Vec<PricePoint> {
    closes
      .iter()
      .enumerate()
      .map(|(i, &c)| PricePoint::new(day(i as i64), c))
      .collect()
  }

  fn source() -> InMemoryPriceSource {
    InMemoryPriceSource::new()
      .with_history(
        "AAA",
        history(&[100.0, 101.0, 99.5, 102.0, 101.2, 103.5, 102.8, 104.0, 103.1, 105.0]),
      )
      .with_history(
        "BBB",
        history(&[50.0, 49.6, 50.4, 50.1, 50.9, 50.2, 51.0, 50.7, 51.3, 51.1]),
      )
      .with_history(
        "CCC",
        history(&[20.0, 20.8, 19.9, 21.0, 20.1, 21.4, 20.5, 21.9, 20.8, 22.3]),
      )
      .with_history(
        "^GSPC",
        history(&[4700.0, 4710.0, 4695.0, 4730.0, 4725.0, 4750.0, 4742.0, 4760.0, 4755.0, 4780.0]),
      )
  }

  fn ctx(tickers: &[&str]) -> AnalysisContext {
    AnalysisContext::as_of(tickers.iter().copied(), day(0), day(30), today()).unwrap()
  }

  struct CountingSource {
    calls: Cell<usize>,
  }

  impl PriceSource for CountingSource {
    fn fetch_prices(
      &self,
      _tickers: &[String],
      _start: NaiveDate,
      _end: NaiveDate,
    ) -> anyhow::Result<BTreeMap<String, Vec<PricePoint>>> {
      self.calls.set(self.calls.get() + 1);
      Err(anyhow::anyhow!("provider offline"))
    }
  }

  #[test]
  fn context_rejects_invalid_requests() {
    let empty: [&str; 0] = [];
    assert!(matches!(
      AnalysisContext::as_of(empty, day(0), day(5), today()),
      Err(PortfolioError::Validation(_))
    ));
    assert!(matches!(
      AnalysisContext::as_of(["AAA"], day(5), day(5), today()),
      Err(PortfolioError::Validation(_))
    ));
    assert!(matches!(
      AnalysisContext::as_of(["AAA"], day(0), today() + Duration::days(1), today()),
      Err(PortfolioError::Validation(_))
    ));
    assert!(matches!(
      AnalysisContext::as_of(["AAA", " "], day(0), day(5), today()),
      Err(PortfolioError::Validation(_))
    ));
    assert!(matches!(
      AnalysisContext::single_as_of("AAA", day(0), day(1), today()),
      Err(PortfolioError::Validation(_))
    ));
  }

  #[test]
  fn context_normalizes_tickers() {
    let ctx = AnalysisContext::as_of([" BBB", "AAA", "BBB"], day(0), day(5), today()).unwrap();
    assert_eq!(ctx.tickers(), &["AAA".to_string(), "BBB".to_string()]);
  }

  #[test]
  fn optimal_portfolio_end_to_end() {
    let engine = PortfolioEngine::default();
    let report = engine
      .compute_optimal_portfolio(&source(), &ctx(&["AAA", "BBB", "CCC"]))
      .unwrap();

    let w = &report.weights.weights;
    assert_eq!(w.len(), 3);
    assert!(w.iter().all(|&wi| (0.0..=1.0).contains(&wi)));
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-6);

    assert_eq!(report.risk.tickers.len(), 3);
    assert!(report.risk.portfolio <= report.risk.ticker("AAA").unwrap());
    assert!(report.risk.benchmark > 0.0);

    // Both series start on the first return date and share every date here.
    assert_eq!(report.cumulative.len(), 9);
    assert!(report
      .cumulative
      .iter()
      .all(|p| p.portfolio.is_some() && p.benchmark.is_some()));

    let total: f64 = report.composition.entries.iter().map(|(_, p)| p).sum();
    assert_abs_diff_eq!(total, 100.0, epsilon = 0.02);
    assert!(!report.alignment.is_reduced());
  }

  #[test]
  fn repeated_requests_are_identical() {
    let engine = PortfolioEngine::default();
    let first = engine
      .compute_optimal_portfolio(&source(), &ctx(&["AAA", "BBB", "CCC"]))
      .unwrap();
    let second = engine
      .compute_optimal_portfolio(&source(), &ctx(&["AAA", "BBB", "CCC"]))
      .unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn single_ticker_gets_full_weight() {
    let engine = PortfolioEngine::default();
    let report = engine
      .compute_optimal_portfolio(&source(), &ctx(&["BBB"]))
      .unwrap();

    assert_eq!(report.weights.weights, vec![1.0]);
    assert_eq!(report.risk.portfolio, report.risk.ticker("BBB").unwrap());
  }

  #[test]
  fn missing_ticker_reduces_selection() {
    let engine = PortfolioEngine::default();
    let report = engine
      .compute_optimal_portfolio(&source(), &ctx(&["AAA", "BBB", "NOPE"]))
      .unwrap();

    assert_eq!(report.weights.tickers, vec!["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(report.alignment.missing_tickers, vec!["NOPE".to_string()]);
  }

  #[test]
  fn one_aligned_row_is_insufficient() {
    let source = InMemoryPriceSource::new()
      .with_history("AAA", history(&[10.0, 11.0]))
      .with_history("BBB", history(&[20.0, 19.0]))
      .with_history("^GSPC", history(&[4700.0, 4710.0, 4720.0]));

    let result = PortfolioEngine::default().compute_optimal_portfolio(&source, &ctx(&["AAA", "BBB"]));
    assert_eq!(
      result,
      Err(PortfolioError::InsufficientData {
        observations: 1,
        required: 2
      })
    );
  }

  #[test]
  fn disjoint_dates_are_unavailable() {
    let source = InMemoryPriceSource::new()
      .with_history("AAA", history(&[10.0, 11.0, 12.0]))
      .with_history(
        "BBB",
        (5..8).map(|i| PricePoint::new(day(i), 20.0 + i as f64)).collect(),
      )
      .with_history("^GSPC", history(&[4700.0, 4710.0, 4720.0]));

    let result = PortfolioEngine::default().compute_optimal_portfolio(&source, &ctx(&["AAA", "BBB"]));
    assert!(matches!(result, Err(PortfolioError::DataUnavailable(_))));
  }

  #[test]
  fn short_benchmark_is_insufficient() {
    let source = InMemoryPriceSource::new()
      .with_history("AAA", history(&[10.0, 11.0, 10.5, 11.2]))
      .with_history("BBB", history(&[20.0, 19.0, 19.6, 20.1]))
      .with_history("^GSPC", history(&[4700.0, 4710.0]));

    let result = PortfolioEngine::default().compute_optimal_portfolio(&source, &ctx(&["AAA", "BBB"]));
    assert_eq!(
      result,
      Err(PortfolioError::InsufficientData {
        observations: 1,
        required: 2
      })
    );
  }

  #[test]
  fn empty_provider_response_is_unavailable() {
    let result = PortfolioEngine::default()
      .compute_optimal_portfolio(&InMemoryPriceSource::new(), &ctx(&["AAA"]));
    assert!(matches!(result, Err(PortfolioError::DataUnavailable(_))));
  }

  #[test]
  fn missing_benchmark_is_unavailable() {
    let source = InMemoryPriceSource::new().with_history("AAA", history(&[1.0, 2.0, 3.0, 4.0]));
    let result = PortfolioEngine::default().compute_optimal_portfolio(&source, &ctx(&["AAA"]));
    assert!(matches!(result, Err(PortfolioError::DataUnavailable(_))));
  }

  #[test]
  fn provider_failure_is_unavailable() {
    let source = CountingSource {
      calls: Cell::new(0),
    };
    let result = PortfolioEngine::default().compute_optimal_portfolio(&source, &ctx(&["AAA"]));

    assert!(matches!(result, Err(PortfolioError::DataUnavailable(_))));
    assert_eq!(source.calls.get(), 1);
  }

  #[test]
  fn goal_projection_over_loaded_series() {
    let engine = PortfolioEngine::default();
    let series = engine
      .load_return_series(&source(), &ctx(&["AAA", "BBB"]))
      .unwrap();
    let allocations = BTreeMap::from([("AAA".to_string(), 100.0), ("BBB".to_string(), 200.0)]);

    let projection = engine
      .compute_goal_projection(&allocations, &series, 300.0)
      .unwrap();
    assert_eq!(projection.series.len(), 10);
    assert_abs_diff_eq!(projection.series[0].1, 300.0, epsilon = 1e-9);
    assert_eq!(projection.reached_date, Some(day(0)));
  }

  #[test]
  fn ticker_details_for_single_ticker() {
    let engine = PortfolioEngine::default();
    let ctx = AnalysisContext::single_as_of("AAA", day(0), day(30), today()).unwrap();
    let (snapshot, summary) = engine.ticker_details(&source(), &ctx).unwrap();

    assert_eq!(snapshot.ticker, "AAA");
    assert_eq!(snapshot.year_low, 99.5);
    assert_eq!(snapshot.year_high, 105.0);
    assert!(summary.volatility > 0.0);

    let snapshots = engine.watchlist_snapshots(
      &engine
        .load_return_series(&source(), &ctx)
        .unwrap(),
    );
    assert_eq!(snapshots, vec![snapshot]);
  }
}
