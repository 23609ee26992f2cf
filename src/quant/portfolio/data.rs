//! # Portfolio Data
//!
//! $$
//! r_{i,t} = \frac{P_{i,t}}{P_{i,t-1}} - 1,\qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{i,t}-\bar r_i)(r_{j,t}-\bar r_j)
//! $$
//!
//! Return series construction, date alignment across tickers and the sample covariance.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray_stats::CorrelationExt;
use tracing::debug;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::PricePoint;

/// One dated observation of a ticker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReturnObservation {
  /// Trading day.
  pub date: NaiveDate,
  /// Close price.
  pub price: f64,
  /// Simple return against the previous close, `None` on the first observed day.
  pub daily_return: Option<f64>,
  /// Cumulative simple return since the first close in the window.
  pub price_pct: f64,
}

/// Sort, deduplicate and sanitize raw closes.
///
/// Duplicated dates keep the last reported close; non-finite or non-positive closes are dropped.
fn clean_prices(label: &str, prices: &[PricePoint]) -> Vec<PricePoint> {
  let mut by_date = BTreeMap::new();
  let mut duplicates = 0usize;
  let mut invalid = 0usize;

  for p in prices {
    if !p.close.is_finite() || p.close <= 0.0 {
      invalid += 1;
      continue;
    }
    if by_date.insert(p.date, p.close).is_some() {
      duplicates += 1;
    }
  }

  if duplicates > 0 {
    warn!(ticker = label, duplicates, "duplicate dates in price history, kept last close");
  }
  if invalid > 0 {
    warn!(ticker = label, invalid, "dropped non-positive or non-finite closes");
  }

  by_date
    .into_iter()
    .map(|(date, close)| PricePoint { date, close })
    .collect()
}

/// Per-ticker return series keyed by `(ticker, date)`, dates strictly increasing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnSeries {
  series: BTreeMap<String, Vec<ReturnObservation>>,
}

impl ReturnSeries {
  /// Build return series from raw closes. Tickers without a usable close are left out.
  pub fn from_prices(prices: &BTreeMap<String, Vec<PricePoint>>) -> Self {
    let mut series = BTreeMap::new();

    for (ticker, raw) in prices {
      let cleaned = clean_prices(ticker, raw);
      let Some(first) = cleaned.first() else {
        continue;
      };
      let price_start = first.close;

      let mut out = Vec::with_capacity(cleaned.len());
      let mut prev: Option<f64> = None;
      for p in &cleaned {
        out.push(ReturnObservation {
          date: p.date,
          price: p.close,
          daily_return: prev.map(|prev| p.close / prev - 1.0),
          price_pct: (p.close - price_start) / price_start,
        });
        prev = Some(p.close);
      }

      series.insert(ticker.clone(), out);
    }

    Self { series }
  }

  /// Tickers with at least one observation, in symbol order.
  pub fn tickers(&self) -> impl Iterator<Item = &str> {
    self.series.keys().map(String::as_str)
  }

  /// Observations of one ticker.
  pub fn get(&self, ticker: &str) -> Option<&[ReturnObservation]> {
    self.series.get(ticker).map(Vec::as_slice)
  }

  /// Number of tickers.
  pub fn len(&self) -> usize {
    self.series.len()
  }

  pub fn is_empty(&self) -> bool {
    self.series.values().all(Vec::is_empty)
  }

  /// Every `(ticker, observation)` pair, ticker-major.
  pub fn observations(&self) -> impl Iterator<Item = (&str, &ReturnObservation)> {
    self
      .series
      .iter()
      .flat_map(|(t, obs)| obs.iter().map(move |o| (t.as_str(), o)))
  }

  /// Union of observed dates.
  pub fn dates(&self) -> BTreeSet<NaiveDate> {
    self.observations().map(|(_, o)| o.date).collect()
  }

  pub fn latest_date(&self) -> Option<NaiveDate> {
    self.observations().map(|(_, o)| o.date).max()
  }

  /// Closes of every ticker quoted on the latest observed date.
  pub fn latest_prices(&self) -> Option<(NaiveDate, Vec<(String, f64)>)> {
    let latest = self.latest_date()?;
    let prices = self
      .series
      .iter()
      .filter_map(|(t, obs)| {
        obs
          .iter()
          .rev()
          .find(|o| o.date == latest)
          .map(|o| (t.clone(), o.price))
      })
      .collect();
    Some((latest, prices))
  }

  /// Defined daily returns of one ticker (first day excluded).
  pub fn daily_returns(&self, ticker: &str) -> Vec<(NaiveDate, f64)> {
    self
      .get(ticker)
      .unwrap_or_default()
      .iter()
      .filter_map(|o| o.daily_return.map(|r| (o.date, r)))
      .collect()
  }
}

/// What alignment removed from the requested selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlignmentReport {
  /// Requested tickers the provider returned no usable data for.
  pub missing_tickers: Vec<String>,
  /// Return dates dropped because at least one ticker had no value on them.
  pub dropped_rows: usize,
  /// Rows kept in the aligned matrix.
  pub rows: usize,
}

impl AlignmentReport {
  /// Whether alignment shrank the selection or the date range.
  pub fn is_reduced(&self) -> bool {
    !self.missing_tickers.is_empty() || self.dropped_rows > 0
  }
}

/// Date x ticker table of daily returns holding only dates shared by every ticker.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedReturnMatrix {
  tickers: Vec<String>,
  dates: Vec<NaiveDate>,
  returns: Array2<f64>,
}

impl AlignedReturnMatrix {
  /// Construct from explicit parts, validating the schema.
  pub fn new(tickers: Vec<String>, dates: Vec<NaiveDate>, returns: Array2<f64>) -> Result<Self> {
    if returns.nrows() != dates.len() || returns.ncols() != tickers.len() {
      return Err(PortfolioError::validation(format!(
        "return matrix is {}x{} but {} dates and {} tickers were given",
        returns.nrows(),
        returns.ncols(),
        dates.len(),
        tickers.len()
      )));
    }
    if dates.windows(2).any(|w| w[0] >= w[1]) {
      return Err(PortfolioError::validation(
        "dates must be strictly increasing",
      ));
    }
    let unique: BTreeSet<&String> = tickers.iter().collect();
    if unique.len() != tickers.len() {
      return Err(PortfolioError::validation("duplicate ticker columns"));
    }
    if returns.iter().any(|r| !r.is_finite()) {
      return Err(PortfolioError::validation(
        "return matrix contains non-finite values",
      ));
    }

    Ok(Self {
      tickers,
      dates,
      returns,
    })
  }

  /// Align the requested tickers on the intersection of their return dates.
  ///
  /// Tickers absent from `series` are reported as missing rather than failing the alignment.
  pub fn from_series(series: &ReturnSeries, requested: &[String]) -> (Self, AlignmentReport) {
    let mut report = AlignmentReport::default();
    let mut columns: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::new();

    for ticker in requested {
      if series.get(ticker).is_none() {
        report.missing_tickers.push(ticker.clone());
        continue;
      }
      let returns = series.daily_returns(ticker).into_iter().collect();
      columns.push((ticker.clone(), returns));
    }

    let union: BTreeSet<NaiveDate> = columns
      .iter()
      .flat_map(|(_, c)| c.keys().copied())
      .collect();
    let dates: Vec<NaiveDate> = union
      .iter()
      .copied()
      .filter(|d| columns.iter().all(|(_, c)| c.contains_key(d)))
      .collect();

    let mut returns = Array2::zeros((dates.len(), columns.len()));
    for (j, (_, col)) in columns.iter().enumerate() {
      for (i, d) in dates.iter().enumerate() {
        returns[[i, j]] = col[d];
      }
    }

    report.dropped_rows = union.len() - dates.len();
    report.rows = dates.len();

    if !report.missing_tickers.is_empty() {
      warn!(missing = ?report.missing_tickers, "tickers without price data left out of alignment");
    }
    if report.dropped_rows > 0 {
      warn!(
        dropped = report.dropped_rows,
        kept = report.rows,
        "dates not shared by every ticker dropped from aligned returns"
      );
    }
    debug!(
      tickers = columns.len(),
      rows = report.rows,
      "aligned return matrix built"
    );

    let matrix = Self {
      tickers: columns.into_iter().map(|(t, _)| t).collect(),
      dates,
      returns,
    };
    (matrix, report)
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  /// Number of aligned dates.
  pub fn n_rows(&self) -> usize {
    self.dates.len()
  }

  pub fn n_tickers(&self) -> usize {
    self.tickers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty() || self.tickers.is_empty()
  }

  /// Return column of one ticker.
  pub fn column(&self, ticker: &str) -> Option<ArrayView1<'_, f64>> {
    let j = self.tickers.iter().position(|t| t == ticker)?;
    Some(self.returns.column(j))
  }

  /// Weighted daily returns `sum_i w_i r_{i,t}`.
  pub fn weighted_returns(&self, weights: &[f64]) -> Result<Array1<f64>> {
    if weights.len() != self.tickers.len() {
      return Err(PortfolioError::validation(format!(
        "{} weights for {} tickers",
        weights.len(),
        self.tickers.len()
      )));
    }
    Ok(self.returns.dot(&Array1::from(weights.to_vec())))
  }
}

/// Daily returns of the benchmark over its own date range.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkReturns {
  pub symbol: String,
  pub dates: Vec<NaiveDate>,
  pub returns: Array1<f64>,
}

impl BenchmarkReturns {
  /// Percentage change of consecutive closes; the first day has no return and is dropped.
  pub fn from_prices(symbol: &str, prices: &[PricePoint]) -> Self {
    let cleaned = clean_prices(symbol, prices);
    let mut dates = Vec::with_capacity(cleaned.len().saturating_sub(1));
    let mut returns = Vec::with_capacity(cleaned.len().saturating_sub(1));

    for w in cleaned.windows(2) {
      dates.push(w[1].date);
      returns.push(w[1].close / w[0].close - 1.0);
    }

    Self {
      symbol: symbol.to_string(),
      dates,
      returns: Array1::from(returns),
    }
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }
}

/// Ticker x ticker sample covariance of daily returns (unannualized).
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceMatrix {
  pub tickers: Vec<String>,
  pub values: Array2<f64>,
}

impl CovarianceMatrix {
  pub fn len(&self) -> usize {
    self.tickers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tickers.is_empty()
  }

  /// Portfolio variance `w' Σ w`.
  pub fn quadratic_form(&self, w: &[f64]) -> f64 {
    let w = Array1::from(w.to_vec());
    w.dot(&self.values.dot(&w))
  }
}

/// Sample covariance (`ddof = 1`) of the aligned daily returns.
pub fn covariance_matrix(aligned: &AlignedReturnMatrix) -> Result<CovarianceMatrix> {
  if aligned.n_rows() < 2 || aligned.n_tickers() == 0 {
    return Err(PortfolioError::InsufficientData {
      observations: aligned.n_rows(),
      required: 2,
    });
  }

  // Observations are columns for `cov`, hence the transpose.
  let values = aligned
    .returns
    .t()
    .cov(1.0)
    .map_err(|_| PortfolioError::InsufficientData {
      observations: aligned.n_rows(),
      required: 2,
    })?;

  Ok(CovarianceMatrix {
    tickers: aligned.tickers.clone(),
    values,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Duration;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;

  fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i)
  }

  fn history(start: i64, closes: &[f64]) -> Vec<PricePoint> {
    closes
      .iter()
      .enumerate()
      .map(|(i, &c)| PricePoint::new(day(start + i as i64), c))
      .collect()
  }

  #[test]
  fn first_day_return_is_undefined() {
    let mut prices = BTreeMap::new();
    prices.insert("AAA".to_string(), history(0, &[100.0, 110.0, 99.0]));
    let series = ReturnSeries::from_prices(&prices);
    let obs = series.get("AAA").unwrap();

    assert_eq!(obs[0].daily_return, None);
    assert_abs_diff_eq!(obs[1].daily_return.unwrap(), 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(obs[2].daily_return.unwrap(), -0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(obs[2].price_pct, -0.01, epsilon = 1e-12);
    assert_eq!(series.daily_returns("AAA").len(), 2);
  }

  #[test]
  fn duplicate_dates_keep_last_close() {
    let mut raw = history(0, &[100.0, 101.0]);
    raw.push(PricePoint::new(day(1), 102.0));
    raw.reverse();
    let mut prices = BTreeMap::new();
    prices.insert("AAA".to_string(), raw);
    let series = ReturnSeries::from_prices(&prices);
    let obs = series.get("AAA").unwrap();

    assert_eq!(obs.len(), 2);
    assert!(obs[0].date < obs[1].date);
    assert_eq!(obs[1].price, 102.0);
  }

  #[test]
  fn alignment_keeps_only_shared_dates() {
    let mut prices = BTreeMap::new();
    // A returns on days 1..=3, B returns on days 2..=4.
    prices.insert("A".to_string(), history(0, &[10.0, 11.0, 12.0, 13.0]));
    prices.insert("B".to_string(), history(1, &[20.0, 21.0, 22.0, 23.0]));
    let series = ReturnSeries::from_prices(&prices);

    let (aligned, report) =
      AlignedReturnMatrix::from_series(&series, &["A".to_string(), "B".to_string()]);

    assert_eq!(aligned.dates(), &[day(2), day(3)]);
    assert_eq!(aligned.tickers(), &["A".to_string(), "B".to_string()]);
    assert_eq!(aligned.returns().shape(), &[2, 2]);
    assert_eq!(report.dropped_rows, 2);
    assert_eq!(report.rows, 2);
    assert!(report.missing_tickers.is_empty());
  }

  #[traced_test]
  #[test]
  fn missing_ticker_is_reported_and_logged() {
    let mut prices = BTreeMap::new();
    prices.insert("A".to_string(), history(0, &[10.0, 11.0, 12.0]));
    prices.insert("EMPTY".to_string(), Vec::new());
    let series = ReturnSeries::from_prices(&prices);

    let (aligned, report) = AlignedReturnMatrix::from_series(
      &series,
      &["A".to_string(), "EMPTY".to_string(), "GONE".to_string()],
    );

    assert_eq!(aligned.tickers(), &["A".to_string()]);
    assert_eq!(report.missing_tickers, vec!["EMPTY".to_string(), "GONE".to_string()]);
    assert!(report.is_reduced());
    assert!(logs_contain("tickers without price data"));
  }

  #[test]
  fn alignment_of_nothing_is_empty() {
    let series = ReturnSeries::default();
    let (aligned, report) = AlignedReturnMatrix::from_series(&series, &["A".to_string()]);

    assert!(aligned.is_empty());
    assert!(series.is_empty());
    assert_eq!(report.rows, 0);
  }

  #[test]
  fn covariance_matches_hand_computation() {
    let aligned = AlignedReturnMatrix::new(
      vec!["A".to_string(), "B".to_string()],
      vec![day(1), day(2), day(3)],
      array![[0.01, 0.03], [0.02, 0.02], [0.03, 0.01]],
    )
    .unwrap();

    let cov = covariance_matrix(&aligned).unwrap();
    assert_abs_diff_eq!(cov.values[[0, 0]], 1e-4, epsilon = 1e-15);
    assert_abs_diff_eq!(cov.values[[1, 1]], 1e-4, epsilon = 1e-15);
    assert_abs_diff_eq!(cov.values[[0, 1]], -1e-4, epsilon = 1e-15);
    assert_abs_diff_eq!(cov.values[[1, 0]], cov.values[[0, 1]], epsilon = 1e-15);
    assert_abs_diff_eq!(cov.quadratic_form(&[0.5, 0.5]), 0.0, epsilon = 1e-15);
  }

  #[test]
  fn covariance_needs_two_rows() {
    let aligned = AlignedReturnMatrix::new(
      vec!["A".to_string(), "B".to_string()],
      vec![day(1)],
      array![[0.01, 0.03]],
    )
    .unwrap();

    assert_eq!(
      covariance_matrix(&aligned),
      Err(PortfolioError::InsufficientData {
        observations: 1,
        required: 2
      })
    );
  }

  #[test]
  fn matrix_schema_is_validated() {
    let bad_shape = AlignedReturnMatrix::new(
      vec!["A".to_string()],
      vec![day(1), day(2)],
      array![[0.01, 0.02]],
    );
    assert!(matches!(bad_shape, Err(PortfolioError::Validation(_))));

    let unordered = AlignedReturnMatrix::new(
      vec!["A".to_string()],
      vec![day(2), day(1)],
      array![[0.01], [0.02]],
    );
    assert!(matches!(unordered, Err(PortfolioError::Validation(_))));
  }

  #[test]
  fn benchmark_returns_drop_first_day() {
    let bench = BenchmarkReturns::from_prices("^GSPC", &history(0, &[100.0, 102.0, 101.0]));

    assert_eq!(bench.dates, vec![day(1), day(2)]);
    assert_abs_diff_eq!(bench.returns[0], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(bench.returns[1], 101.0 / 102.0 - 1.0, epsilon = 1e-12);
  }
}
