//! # Goal Projection
//!
//! $$
//! V_t = \sum_i a_i\,(1 + p_{i,t}),\qquad p_{i,t} = \frac{P_{i,t}-P_{i,0}}{P_{i,0}}
//! $$
//!
//! Projects the value of dollar allocations over the observed window and finds the first
//! date the savings goal is met.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::warn;

use super::data::ReturnSeries;
use crate::error::PortfolioError;
use crate::error::Result;

/// Projected portfolio value per date and the first date it reaches the goal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoalProjection {
  /// `(date, total value)` in chronological order.
  pub series: Vec<(NaiveDate, f64)>,
  /// Earliest date with value at or above the goal, `None` if never reached in the window.
  pub reached_date: Option<NaiveDate>,
  /// Sum of the allocations.
  pub total_invested: f64,
  /// Target value.
  pub goal: f64,
}

impl GoalProjection {
  pub fn is_reached(&self) -> bool {
    self.reached_date.is_some()
  }
}

/// Value allocations against each ticker's cumulative return since the window start.
///
/// A date's total sums the tickers quoted that day; unallocated tickers contribute nothing.
/// No extrapolation happens past the last observed date.
pub fn project_goal(
  allocations: &BTreeMap<String, f64>,
  series: &ReturnSeries,
  goal: f64,
) -> Result<GoalProjection> {
  if !goal.is_finite() {
    return Err(PortfolioError::validation("goal must be a finite amount"));
  }
  if let Some((ticker, amount)) = allocations
    .iter()
    .find(|(_, a)| !a.is_finite() || **a < 0.0)
  {
    return Err(PortfolioError::validation(format!(
      "allocation for {ticker} must be a non-negative amount, got {amount}"
    )));
  }

  let unknown: Vec<&String> = allocations
    .keys()
    .filter(|t| series.get(t).is_none())
    .collect();
  if !unknown.is_empty() {
    warn!(tickers = ?unknown, "allocations for tickers without prices are ignored");
  }

  let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
  for (ticker, obs) in series.observations() {
    let amount = allocations.get(ticker).copied().unwrap_or(0.0);
    *totals.entry(obs.date).or_insert(0.0) += amount * (1.0 + obs.price_pct);
  }

  let series: Vec<(NaiveDate, f64)> = totals.into_iter().collect();
  let reached_date = series.iter().find(|(_, v)| *v >= goal).map(|(d, _)| *d);

  Ok(GoalProjection {
    series,
    reached_date,
    total_invested: allocations.values().sum(),
    goal,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Duration;

  use super::*;
  use crate::quant::PricePoint;

  fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + Duration::days(i)
  }

  fn series() -> ReturnSeries {
    let mut prices = BTreeMap::new();
    // price_pct: A = [0, 0.5, 1.0], B = [0, 0.1, 0.2]
    prices.insert(
      "A".to_string(),
      vec![
        PricePoint::new(day(0), 100.0),
        PricePoint::new(day(1), 150.0),
        PricePoint::new(day(2), 200.0),
      ],
    );
    prices.insert(
      "B".to_string(),
      vec![
        PricePoint::new(day(0), 10.0),
        PricePoint::new(day(1), 11.0),
        PricePoint::new(day(2), 12.0),
      ],
    );
    ReturnSeries::from_prices(&prices)
  }

  fn allocations(a: f64, b: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([("A".to_string(), a), ("B".to_string(), b)])
  }

  #[test]
  fn goal_is_reached_on_first_crossing() {
    let projection = project_goal(&allocations(100.0, 200.0), &series(), 350.0).unwrap();

    assert_abs_diff_eq!(projection.series[0].1, 300.0, epsilon = 1e-9);
    assert_abs_diff_eq!(projection.series[1].1, 370.0, epsilon = 1e-9);
    assert_abs_diff_eq!(projection.series[2].1, 440.0, epsilon = 1e-9);
    assert_eq!(projection.reached_date, Some(day(1)));
    assert_eq!(projection.total_invested, 300.0);
  }

  #[test]
  fn unreachable_goal_is_not_extrapolated() {
    let projection = project_goal(&allocations(100.0, 200.0), &series(), 1_000.0).unwrap();

    assert_eq!(projection.series.len(), 3);
    assert!(!projection.is_reached());
  }

  #[test]
  fn zero_allocations_only_reach_non_positive_goals() {
    let zero = allocations(0.0, 0.0);

    let projection = project_goal(&zero, &series(), 10.0).unwrap();
    assert!(projection.series.iter().all(|(_, v)| *v == 0.0));
    assert_eq!(projection.reached_date, None);

    let projection = project_goal(&zero, &series(), 0.0).unwrap();
    assert_eq!(projection.reached_date, Some(day(0)));
  }

  #[test]
  fn negative_allocation_is_rejected() {
    let result = project_goal(&allocations(-1.0, 200.0), &series(), 350.0);
    assert!(matches!(result, Err(PortfolioError::Validation(_))));
  }

  #[test]
  fn empty_series_never_reaches_goal() {
    let projection =
      project_goal(&allocations(100.0, 0.0), &ReturnSeries::default(), 50.0).unwrap();
    assert!(projection.series.is_empty());
    assert_eq!(projection.reached_date, None);
  }
}
