//! # Portfolio Performance
//!
//! $$
//! C_t = \prod_{s\le t}(1+r_s) - 1
//! $$
//!
//! Cumulative return trajectories, their date-wise comparison and the price-proportional
//! display composition.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::ArrayView1;

use super::data::ReturnSeries;
use super::types::CumulativePoint;
use super::types::DisplayComposition;
use crate::quant::round2;

/// Compounded return since the first date of `returns`.
pub fn cumulative_returns(dates: &[NaiveDate], returns: ArrayView1<'_, f64>) -> Vec<(NaiveDate, f64)> {
  let mut growth = 1.0;
  dates
    .iter()
    .zip(returns.iter())
    .map(|(&d, &r)| {
      growth *= 1.0 + r;
      (d, growth - 1.0)
    })
    .collect()
}

/// Outer join of the two trajectories on date; no value is imputed for the missing side.
pub fn merge_cumulative(
  portfolio: &[(NaiveDate, f64)],
  benchmark: &[(NaiveDate, f64)],
) -> Vec<CumulativePoint> {
  let mut rows: BTreeMap<NaiveDate, CumulativePoint> = BTreeMap::new();

  for &(date, value) in portfolio {
    rows
      .entry(date)
      .or_insert(CumulativePoint {
        date,
        portfolio: None,
        benchmark: None,
      })
      .portfolio = Some(value);
  }
  for &(date, value) in benchmark {
    rows
      .entry(date)
      .or_insert(CumulativePoint {
        date,
        portfolio: None,
        benchmark: None,
      })
      .benchmark = Some(value);
  }

  rows.into_values().collect()
}

/// Share of each held ticker's latest close in the sum of latest closes, in percent.
pub fn display_composition(series: &ReturnSeries, held: &[String]) -> DisplayComposition {
  let Some((as_of, latest)) = series.latest_prices() else {
    return DisplayComposition::default();
  };

  let latest: Vec<(String, f64)> = latest
    .into_iter()
    .filter(|(t, _)| held.contains(t))
    .collect();
  let total: f64 = latest.iter().map(|(_, p)| p).sum();
  if total <= 0.0 {
    return DisplayComposition {
      as_of: Some(as_of),
      entries: Vec::new(),
    };
  }

  DisplayComposition {
    as_of: Some(as_of),
    entries: latest
      .into_iter()
      .map(|(t, p)| (t, round2(p / total * 100.0)))
      .collect(),
  }
}
