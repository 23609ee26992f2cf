//! Yahoo Finance daily closes (feature `yahoo`).
//!
//! Uses the blocking client, so a fetch is one synchronous call like the rest of the pipeline.
//! Closes are split/dividend adjusted.

use std::collections::BTreeMap;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use chrono::DateTime;
use chrono::NaiveDate;
use time::OffsetDateTime;
use tracing::info;
use tracing::warn;
use yahoo_finance_api as yahoo;

use super::PriceSource;
use crate::quant::PricePoint;

/// Price source backed by the Yahoo Finance chart API.
pub struct YahooPriceSource {
  connector: yahoo::YahooConnector,
}

impl YahooPriceSource {
  pub fn new() -> Result<Self> {
    let connector =
      yahoo::YahooConnector::new().map_err(|e| anyhow!("cannot create Yahoo connector: {e}"))?;
    Ok(Self { connector })
  }

  fn history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
    let response = self
      .connector
      .get_quote_history(symbol, to_offset(start)?, to_offset(end)?)
      .map_err(|e| anyhow!("Yahoo request for {symbol} failed: {e}"))?;
    let quotes = response
      .quotes()
      .map_err(|e| anyhow!("cannot parse Yahoo quotes for {symbol}: {e}"))?;

    let points: Vec<PricePoint> = quotes
      .iter()
      .filter_map(|q| {
        let date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
        (date >= start && date < end).then_some(PricePoint {
          date,
          close: q.adjclose,
        })
      })
      .collect();

    info!(symbol, rows = points.len(), "fetched Yahoo history");
    Ok(points)
  }
}

fn to_offset(date: NaiveDate) -> Result<OffsetDateTime> {
  let ts = date
    .and_hms_opt(0, 0, 0)
    .context("invalid midnight")?
    .and_utc()
    .timestamp();
  OffsetDateTime::from_unix_timestamp(ts).with_context(|| format!("date {date} out of range"))
}

impl PriceSource for YahooPriceSource {
  fn fetch_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<BTreeMap<String, Vec<PricePoint>>> {
    let mut out = BTreeMap::new();
    let mut last_err = None;

    for ticker in tickers {
      match self.history(ticker, start, end) {
        Ok(points) if !points.is_empty() => {
          out.insert(ticker.clone(), points);
        }
        Ok(_) => warn!(ticker = ticker.as_str(), "Yahoo returned no rows"),
        Err(e) => {
          warn!(ticker = ticker.as_str(), error = %e, "Yahoo fetch failed");
          last_err = Some(e);
        }
      }
    }

    // Partial results are fine; only a complete failure is an error.
    match last_err {
      Some(e) if out.is_empty() => Err(e),
      _ => Ok(out),
    }
  }
}
