//! # Market
//!
//! $$
//! \text{fetch}:(\text{tickers},[t_0,t_1))\mapsto\{(t,P_t)\}
//! $$
//!
//! Collaborator contracts the analysis core consumes: price history and ticker lookup.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;

use crate::quant::PricePoint;

pub mod csv;
#[cfg(feature = "yahoo")]
pub mod yahoo;

/// Daily close provider.
///
/// The window is half-open, `[start, end)`. Partial data is not an error: tickers or days the
/// provider cannot serve are simply absent. `Err` means the provider failed outright.
pub trait PriceSource {
  /// Closes per ticker, each ordered by date.
  fn fetch_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<BTreeMap<String, Vec<PricePoint>>>;

  /// Closes of a benchmark index.
  fn fetch_benchmark_prices(
    &self,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<PricePoint>> {
    let mut prices = self.fetch_prices(&[symbol.to_string()], start, end)?;
    Ok(prices.remove(symbol).unwrap_or_default())
  }
}

impl<S: PriceSource + ?Sized> PriceSource for &S {
  fn fetch_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<BTreeMap<String, Vec<PricePoint>>> {
    (**self).fetch_prices(tickers, start, end)
  }

  fn fetch_benchmark_prices(
    &self,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<PricePoint>> {
    (**self).fetch_benchmark_prices(symbol, start, end)
  }
}

/// Price history held in memory, e.g. preloaded or for tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPriceSource {
  prices: BTreeMap<String, Vec<PricePoint>>,
}

impl InMemoryPriceSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add or replace a ticker's history.
  pub fn with_history(mut self, ticker: &str, mut history: Vec<PricePoint>) -> Self {
    history.sort_by_key(|p| p.date);
    self.prices.insert(ticker.to_string(), history);
    self
  }
}

impl PriceSource for InMemoryPriceSource {
  fn fetch_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<BTreeMap<String, Vec<PricePoint>>> {
    Ok(
      tickers
        .iter()
        .filter_map(|t| {
          let window: Vec<PricePoint> = self
            .prices
            .get(t)?
            .iter()
            .filter(|p| p.date >= start && p.date < end)
            .copied()
            .collect();
          (!window.is_empty()).then(|| (t.clone(), window))
        })
        .collect(),
    )
  }
}

/// A searchable instrument.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TickerListing {
  pub symbol: String,
  pub name: String,
}

impl TickerListing {
  /// `"SYMBOL - Name"`, the label shown in pickers.
  pub fn label(&self) -> String {
    format!("{} - {}", self.symbol, self.name)
  }
}

/// Symbol lookup backing the watchlist picker.
pub trait TickerDirectory {
  /// Listings whose label contains `query`, case-insensitively, ordered by symbol.
  fn search(&self, query: &str) -> Vec<TickerListing>;

  /// Map picker labels back to symbols, skipping unknown labels.
  fn resolve_labels(&self, labels: &[String]) -> Vec<String>;
}

/// Directory over an in-memory listing table.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTickerDirectory {
  listings: Vec<TickerListing>,
}

impl InMemoryTickerDirectory {
  /// Listings with a blank symbol are discarded; duplicates collapse.
  pub fn new(listings: impl IntoIterator<Item = TickerListing>) -> Self {
    let mut listings: Vec<TickerListing> = listings
      .into_iter()
      .filter(|l| !l.symbol.trim().is_empty())
      .collect();
    listings.sort();
    listings.dedup();
    Self { listings }
  }

  pub fn len(&self) -> usize {
    self.listings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.listings.is_empty()
  }
}

impl TickerDirectory for InMemoryTickerDirectory {
  fn search(&self, query: &str) -> Vec<TickerListing> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
      return Vec::new();
    }
    self
      .listings
      .iter()
      .filter(|l| l.label().to_lowercase().contains(&query))
      .cloned()
      .collect()
  }

  fn resolve_labels(&self, labels: &[String]) -> Vec<String> {
    labels
      .iter()
      .filter_map(|label| {
        self
          .listings
          .iter()
          .find(|l| &l.label() == label)
          .map(|l| l.symbol.clone())
      })
      .collect()
  }
}
