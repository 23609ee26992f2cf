//! Daily closes stored as one `<SYMBOL>.csv` file per ticker.
//!
//! Each file holds `date,close` rows (`YYYY-MM-DD`), optionally preceded by a header line.
//! Extra columns after the close are ignored.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::debug;
use tracing::warn;

use super::PriceSource;
use crate::quant::PricePoint;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads price history from a directory of CSV files.
#[derive(Clone, Debug)]
pub struct CsvPriceSource {
  dir: PathBuf,
}

impl CsvPriceSource {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path_for(&self, ticker: &str) -> PathBuf {
    self.dir.join(format!("{ticker}.csv"))
  }
}

fn parse_fields(date: &str, close: Option<&str>) -> Result<PricePoint> {
  let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
    .with_context(|| format!("invalid date {date:?}"))?;
  let close = close
    .ok_or_else(|| anyhow!("missing close for {date}"))?
    .parse::<f64>()
    .with_context(|| format!("invalid close for {date}"))?;
  Ok(PricePoint { date, close })
}

/// `None` for blank lines.
fn parse_line(line: &str) -> Option<Result<PricePoint>> {
  let mut fields = line.split(',').map(str::trim);
  let date = fields.next().filter(|d| !d.is_empty())?;
  Some(parse_fields(date, fields.next()))
}

/// Parse a `date,close` file, skipping a leading header line.
pub fn read_price_file(path: &Path) -> Result<Vec<PricePoint>> {
  let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
  let reader = BufReader::new(file);
  let mut out = Vec::new();

  for (idx, line) in reader.lines().enumerate() {
    let line = line.with_context(|| format!("cannot read {}", path.display()))?;
    match parse_line(&line) {
      None => continue,
      Some(Err(_)) if idx == 0 => continue,
      Some(parsed) => {
        out.push(parsed.with_context(|| format!("{}:{}", path.display(), idx + 1))?);
      }
    }
  }

  out.sort_by_key(|p| p.date);
  Ok(out)
}

impl PriceSource for CsvPriceSource {
  fn fetch_prices(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<BTreeMap<String, Vec<PricePoint>>> {
    if !self.dir.is_dir() {
      return Err(anyhow!("price directory {} does not exist", self.dir.display()));
    }

    let mut out = BTreeMap::new();
    let mut last_err = None;
    for ticker in tickers {
      let path = self.path_for(ticker);
      if !path.is_file() {
        debug!(ticker = ticker.as_str(), "no price file");
        continue;
      }

      let history = match read_price_file(&path) {
        Ok(history) => history,
        Err(e) => {
          let reason = format!("{e:#}");
          warn!(ticker = ticker.as_str(), error = %reason, "skipping unreadable price file");
          last_err = Some(e);
          continue;
        }
      };
      let window: Vec<PricePoint> = history
        .into_iter()
        .filter(|p| p.date >= start && p.date < end)
        .collect();
      if !window.is_empty() {
        out.insert(ticker.clone(), window);
      }
    }

    // A bad file only costs its own ticker unless nothing else could be read.
    match last_err {
      Some(e) if out.is_empty() => Err(e),
      _ => Ok(out),
    }
  }
}
